#![forbid(unsafe_code)]

//! Operational transformation of operation sequences.
//!
//! [`transform_sets`] takes two sequences that were both valid against the
//! same document version and rewrites each so it can be applied after the
//! other:
//!
//! ```text
//!            v0
//!          /    \
//!     ops_a      ops_b          (both valid at v0)
//!        /        \
//!      va          vb
//!        \        /
//!   ops_b'        ops_a'        ops_a' valid after ops_b, ops_b' after ops_a
//! ```
//!
//! The undo path only uses the `a` side: a reversed operation (valid at the
//! version right after the change it undoes) is transformed against every
//! history entry recorded since, producing operations valid now.
//!
//! # Tie-breaking
//!
//! When both sides touch the identical position, the `a` side is treated as
//! happening after the `b` side. With `use_relations`, a [`Relation`] recorded
//! on one side against the version the other side reverses overrides this.
//!
//! # Failure Modes
//!
//! - **Unaddressable target**: with `document` set, results touching roots that
//!   are detached (or unknown) are dropped, or replaced by a no-op when padding.
//!   This is logged at debug level, not reported.
//!
//! [`Relation`]: crate::operation::Relation

mod rules;

use smallvec::SmallVec;

use crate::document::Document;
use crate::operation::{Operation, Relation, RelationSide};
use crate::position::Version;

/// Knobs for [`transform_sets`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformOptions<'a> {
    /// Consult and record [`Relation`](crate::operation::Relation) hints.
    pub use_relations: bool,
    /// Replace operations that transform into nothing with explicit no-ops.
    pub pad_with_no_ops: bool,
    /// Content that a later, not undone, remove already discarded is left in
    /// the graveyard instead of being moved again.
    pub force_weak_remove: bool,
    /// Live document used for history lookups and addressability checks.
    pub document: Option<&'a Document>,
}

impl<'a> TransformOptions<'a> {
    /// Preset used when resolving reversed operations during undo and redo.
    #[must_use]
    pub fn undo(document: &'a Document) -> Self {
        Self {
            use_relations: true,
            pad_with_no_ops: false,
            force_weak_remove: true,
            document: Some(document),
        }
    }

    #[must_use]
    pub fn with_relations(mut self, use_relations: bool) -> Self {
        self.use_relations = use_relations;
        self
    }

    #[must_use]
    pub fn with_padding(mut self, pad_with_no_ops: bool) -> Self {
        self.pad_with_no_ops = pad_with_no_ops;
        self
    }

    #[must_use]
    pub fn with_weak_remove(mut self, force_weak_remove: bool) -> Self {
        self.force_weak_remove = force_weak_remove;
        self
    }

    #[must_use]
    pub fn with_document(mut self, document: &'a Document) -> Self {
        self.document = Some(document);
        self
    }
}

/// Result of [`transform_sets`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformedSets {
    /// `ops_a` rewritten to apply after `ops_b`.
    pub operations_a: Vec<Operation>,
    /// `ops_b` rewritten to apply after `ops_a`.
    pub operations_b: Vec<Operation>,
}

/// An operation travelling through the transformation, plus the history
/// version it was applied at when it comes from the `b` side.
///
/// `relations` collects every hint recorded along the way; the operation's
/// own `meta.relation` only keeps the latest one.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) op: Operation,
    pub(crate) applied_at: Option<Version>,
    pub(crate) relations: SmallVec<[Relation; 2]>,
}

impl Entry {
    fn new(op: &Operation, applied_at: Option<Version>) -> Self {
        Self {
            op: op.clone(),
            applied_at,
            relations: op.meta.relation.into_iter().collect(),
        }
    }

    fn relation_to(&self, version: Version) -> Option<RelationSide> {
        self.relations
            .iter()
            .rev()
            .find(|relation| relation.version == version)
            .map(|relation| relation.side)
    }
}

pub(crate) struct Context<'o, 'd> {
    pub(crate) options: &'o TransformOptions<'d>,
}

impl Context<'_, '_> {
    /// Whether the history says the applied operation was undone later.
    pub(crate) fn was_undone(&self, entry: &Entry) -> bool {
        match (self.options.document, entry.applied_at) {
            (Some(document), Some(version)) => document.history().is_undone(version),
            _ => false,
        }
    }

    /// Whether `a` goes after `b` when both touch the identical position.
    fn a_goes_after(&self, a: &Entry, b: &Entry) -> bool {
        if self.options.use_relations {
            if let Some(side) = a.op.meta.reverses.and_then(|v| b.relation_to(v)) {
                return side == RelationSide::Before;
            }
            if let Some(side) = b.op.meta.reverses.and_then(|v| a.relation_to(v)) {
                return side == RelationSide::After;
            }
        }
        true
    }
}

/// Transforms `operations_a` and `operations_b` against each other.
#[must_use]
pub fn transform_sets(
    operations_a: &[Operation],
    operations_b: &[Operation],
    options: &TransformOptions<'_>,
) -> TransformedSets {
    let _span = tracing::trace_span!(
        target: "palimpsest.transform",
        "transform_sets",
        a = operations_a.len(),
        b = operations_b.len()
    )
    .entered();

    let ctx = Context { options };
    let a: Vec<Entry> = operations_a.iter().map(|op| Entry::new(op, None)).collect();
    let b: Vec<Entry> = operations_b
        .iter()
        .map(|op| Entry::new(op, Some(op.base_version)))
        .collect();

    let (a, b) = transform_lists(a, b, &ctx);

    let a_base = operations_b
        .last()
        .map(|op| op.base_version + 1)
        .or_else(|| operations_a.first().map(|op| op.base_version));
    let b_base = operations_a
        .last()
        .map(|op| op.base_version + 1)
        .or_else(|| operations_b.first().map(|op| op.base_version));

    TransformedSets {
        operations_a: finish(a, a_base, &ctx),
        operations_b: finish(b, b_base, &ctx),
    }
}

/// Transforms `operations` (valid at their base version) against `applied`
/// (everything applied since), returning operations valid now.
#[must_use]
pub fn transform(
    operations: &[Operation],
    applied: &[Operation],
    options: &TransformOptions<'_>,
) -> Vec<Operation> {
    transform_sets(operations, applied, options).operations_a
}

fn transform_lists(
    a: Vec<Entry>,
    b: Vec<Entry>,
    ctx: &Context<'_, '_>,
) -> (Vec<Entry>, Vec<Entry>) {
    match (a.len(), b.len()) {
        (0, _) | (_, 0) => (a, b),
        (1, 1) => {
            let (a_op, b_op) = (&a[0], &b[0]);
            transform_pair(a_op, b_op, ctx)
        }
        (1, _) => {
            let mut a_current = a;
            let mut b_out = Vec::with_capacity(b.len());
            for b_op in b {
                let (a_next, b_next) = transform_lists(a_current, vec![b_op], ctx);
                a_current = a_next;
                b_out.extend(b_next);
            }
            (a_current, b_out)
        }
        _ => {
            let mut b_current = b;
            let mut a_out = Vec::with_capacity(a.len());
            for a_op in a {
                let (a_next, b_next) = transform_lists(vec![a_op], b_current, ctx);
                a_out.extend(a_next);
                b_current = b_next;
            }
            (a_out, b_current)
        }
    }
}

fn transform_pair(a: &Entry, b: &Entry, ctx: &Context<'_, '_>) -> (Vec<Entry>, Vec<Entry>) {
    let a_after = ctx.a_goes_after(a, b);
    let a_out = pad(rules::transform(a, b, a_after, ctx), a, ctx);
    let b_out = pad(rules::transform(b, a, !a_after, ctx), b, ctx);
    (a_out, b_out)
}

fn pad(result: Vec<Entry>, original: &Entry, ctx: &Context<'_, '_>) -> Vec<Entry> {
    if result.is_empty() && ctx.options.pad_with_no_ops {
        return vec![Entry {
            op: original.op.to_no_op(),
            ..original.clone()
        }];
    }
    result
}

fn finish(entries: Vec<Entry>, base: Option<Version>, ctx: &Context<'_, '_>) -> Vec<Operation> {
    let pad_with_no_ops = ctx.options.pad_with_no_ops;
    let mut operations: Vec<Operation> = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut op = entry.op;
        if let Some(document) = ctx.options.document
            && let Some(root) = op.roots().into_iter().find(|&root| !document.is_addressable(root))
        {
            tracing::debug!(
                target: "palimpsest.transform",
                op = %op,
                root = %root,
                "dropping transformed operation on unaddressable root"
            );
            if !pad_with_no_ops {
                continue;
            }
            op = op.to_no_op();
        }
        if op.is_self_move() {
            op = op.to_no_op();
        }
        if op.is_no_op() && !pad_with_no_ops {
            continue;
        }
        operations.push(op);
    }
    if let Some(base) = base {
        for (index, op) in operations.iter_mut().enumerate() {
            op.base_version = base + index as Version;
        }
    }
    operations
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Item;
    use crate::operation::{OperationKind, Relation};
    use crate::position::{Position, RootId};
    use crate::range::Range;
    use serde_json::json;

    fn items(text: &str) -> Vec<Item> {
        Item::from_text(text)
    }

    fn insert(version: Version, offset: usize, text: &str) -> Operation {
        Operation::insert(version, Position::main(offset), items(text))
    }

    fn remove(version: Version, offset: usize, how_many: usize) -> Operation {
        Operation::move_to(version, Position::main(offset), how_many, Position::graveyard(0))
    }

    fn apply_all(doc: &mut Document, ops: &[Operation]) {
        for op in ops {
            let mut op = op.clone();
            op.base_version = doc.version();
            doc.apply_operation(&op).expect("transformed operation applies");
        }
    }

    fn doc_with(text: &str) -> Document {
        let mut doc = Document::new();
        doc.apply_operation(&insert(0, 0, text)).expect("seed");
        doc
    }

    #[test]
    fn test_insert_insert_shift() {
        let a = [insert(1, 3, "X")];
        let b = [insert(1, 1, "YY")];
        let result = transform_sets(&a, &b, &TransformOptions::default());
        assert_eq!(result.operations_a, vec![insert(2, 5, "X")]);
        assert_eq!(result.operations_b, vec![insert(2, 1, "YY")]);
    }

    #[test]
    fn test_insert_insert_tie_puts_a_after() {
        let a = [insert(1, 2, "A")];
        let b = [insert(1, 2, "B")];
        let result = transform_sets(&a, &b, &TransformOptions::default());
        assert_eq!(result.operations_a, vec![insert(2, 3, "A")]);
        assert_eq!(result.operations_b, vec![insert(2, 2, "B")]);
    }

    #[test]
    fn test_sets_converge_for_concurrent_inserts() {
        let a = [insert(1, 1, "x"), insert(2, 4, "y")];
        let b = [insert(1, 0, "p"), insert(2, 3, "q")];
        let result = transform_sets(&a, &b, &TransformOptions::default());

        let mut left = doc_with("abc");
        apply_all(&mut left, &a);
        apply_all(&mut left, &result.operations_b);
        let mut right = doc_with("abc");
        apply_all(&mut right, &b);
        apply_all(&mut right, &result.operations_a);
        assert_eq!(left.text(RootId::MAIN), right.text(RootId::MAIN));
    }

    #[test]
    fn test_remove_against_insert_inside_splits() {
        // "abcd": a removes [1, 3), b inserts "X" at 2.
        let a = [remove(1, 1, 2)];
        let b = [insert(1, 2, "X")];
        let result = transform(&a, &b, &TransformOptions::default());
        let mut doc = doc_with("abcd");
        apply_all(&mut doc, &b);
        apply_all(&mut doc, &result);
        assert_eq!(doc.text(RootId::MAIN), "aXd");
        assert_eq!(doc.text(RootId::GRAVEYARD), "bc");
    }

    #[test]
    fn test_insert_inside_removed_range_follows_to_graveyard() {
        let a = [insert(1, 2, "X")];
        let b = [remove(1, 1, 2)];
        let result = transform(&a, &b, &TransformOptions::default());
        assert_eq!(
            result,
            vec![Operation::insert(2, Position::graveyard(1), items("X"))]
        );
    }

    #[test]
    fn test_weak_remove_leaves_removed_content_alone() {
        // "abcd": a moves [1, 3) to 4, b removed [1, 3) meanwhile.
        let a = [Operation::move_to(1, Position::main(1), 2, Position::main(4))];
        let b = [remove(1, 1, 2)];
        let strong = transform(&a, &b, &TransformOptions::default());
        assert_eq!(
            strong,
            vec![Operation::move_to(2, Position::graveyard(0), 2, Position::main(2))]
        );
        let weak = transform(&a, &b, &TransformOptions::default().with_weak_remove(true));
        assert!(weak.is_empty());
        let padded = transform(
            &a,
            &b,
            &TransformOptions::default()
                .with_weak_remove(true)
                .with_padding(true),
        );
        assert_eq!(padded, vec![Operation::no_op(2)]);
    }

    #[test]
    fn test_move_against_overlapping_remove_keeps_rest() {
        // "abcdef": a moves [1, 4) to 6, b removes [2, 5).
        let a = [Operation::move_to(1, Position::main(1), 3, Position::main(6))];
        let b = [remove(1, 2, 3)];
        let result = transform(&a, &b, &TransformOptions::default().with_weak_remove(true));
        let mut doc = doc_with("abcdef");
        apply_all(&mut doc, &b);
        apply_all(&mut doc, &result);
        assert_eq!(doc.text(RootId::MAIN), "afb");
    }

    #[test]
    fn test_move_target_inside_moved_range_follows() {
        // "abcdef": a moves [0, 1) to 3, b moves [2, 5) to 6 -> "abfcde".
        let a = [Operation::move_to(1, Position::main(0), 1, Position::main(3))];
        let b = [Operation::move_to(1, Position::main(2), 3, Position::main(6))];
        let result = transform(&a, &b, &TransformOptions::default());
        let mut doc = doc_with("abcdef");
        apply_all(&mut doc, &b);
        apply_all(&mut doc, &result);
        assert_eq!(doc.text(RootId::MAIN), "bfcade");
    }

    #[test]
    fn test_relation_recorded_against_remove() {
        // "abcd": "b" removed at version 1; a moves "d" right behind "b".
        let mut doc = doc_with("abcd");
        doc.apply_operation(&remove(1, 1, 1)).unwrap();
        let a = [Operation::move_to(1, Position::main(3), 1, Position::main(2))];
        let result = transform(
            &a,
            doc.history().operations_since(1),
            &TransformOptions::undo(&doc),
        );
        assert_eq!(result.len(), 1);
        assert_eq!(
            result[0].kind,
            Operation::move_to(0, Position::main(2), 1, Position::main(1)).kind
        );
        assert_eq!(
            result[0].meta.relation,
            Some(Relation {
                version: 1,
                side: RelationSide::After
            })
        );
    }

    #[test]
    fn test_relation_flips_tie() {
        let hinted = Operation::insert(4, Position::main(1), items("Z")).with_meta(
            crate::operation::OperationMeta {
                reverses: None,
                relation: Some(Relation {
                    version: 2,
                    side: RelationSide::After,
                }),
            },
        );
        let mut reversing = insert(4, 1, "Y");
        reversing.meta.reverses = Some(2);

        let with = transform(
            &[reversing.clone()],
            &[hinted.clone()],
            &TransformOptions::default().with_relations(true),
        );
        assert_eq!(with[0].kind, insert(0, 1, "Y").kind);

        let without = transform(&[reversing], &[hinted], &TransformOptions::default());
        assert_eq!(without[0].kind, insert(0, 2, "Y").kind);
    }

    #[test]
    fn test_later_relation_does_not_hide_earlier_one() {
        let options = TransformOptions::default().with_relations(true);
        let ctx = Context { options: &options };
        let mut applied = Entry::new(&insert(4, 0, "X"), Some(4));
        applied.relations.push(Relation {
            version: 1,
            side: RelationSide::Before,
        });
        applied.relations.push(Relation {
            version: 2,
            side: RelationSide::After,
        });

        let mut undoing_first = insert(5, 0, "Y");
        undoing_first.meta.reverses = Some(1);
        assert!(ctx.a_goes_after(&Entry::new(&undoing_first, None), &applied));

        let mut undoing_second = insert(5, 0, "Y");
        undoing_second.meta.reverses = Some(2);
        assert!(!ctx.a_goes_after(&Entry::new(&undoing_second, None), &applied));
    }

    #[test]
    fn test_relations_accumulate_across_removes() {
        let mut doc = doc_with("abcdef");
        doc.apply_operation(&remove(1, 1, 1)).unwrap();
        doc.apply_operation(&remove(2, 1, 1)).unwrap();
        // The first remove ends at the target, the second one starts there.
        let a = [Operation::move_to(1, Position::main(5), 1, Position::main(2))];
        let options = TransformOptions::undo(&doc);
        let ctx = Context { options: &options };
        let (a, _) = transform_lists(
            vec![Entry::new(&a[0], None)],
            doc.history()
                .operations_since(1)
                .iter()
                .map(|op| Entry::new(op, Some(op.base_version)))
                .collect(),
            &ctx,
        );
        assert_eq!(a.len(), 1);
        let versions: Vec<Version> = a[0].relations.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(a[0].op.meta.relation.map(|r| r.version), Some(2));
    }

    #[test]
    fn test_attribute_split_by_insert() {
        let a = [Operation::attribute(1, Range::main(0, 4), "bold", None, Some(json!(true)))];
        let b = [insert(1, 2, "XX")];
        let result = transform(&a, &b, &TransformOptions::default());
        let ranges: Vec<Range> = result
            .iter()
            .map(|op| match &op.kind {
                OperationKind::Attribute(attr) => attr.range,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ranges, vec![Range::main(0, 2), Range::main(4, 6)]);
    }

    #[test]
    fn test_attribute_conflict_a_wins_on_intersection() {
        let a = [Operation::attribute(1, Range::main(0, 4), "color", None, Some(json!("red")))];
        let b = [Operation::attribute(1, Range::main(2, 6), "color", None, Some(json!("blue")))];
        let result = transform_sets(&a, &b, &TransformOptions::default());

        let mut doc = doc_with("abcdef");
        apply_all(&mut doc, &b);
        apply_all(&mut doc, &result.operations_a);
        let colors: Vec<Option<&serde_json::Value>> = doc
            .items(RootId::MAIN)
            .iter()
            .map(|item| item.attribute("color"))
            .collect();
        let red = json!("red");
        let blue = json!("blue");
        assert_eq!(
            colors,
            vec![Some(&red), Some(&red), Some(&red), Some(&red), Some(&blue), Some(&blue)]
        );

        let mut other = doc_with("abcdef");
        apply_all(&mut other, &a);
        apply_all(&mut other, &result.operations_b);
        assert_eq!(other.items(RootId::MAIN), doc.items(RootId::MAIN));
    }

    #[test]
    fn test_same_value_reapplied_when_applied_change_was_undone() {
        let set_bold = |version| {
            Operation::attribute(version, Range::main(0, 2), "bold", None, Some(json!(true)))
        };
        let mut doc = doc_with("abcd");
        doc.apply_operation(&set_bold(1)).unwrap();
        doc.apply_operation(&set_bold(1).reversed()).unwrap();

        // Still live: the identical change on the intersection is redundant.
        let live = transform(
            &[set_bold(1)],
            doc.history().operations_between(1, 2),
            &TransformOptions::undo(&doc),
        );
        assert!(live.is_empty());

        doc.history_mut().set_operation_as_undone(1, 2);
        let result = transform(
            &[set_bold(1)],
            doc.history().operations_since(1),
            &TransformOptions::undo(&doc),
        );
        apply_all(&mut doc, &result);
        let bold: Vec<bool> = doc
            .items(RootId::MAIN)
            .iter()
            .map(|item| item.attribute("bold").is_some())
            .collect();
        assert_eq!(bold, vec![true, true, false, false]);
    }

    #[test]
    fn test_marker_conflict_a_wins() {
        let a = [Operation::marker(1, "m", None, Some(Range::main(0, 1)), false)];
        let b = [Operation::marker(1, "m", None, Some(Range::main(2, 3)), false)];
        let result = transform_sets(&a, &b, &TransformOptions::default());
        let OperationKind::Marker(marker) = &result.operations_a[0].kind else {
            panic!("expected marker");
        };
        assert_eq!(marker.old_range, Some(Range::main(2, 3)));
        assert!(result.operations_b.is_empty());
    }

    #[test]
    fn test_detached_root_results_are_dropped() {
        let mut doc = Document::new();
        let side = doc.create_root("side");
        doc.detach_root(side).unwrap();
        let a = [Operation::move_to(0, Position::main(0), 0, Position::new(side, 0))];
        let options = TransformOptions::default().with_document(&doc);
        assert!(transform(&a, &[], &options).is_empty());

        let a = [Operation::insert(0, Position::new(side, 0), items("x"))];
        let padded = transform(&a, &[], &options.with_padding(true));
        assert_eq!(padded, vec![Operation::no_op(0)]);
    }

    #[test]
    fn test_renumbering_follows_applied() {
        let a = [insert(3, 0, "a"), insert(4, 1, "b")];
        let b = [insert(3, 5, "c"), insert(4, 6, "d"), insert(5, 7, "e")];
        let result = transform_sets(&a, &b, &TransformOptions::default());
        let versions: Vec<Version> = result.operations_a.iter().map(|op| op.base_version).collect();
        assert_eq!(versions, vec![6, 7]);
        let versions: Vec<Version> = result.operations_b.iter().map(|op| op.base_version).collect();
        assert_eq!(versions, vec![5, 6, 7]);
    }

    #[test]
    fn test_noop_passthrough_respects_padding() {
        let a = [Operation::no_op(1)];
        let b = [insert(1, 0, "x")];
        assert!(transform(&a, &b, &TransformOptions::default()).is_empty());
        assert_eq!(
            transform(&a, &b, &TransformOptions::default().with_padding(true)),
            vec![Operation::no_op(2)]
        );
    }
}
