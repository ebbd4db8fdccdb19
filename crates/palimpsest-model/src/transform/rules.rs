#![forbid(unsafe_code)]

//! Pairwise transformation rules.
//!
//! [`transform`] rewrites `x` so it applies after `y`. Every ordered pair of
//! operation kinds has its own arm; there is no catch-all, so adding a kind
//! forces every rule to be revisited.
//!
//! `x_after` is the resolved tie-break: `true` when `x` is treated as
//! happening after `y` at an identical position.

use smallvec::SmallVec;

use super::{Context, Entry};
use crate::operation::{
    AttributeOperation, InsertOperation, MarkerOperation, MoveOperation, Operation, OperationKind,
    Relation, RelationSide,
};
use crate::position::{Position, Stickiness};
use crate::range::Range;

pub(super) fn transform(
    x: &Entry,
    y: &Entry,
    x_after: bool,
    ctx: &Context<'_, '_>,
) -> Vec<Entry> {
    use OperationKind as K;

    let operations: Vec<Operation> = match (&x.op.kind, &y.op.kind) {
        (K::Insert(a), K::Insert(b)) => {
            let position = shift_by_insertion(a.position, b.position, b.how_many(), x_after);
            vec![with_kind(&x.op, K::Insert(InsertOperation { position, ..a.clone() }))]
        }
        (K::Insert(a), K::Move(b) | K::Remove(b)) => {
            let position = shift_by_move(a.position, b, x_after);
            vec![with_kind(&x.op, K::Insert(InsertOperation { position, ..a.clone() }))]
        }
        (K::Insert(_), K::Attribute(_) | K::Marker(_) | K::NoOp) => vec![x.op.clone()],

        (K::Move(a) | K::Remove(a), K::Insert(b)) => {
            let pieces: Vec<Range> = a
                .source_range()
                .transformed_by_insertion(b.position, b.how_many(), true)
                .into_vec();
            let target = shift_by_insertion(a.target, b.position, b.how_many(), x_after);
            moves_from_pieces(&x.op, pieces, target)
        }
        (K::Move(a) | K::Remove(a), K::Move(b) | K::Remove(b)) => {
            let y_is_remove = matches!(y.op.kind, K::Remove(_));
            move_against_move(x, a, y, b, y_is_remove, x_after, ctx)
        }
        (K::Move(_) | K::Remove(_), K::Attribute(_) | K::Marker(_) | K::NoOp) => vec![x.op.clone()],

        (K::Attribute(a), K::Insert(b)) => {
            let pieces = a.range.transformed_by_insertion(b.position, b.how_many(), true);
            attributes_from_pieces(&x.op, a, pieces)
        }
        (K::Attribute(a), K::Move(b) | K::Remove(b)) => {
            let pieces = a
                .range
                .transformed_by_move(b.source, b.how_many, b.target, true);
            attributes_from_pieces(&x.op, a, pieces)
        }
        (K::Attribute(a), K::Attribute(b)) => attribute_against_attribute(x, a, y, b, x_after, ctx),
        (K::Attribute(_), K::Marker(_) | K::NoOp) => vec![x.op.clone()],

        (K::Marker(a), K::Insert(_) | K::Move(_) | K::Remove(_)) => {
            let marker = MarkerOperation {
                old_range: a.old_range.and_then(|range| follow(&range, &y.op)),
                new_range: a.new_range.and_then(|range| follow(&range, &y.op)),
                ..a.clone()
            };
            vec![with_kind(&x.op, K::Marker(marker))]
        }
        (K::Marker(a), K::Marker(b)) => {
            if a.name != b.name {
                vec![x.op.clone()]
            } else if x_after {
                let marker = MarkerOperation {
                    old_range: b.new_range,
                    ..a.clone()
                };
                vec![with_kind(&x.op, K::Marker(marker))]
            } else {
                Vec::new()
            }
        }
        (K::Marker(_), K::Attribute(_) | K::NoOp) => vec![x.op.clone()],

        (
            K::NoOp,
            K::Insert(_) | K::Move(_) | K::Remove(_) | K::Attribute(_) | K::Marker(_) | K::NoOp,
        ) => vec![x.op.clone()],
    };

    operations
        .into_iter()
        .map(|op| {
            let mut relations = x.relations.clone();
            if let Some(relation) = op.meta.relation
                && !relations.contains(&relation)
            {
                relations.push(relation);
            }
            Entry {
                op,
                applied_at: x.applied_at,
                relations,
            }
        })
        .collect()
}

fn with_kind(template: &Operation, kind: OperationKind) -> Operation {
    Operation {
        kind,
        ..template.clone()
    }
}

fn tie_stickiness(after: bool) -> Stickiness {
    if after {
        Stickiness::ToNone
    } else {
        Stickiness::ToPrevious
    }
}

fn shift_by_insertion(position: Position, at: Position, how_many: usize, after: bool) -> Position {
    position.transformed_by_insertion(at, how_many, tie_stickiness(after))
}

/// Position after `mv`; positions strictly inside the moved range travel
/// with the content, boundaries stay put and the tie rule applies at the
/// insertion point.
fn shift_by_move(position: Position, mv: &MoveOperation, after: bool) -> Position {
    let Some(insert_at) = mv.insertion_position() else {
        return position;
    };
    if mv.source_range().contains_position(position) {
        return position.combined(mv.source, insert_at);
    }
    match position.transformed_by_deletion(mv.source, mv.how_many) {
        Some(shifted) => shift_by_insertion(shifted, insert_at, mv.how_many, after),
        None => position,
    }
}

fn follow(range: &Range, applied: &Operation) -> Option<Range> {
    Range::joined(&range.transformed_by_operation(applied, false))
}

fn move_against_move(
    x: &Entry,
    a: &MoveOperation,
    y: &Entry,
    b: &MoveOperation,
    y_is_remove: bool,
    x_after: bool,
    ctx: &Context<'_, '_>,
) -> Vec<Operation> {
    let Some(insert_at) = b.insertion_position() else {
        return vec![x.op.clone()];
    };
    let source = a.source_range();
    let moved = b.source_range();
    let mut pieces: Vec<Range> = Vec::with_capacity(3);

    let difference_set = source.difference(&moved);
    let difference = match difference_set.as_slice() {
        [single] => single
            .start
            .transformed_by_deletion(b.source, b.how_many)
            .zip(single.end.transformed_by_deletion(b.source, b.how_many))
            .map(|(start, end)| Range::new(start, end)),
        [_, _] => source
            .end
            .transformed_by_deletion(b.source, b.how_many)
            .map(|end| Range::new(source.start, end)),
        _ => None,
    };
    if let Some(difference) = difference {
        pieces.extend(difference.transformed_by_insertion(insert_at, b.how_many, true));
    }

    if let Some(common) = source.intersection(&moved) {
        let keep = if !x_after {
            false
        } else if !y_is_remove {
            true
        } else {
            ctx.was_undone(y) || !ctx.options.force_weak_remove
        };
        if keep {
            pieces.push(Range::new(
                common.start.combined(b.source, insert_at),
                common.end.combined(b.source, insert_at),
            ));
        } else {
            tracing::trace!(
                target: "palimpsest.transform",
                x = %x.op,
                y = %y.op,
                "common part of conflicting moves dropped"
            );
        }
    }

    let target = shift_by_move(a.target, b, x_after);
    let mut template = x.op.clone();
    if ctx.options.use_relations
        && y_is_remove
        && let Some(version) = y.applied_at
    {
        let side = if a.target == moved.start {
            Some(RelationSide::Before)
        } else if a.target == moved.end {
            Some(RelationSide::After)
        } else {
            None
        };
        if let Some(side) = side {
            template.meta.relation = Some(Relation { version, side });
        }
    }

    moves_from_pieces(&template, pieces, target)
}

/// Turns source pieces into sequential moves to `target`.
///
/// Pieces are emitted in document order; each later piece (and the target)
/// is adjusted for the pieces already moved, so the moved content lands at
/// the target in the order it had in the document.
fn moves_from_pieces(
    template: &Operation,
    mut pieces: Vec<Range>,
    target: Position,
) -> Vec<Operation> {
    pieces.retain(|piece| !piece.is_empty());
    pieces.sort();

    let mut emitted: SmallVec<[MoveOperation; 3]> = SmallVec::new();
    for piece in pieces {
        let mut range = Some(piece);
        let mut target = target;
        for previous in &emitted {
            range = range.and_then(|range| {
                Range::joined(&range.transformed_by_move(
                    previous.source,
                    previous.how_many,
                    previous.target,
                    false,
                ))
            });
            target = shift_by_move(target, previous, true);
        }
        let Some(range) = range else {
            continue;
        };
        if range.is_empty() || range.contains_position(target) {
            continue;
        }
        // Pieces already at the target are kept; `finish` turns them into no-ops.
        emitted.push(MoveOperation {
            source: range.start,
            how_many: range.len(),
            target,
        });
    }

    emitted
        .into_iter()
        .map(|mv| with_kind(template, OperationKind::from_move(mv)))
        .collect()
}

fn attributes_from_pieces(
    template: &Operation,
    attribute: &AttributeOperation,
    pieces: impl IntoIterator<Item = Range>,
) -> Vec<Operation> {
    pieces
        .into_iter()
        .filter(|range| !range.is_empty())
        .map(|range| {
            with_kind(
                template,
                OperationKind::Attribute(AttributeOperation {
                    range,
                    ..attribute.clone()
                }),
            )
        })
        .collect()
}

/// Same-key changes conflict on their intersection. The winner re-applies its
/// value there; an identical value is only re-applied when the applied change
/// was undone in the meantime.
fn attribute_against_attribute(
    x: &Entry,
    a: &AttributeOperation,
    y: &Entry,
    b: &AttributeOperation,
    x_after: bool,
    ctx: &Context<'_, '_>,
) -> Vec<Operation> {
    let template = &x.op;
    let Some(common) = (a.key == b.key)
        .then(|| a.range.intersection(&b.range))
        .flatten()
    else {
        return vec![template.clone()];
    };
    let mut operations = attributes_from_pieces(template, a, a.range.difference(&b.range));
    if x_after && (a.new_value != b.new_value || ctx.was_undone(y)) {
        operations.push(with_kind(
            template,
            OperationKind::Attribute(AttributeOperation {
                range: common,
                key: a.key.clone(),
                old_value: b.new_value.clone(),
                new_value: a.new_value.clone(),
            }),
        ));
    }
    operations
}
