#![forbid(unsafe_code)]

//! Append-only, version-indexed log of applied document operations.
//!
//! The operation applied at version `v` (its `base_version`) is stored at index
//! `v`, so "everything that happened since version `v`" is a slice.
//!
//! # Invariants
//!
//! 1. `operations[i].base_version == i` for every entry
//! 2. Log order equals apply order
//! 3. Undo links only point backwards: an undoing version is always greater
//!    than the version it undid
//!
//! # Folding
//!
//! [`History::effective_operations_since`] drops every operation that was
//! exactly reverted later on, together with its reversal. Rebasing against
//! the folded log keeps last-first undo and redo exact: a pair that cancels
//! out can no longer reorder content that sits at a tie.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::operation::{InsertOperation, Operation, OperationKind};
use crate::position::{Stickiness, Version};

#[derive(Debug, Clone, Default)]
pub struct History {
    operations: Vec<Operation>,
    /// undoing version -> undone version
    undoing: FxHashMap<Version, Version>,
    undone: FxHashSet<Version>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an applied operation.
    pub fn push(&mut self, operation: Operation) {
        debug_assert_eq!(
            operation.base_version,
            self.version(),
            "history versions must stay dense"
        );
        self.operations.push(operation);
    }

    /// Version the next appended operation must carry.
    #[must_use]
    pub fn version(&self) -> Version {
        self.operations.len() as Version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations applied at `from` and later, in apply order.
    #[must_use]
    pub fn operations_since(&self, from: Version) -> &[Operation] {
        let start = usize::try_from(from)
            .map_or(self.operations.len(), |from| from.min(self.operations.len()));
        &self.operations[start..]
    }

    /// Operations applied at `from` and later, with reverted pairs folded away.
    ///
    /// An operation followed (once inner pairs are folded) by the operation
    /// that reverses it leaves the document as it was, so both are skipped.
    /// Inserted content that was removed again still lands in the graveyard;
    /// that pair folds into an insertion at the graveyard position.
    #[must_use]
    pub fn effective_operations_since(&self, from: Version) -> Vec<Operation> {
        // (operation, graveyard leftover of a folded insert)
        let mut stack: Vec<(Operation, bool)> = Vec::new();
        for operation in self.operations_since(from) {
            if operation.is_no_op() {
                continue;
            }
            if let Some(reverses) = operation.meta.reverses
                && let Some(index) = stack.iter().rposition(|(_, leftover)| !leftover)
                && stack[index].0.base_version == reverses
                && let Some(leftover) = fold_reverted(&stack[index].0, operation)
            {
                let (reverted, _) = stack.remove(index);
                if let OperationKind::Move(mv) | OperationKind::Remove(mv) = &operation.kind {
                    for (later, _) in &mut stack[index..] {
                        if let OperationKind::Insert(insert) = &mut later.kind {
                            insert.position = insert.position.transformed_by_move(
                                mv.source,
                                mv.how_many,
                                mv.target,
                                Stickiness::ToNone,
                            );
                        }
                    }
                }
                tracing::trace!(
                    target: "palimpsest.model",
                    reverted = %reverted,
                    reverting = %operation,
                    "folded reverted pair"
                );
                if let Some(leftover) = leftover {
                    stack.push((leftover, true));
                }
                continue;
            }
            stack.push((operation.clone(), false));
        }
        stack.into_iter().map(|(operation, _)| operation).collect()
    }

    /// Operations applied in `[from, to)`.
    #[must_use]
    pub fn operations_between(&self, from: Version, to: Version) -> &[Operation] {
        let since = self.operations_since(from);
        let count = to.saturating_sub(from).min(since.len() as Version) as usize;
        &since[..count]
    }

    #[must_use]
    pub fn operation(&self, version: Version) -> Option<&Operation> {
        usize::try_from(version)
            .ok()
            .and_then(|index| self.operations.get(index))
    }

    #[must_use]
    pub fn last_operation(&self) -> Option<&Operation> {
        self.operations.last()
    }

    /// Records that the operation at `undoing` reverted the one at `undone`.
    pub fn set_operation_as_undone(&mut self, undone: Version, undoing: Version) {
        tracing::trace!(target: "palimpsest.model", undone, undoing, "operation marked as undone");
        self.undone.insert(undone);
        self.undoing.insert(undoing, undone);
    }

    #[must_use]
    pub fn is_undone(&self, version: Version) -> bool {
        self.undone.contains(&version)
    }

    #[must_use]
    pub fn is_undoing(&self, version: Version) -> bool {
        self.undoing.contains_key(&version)
    }

    /// Version of the operation that `undoing` reverted, if any.
    #[must_use]
    pub fn undone_operation(&self, undoing: Version) -> Option<Version> {
        self.undoing.get(&undoing).copied()
    }
}

/// Whether `reverting` exactly reverts `reverted`, and what is left over.
///
/// `None` means the pair does not fold. `Some(None)` folds to nothing;
/// `Some(Some(op))` folds to the graveyard insertion that remains.
fn fold_reverted(reverted: &Operation, reverting: &Operation) -> Option<Option<Operation>> {
    use OperationKind as K;

    match (&reverted.kind, &reverting.kind) {
        (K::Insert(insert), K::Remove(remove)) if insert.how_many() == remove.how_many => {
            let leftover = Operation {
                base_version: reverting.base_version,
                kind: K::Insert(InsertOperation {
                    position: remove.target,
                    items: insert.items.clone(),
                }),
                is_document_operation: reverted.is_document_operation,
                meta: reverted.meta,
            };
            Some(Some(leftover))
        }
        (K::Move(a) | K::Remove(a), K::Move(b) | K::Remove(b)) if a.how_many == b.how_many => {
            Some(None)
        }
        (K::Attribute(a), K::Attribute(b))
            if a.key == b.key && a.range == b.range && a.new_value == b.old_value =>
        {
            Some(None)
        }
        (K::Marker(a), K::Marker(b)) if a.name == b.name && a.new_range == b.old_range => {
            Some(None)
        }
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
