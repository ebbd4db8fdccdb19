#![forbid(unsafe_code)]

//! Undo and redo commands.
//!
//! Both commands own a stack of [`StackItem`]s and share one routine,
//! [`undo_batch`], which reverses a batch against everything that happened
//! since it was applied.
//!
//! # Invariants
//!
//! - `is_enabled()` is `true` iff the stack is non-empty.
//! - `execute()` consumes exactly one stack item and produces exactly one new
//!   batch, applied as a single atomic change.
//! - Reversed operations are applied last-applied-first.
//!
//! # Failure Modes
//!
//! - **Content gone**: a reversed operation whose target was discarded for
//!   good transforms into nothing and is skipped.
//! - **Read-only region**: an operation touching a read-only root is applied
//!   as a no-op.
//! - **Would not validate**: an operation the document would reject is
//!   applied as a no-op.
//!
//! None of these are reported to the caller; they are logged at debug level.

use std::collections::VecDeque;
use std::fmt;

use palimpsest_model::{
    Batch, BatchId, BatchType, Model, Selection, TransformOptions, Writer, transform,
};

use super::restore::restore_selection;

/// A recorded batch plus the selection captured before it was applied.
#[derive(Debug, Clone)]
pub struct StackItem {
    pub batch: Batch,
    pub selection: Selection,
}

/// Completion notification of one `execute()`.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// The batch that was reverted.
    pub reverted: Batch,
    /// The batch produced by reverting it.
    pub produced: Batch,
}

#[derive(Default)]
struct Stack {
    items: VecDeque<StackItem>,
}

impl Stack {
    fn push(&mut self, batch: Batch, selection: Selection) {
        self.items.push_back(StackItem { batch, selection });
    }

    fn take(&mut self, target: Option<BatchId>) -> Option<StackItem> {
        match target {
            None => self.items.pop_back(),
            Some(id) => {
                let index = self.items.iter().position(|item| item.batch.id() == id)?;
                self.items.remove(index)
            }
        }
    }

    fn descriptions(&self, limit: usize) -> Vec<&str> {
        self.items
            .iter()
            .rev()
            .take(limit)
            .map(|item| item.batch.description())
            .collect()
    }
}

/// Reverts recorded batches. Enabled while its stack is non-empty.
#[derive(Default)]
pub struct UndoCommand {
    stack: Stack,
}

impl fmt::Debug for UndoCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoCommand")
            .field("depth", &self.depth())
            .finish()
    }
}

impl UndoCommand {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `batch` with the selection captured before it was applied.
    pub fn add_batch(&mut self, batch: Batch, selection: Selection) {
        self.stack.push(batch, selection);
    }

    pub fn clear_stack(&mut self) {
        self.stack.items.clear();
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.stack.items.is_empty()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.items.len()
    }

    #[must_use]
    pub fn contains(&self, id: BatchId) -> bool {
        self.stack.items.iter().any(|item| item.batch.id() == id)
    }

    /// Descriptions, most recent first.
    #[must_use]
    pub fn descriptions(&self, limit: usize) -> Vec<&str> {
        self.stack.descriptions(limit)
    }

    /// Drops the oldest entry.
    pub fn evict_oldest(&mut self) -> Option<StackItem> {
        self.stack.items.pop_front()
    }

    /// Reverts `target` (selective undo) or the most recent entry.
    ///
    /// Returns `None` without touching the model when there is nothing to
    /// revert or `target` is not on the stack.
    pub fn execute(
        &mut self,
        model: &mut Model,
        target: Option<BatchId>,
    ) -> Option<CommandOutcome> {
        let item = self.stack.take(target)?;
        let batch = model
            .create_batch(BatchType::undo())
            .with_description(item.batch.description());
        let span = tracing::debug_span!(
            target: "palimpsest.undo",
            "undo.execute",
            batch = %item.batch.id(),
            produced = %batch.id(),
            operations = tracing::field::Empty
        );
        let _guard = span.enter();

        let (produced, ()) = model.enqueue_change(batch, |writer| {
            undo_batch(writer, &item.batch);
            restore(writer, &item);
        });
        span.record("operations", produced.operations().len());

        Some(CommandOutcome {
            reverted: item.batch,
            produced,
        })
    }
}

/// Re-applies reverted batches. Enabled while its stack is non-empty.
#[derive(Default)]
pub struct RedoCommand {
    stack: Stack,
}

impl fmt::Debug for RedoCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedoCommand")
            .field("depth", &self.depth())
            .finish()
    }
}

impl RedoCommand {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an undoing batch with the selection captured before the undo.
    pub fn add_batch(&mut self, batch: Batch, selection: Selection) {
        self.stack.push(batch, selection);
    }

    pub fn clear_stack(&mut self) {
        self.stack.items.clear();
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.stack.items.is_empty()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.items.len()
    }

    #[must_use]
    pub fn descriptions(&self, limit: usize) -> Vec<&str> {
        self.stack.descriptions(limit)
    }

    /// Reverts the most recent undo.
    pub fn execute(&mut self, model: &mut Model) -> Option<CommandOutcome> {
        let item = self.stack.take(None)?;
        let batch = model
            .create_batch(BatchType::redo())
            .with_description(item.batch.description());
        let span = tracing::debug_span!(
            target: "palimpsest.undo",
            "redo.execute",
            batch = %item.batch.id(),
            produced = %batch.id(),
            operations = tracing::field::Empty
        );
        let _guard = span.enter();

        let (produced, ()) = model.enqueue_change(batch, |writer| {
            undo_batch(writer, &item.batch);
            restore(writer, &item);
        });
        span.record("operations", produced.operations().len());

        Some(CommandOutcome {
            reverted: item.batch,
            produced,
        })
    }
}

/// Maps the item's captured selection through everything applied since its
/// batch started and installs it, unless nothing survives.
fn restore(writer: &mut Writer<'_>, item: &StackItem) {
    let Some(since) = item.batch.base_version() else {
        return;
    };
    let document = writer.document();
    let restored = restore_selection(
        item.selection.ranges(),
        item.selection.is_backward(),
        document.history().operations_since(since),
        document,
    );
    match restored {
        Some(selection) => writer.set_selection(selection),
        None => tracing::debug!(
            target: "palimpsest.undo",
            batch = %item.batch.id(),
            "captured selection did not survive, keeping current selection"
        ),
    }
}

/// Reverses every document operation of `batch_to_undo`, last first,
/// transforms each against the history recorded since it was applied and
/// applies the result through `writer`.
///
/// Pairs in that history that revert each other are folded away first, so
/// undoing and redoing in stack order restores content exactly.
pub(crate) fn undo_batch(writer: &mut Writer<'_>, batch_to_undo: &Batch) {
    let originals: Vec<_> = batch_to_undo.document_operations().rev().cloned().collect();
    for original in originals {
        let reversed = original.reversed();
        let transformed = {
            let document = writer.document();
            let applied = document
                .history()
                .effective_operations_since(reversed.base_version);
            transform(&[reversed], &applied, &TransformOptions::undo(document))
        };

        for mut operation in transformed {
            if !writer.can_edit_at(&operation) {
                tracing::debug!(
                    target: "palimpsest.undo",
                    op = %operation,
                    "region not editable, applying no-op"
                );
                operation = operation.to_no_op();
            } else if let Err(error) = writer.document().validate_operation(&operation) {
                tracing::debug!(
                    target: "palimpsest.undo",
                    op = %operation,
                    %error,
                    "transformed operation invalid, applying no-op"
                );
                operation = operation.to_no_op();
            }

            let undoing = writer.document().version();
            match writer.apply(operation) {
                Ok(()) => writer
                    .history_mut()
                    .set_operation_as_undone(original.base_version, undoing),
                Err(error) => tracing::debug!(
                    target: "palimpsest.undo",
                    %error,
                    "skipping operation that failed to apply"
                ),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
