#![forbid(unsafe_code)]

//! The editing session: document, live selection and atomic changes.
//!
//! All mutation goes through [`Model::enqueue_change`], which hands a
//! [`Writer`] to a closure. Every operation the writer produces is applied
//! immediately, recorded in the batch, and mapped onto the live selection.
//! Subscribers hear about the change once, after the closure returns, so no
//! observer ever sees a half-applied change.
//!
//! ```text
//! enqueue_change(batch, |writer| { ... })
//!   ├─ writer.insert_text(..)  -> apply -> history.push -> selection update
//!   ├─ writer.remove(..)       -> apply -> history.push -> selection update
//!   └─ closure returns         -> subscribers notified with one ChangeEvent
//! ```
//!
//! # Failure Modes
//!
//! - **Re-entrant change**: a subscriber cannot start a change of its own; the
//!   model is mutably borrowed for the whole call.
//! - **Error mid-change**: operations applied before a writer error stay
//!   applied and stay in the batch.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::batch::{Batch, BatchId, BatchType};
use crate::document::{Document, Item};
use crate::error::{ModelError, Result};
use crate::history::History;
use crate::operation::{Operation, OperationKind};
use crate::position::{Position, RootId, Version};
use crate::range::Range;
use crate::selection::Selection;

/// Notification emitted once per completed atomic change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub batch_id: BatchId,
    pub batch_type: BatchType,
    pub from_version: Version,
    pub to_version: Version,
    pub operation_count: usize,
}

type ListenerRc = Rc<dyn Fn(&ChangeEvent)>;
type ListenerWeak = Weak<dyn Fn(&ChangeEvent)>;

/// RAII guard for a change listener. Dropping it unsubscribes.
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

pub struct Model {
    document: Document,
    selection: Selection,
    next_batch_id: u64,
    listeners: Vec<ListenerWeak>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("version", &self.document.version())
            .field("selection", &self.selection)
            .field("next_batch_id", &self.next_batch_id)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    #[must_use]
    pub fn new() -> Self {
        Self {
            document: Document::new(),
            selection: Selection::default(),
            next_batch_id: 1,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Structural access (roots, read-only flags). Content changes must go
    /// through [`Model::enqueue_change`].
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.document.version()
    }

    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    #[must_use]
    pub fn text(&self, root: RootId) -> String {
        self.document.text(root)
    }

    /// Whether every root `operation` touches can be edited.
    #[must_use]
    pub fn can_edit_at(&self, operation: &Operation) -> bool {
        operation
            .roots()
            .iter()
            .all(|&root| root.is_graveyard() || self.document.is_editable(root))
    }

    pub fn create_batch(&mut self, batch_type: BatchType) -> Batch {
        let id = BatchId(self.next_batch_id);
        self.next_batch_id += 1;
        Batch::new(id, batch_type)
    }

    /// Runs `f` as one undoable change in a fresh batch.
    pub fn change<R>(&mut self, f: impl FnOnce(&mut Writer<'_>) -> R) -> (Batch, R) {
        let batch = self.create_batch(BatchType::default());
        self.enqueue_change(batch, f)
    }

    /// Runs `f` as one atomic change recorded into `batch`.
    pub fn enqueue_change<R>(
        &mut self,
        batch: Batch,
        f: impl FnOnce(&mut Writer<'_>) -> R,
    ) -> (Batch, R) {
        let from_version = self.document.version();
        let _span = tracing::debug_span!(
            target: "palimpsest.model",
            "model.change",
            batch = %batch.id()
        )
        .entered();

        let mut writer = Writer { model: self, batch };
        let result = f(&mut writer);
        let batch = writer.batch;

        let event = ChangeEvent {
            batch_id: batch.id(),
            batch_type: batch.batch_type(),
            from_version,
            to_version: self.document.version(),
            operation_count: batch.operations().len(),
        };
        tracing::debug!(
            target: "palimpsest.model",
            batch = %event.batch_id,
            from = event.from_version,
            to = event.to_version,
            operations = event.operation_count,
            "change completed"
        );
        self.notify(&event);
        (batch, result)
    }

    /// Applies one operation and maps the live selection through it.
    pub fn apply_operation(&mut self, operation: &Operation) -> Result<()> {
        self.document.apply_operation(operation)?;
        self.update_selection(operation);
        Ok(())
    }

    /// Registers a listener called after every completed change.
    pub fn subscribe(&mut self, listener: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        let strong: ListenerRc = Rc::new(listener);
        self.listeners.push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.iter().filter(|w| w.strong_count() > 0).count()
    }

    fn notify(&mut self, event: &ChangeEvent) {
        self.listeners.retain(|w| w.strong_count() > 0);
        let listeners: Vec<ListenerRc> = self.listeners.iter().filter_map(Weak::upgrade).collect();
        for listener in listeners {
            listener(event);
        }
    }

    fn update_selection(&mut self, operation: &Operation) {
        let removed_at = match &operation.kind {
            OperationKind::Remove(mv) => Some(mv.source),
            OperationKind::Insert(_) | OperationKind::Move(_) => None,
            OperationKind::Attribute(_) | OperationKind::Marker(_) | OperationKind::NoOp => return,
        };
        let ranges = self.selection.ranges_mut();
        for range in ranges.iter_mut() {
            let pieces = range.transformed_by_operation(operation, false);
            let live: Vec<Range> = pieces
                .iter()
                .filter(|piece| !piece.root().is_graveyard())
                .copied()
                .collect();
            *range = match (Range::joined(&live), removed_at) {
                (Some(joined), _) => joined,
                (None, Some(at)) => Range::collapsed(at),
                (None, None) => Range::joined(&pieces).unwrap_or(*range),
            };
        }
        let backward = self.selection.is_backward();
        self.selection = Selection::new(std::mem::take(self.selection.ranges_mut()), backward);
    }
}

/// Handle for producing operations inside one atomic change.
pub struct Writer<'m> {
    model: &'m mut Model,
    batch: Batch,
}

impl fmt::Debug for Writer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("batch", &self.batch.id())
            .field("operations", &self.batch.operations().len())
            .finish()
    }
}

impl Writer<'_> {
    #[must_use]
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        self.model
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.model.document
    }

    /// The history log, for recording undo links.
    pub fn history_mut(&mut self) -> &mut History {
        self.model.document.history_mut()
    }

    #[must_use]
    pub fn can_edit_at(&self, operation: &Operation) -> bool {
        self.model.can_edit_at(operation)
    }

    /// Applies `operation` at the current version and records it in the batch.
    ///
    /// The base version and the document flag are filled in from the current
    /// document state.
    pub fn apply(&mut self, mut operation: Operation) -> Result<()> {
        let document = &self.model.document;
        operation.is_document_operation = operation
            .roots()
            .iter()
            .all(|&root| !document.is_scratch_root(root));
        if operation.is_document_operation {
            operation.base_version = document.version();
        }
        self.model.apply_operation(&operation)?;
        self.batch.add_operation(operation);
        Ok(())
    }

    pub fn insert_text(&mut self, at: Position, text: &str) -> Result<()> {
        self.insert(at, Item::from_text(text))
    }

    pub fn insert(&mut self, at: Position, items: Vec<Item>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.apply(Operation::insert(0, at, items))
    }

    /// Moves the content of `range` into the graveyard.
    ///
    /// Scratch content has no graveyard; removing from a scratch root fails
    /// with [`ModelError::ScratchMismatch`].
    pub fn remove(&mut self, range: Range) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        if self.document().is_scratch_root(range.root()) {
            return Err(ModelError::ScratchMismatch);
        }
        self.apply(Operation::move_to(
            0,
            range.start,
            range.len(),
            Position::graveyard(0),
        ))
    }

    pub fn move_range(&mut self, range: Range, target: Position) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        self.apply(Operation::move_to(0, range.start, range.len(), target))
    }

    pub fn set_attribute(&mut self, range: Range, key: &str, value: Value) -> Result<()> {
        self.write_attribute(range, key, Some(value))
    }

    pub fn remove_attribute(&mut self, range: Range, key: &str) -> Result<()> {
        self.write_attribute(range, key, None)
    }

    /// Emits one attribute operation per run of items sharing the same old value.
    fn write_attribute(&mut self, range: Range, key: &str, value: Option<Value>) -> Result<()> {
        let items = self.document().root(range.root())?.items.as_slice();
        if range.end.offset > items.len() {
            return Err(ModelError::OutOfBounds {
                position: range.end,
                len: items.len(),
            });
        }

        let mut runs: Vec<(Range, Option<Value>)> = Vec::new();
        let mut run_start = range.start.offset;
        for offset in range.start.offset..=range.end.offset {
            let boundary = offset == range.end.offset
                || items[offset].attribute(key) != items[run_start].attribute(key);
            if !boundary {
                continue;
            }
            if offset > run_start {
                let old = items[run_start].attribute(key).cloned();
                if old != value {
                    runs.push((
                        Range::new(
                            Position::new(range.root(), run_start),
                            Position::new(range.root(), offset),
                        ),
                        old,
                    ));
                }
            }
            run_start = offset;
        }

        for (run, old) in runs {
            self.apply(Operation::attribute(0, run, key, old, value.clone()))?;
        }
        Ok(())
    }

    pub fn add_marker(&mut self, name: &str, range: Range, affects_data: bool) -> Result<()> {
        if self.document().marker(name).is_some() {
            return Err(ModelError::MarkerExists {
                name: name.to_string(),
            });
        }
        self.apply(Operation::marker(0, name, None, Some(range), affects_data))
    }

    pub fn update_marker(&mut self, name: &str, range: Range, affects_data: bool) -> Result<()> {
        let Some(old_range) = self.document().marker(name) else {
            return Err(ModelError::UnknownMarker {
                name: name.to_string(),
            });
        };
        self.apply(Operation::marker(0, name, Some(old_range), Some(range), affects_data))
    }

    pub fn remove_marker(&mut self, name: &str, affects_data: bool) -> Result<()> {
        let Some(old_range) = self.document().marker(name) else {
            return Err(ModelError::UnknownMarker {
                name: name.to_string(),
            });
        };
        self.apply(Operation::marker(0, name, Some(old_range), None, affects_data))
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.model.set_selection(selection);
    }
}

// ============================================================================
// Tests
// ============================================================================
