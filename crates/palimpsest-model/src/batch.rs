#![forbid(unsafe_code)]

//! Change groups: the unit of undo granularity.
//!
//! A [`Batch`] collects the operations produced by one atomic change. Its
//! [`BatchType`] tells the undo machinery whether it should be recorded and
//! whether it was itself produced by an undo or a redo.
//!
//! # Invariants
//!
//! - Document operations inside a batch have contiguous base versions: each one
//!   expects the version produced by its predecessor.
//! - A batch is never modified once the change that filled it completed.

use std::fmt;

use web_time::Instant;

use crate::operation::Operation;
use crate::position::Version;

/// Identifier of a batch within one model session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(pub u64);

impl BatchId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

/// Who or what produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeSource {
    /// Direct user action.
    #[default]
    User,
    /// Application code.
    Programmatic,
    /// Injected from outside the session (e.g. loading data).
    External,
}

/// Provenance flags of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchType {
    pub is_undoable: bool,
    pub is_undo: bool,
    pub is_redo: bool,
}

impl Default for BatchType {
    fn default() -> Self {
        Self::undoable()
    }
}

impl BatchType {
    /// A regular user edit.
    #[must_use]
    pub const fn undoable() -> Self {
        Self {
            is_undoable: true,
            is_undo: false,
            is_redo: false,
        }
    }

    /// A change that must not be undone (e.g. loading data).
    #[must_use]
    pub const fn not_undoable() -> Self {
        Self {
            is_undoable: false,
            is_undo: false,
            is_redo: false,
        }
    }

    /// A batch produced by an undo step.
    #[must_use]
    pub const fn undo() -> Self {
        Self {
            is_undoable: true,
            is_undo: true,
            is_redo: false,
        }
    }

    /// A batch produced by a redo step.
    #[must_use]
    pub const fn redo() -> Self {
        Self {
            is_undoable: true,
            is_undo: false,
            is_redo: true,
        }
    }
}

/// Descriptive data carried by every batch.
#[derive(Debug, Clone)]
pub struct BatchMetadata {
    /// Human-readable description for UI (e.g., "Insert text").
    pub description: String,
    pub timestamp: Instant,
    pub source: ChangeSource,
}

impl BatchMetadata {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            timestamp: Instant::now(),
            source: ChangeSource::User,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: ChangeSource) -> Self {
        self.source = source;
        self
    }
}

impl Default for BatchMetadata {
    fn default() -> Self {
        Self::new("Edit")
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    batch_type: BatchType,
    operations: Vec<Operation>,
    metadata: BatchMetadata,
}

impl Batch {
    #[must_use]
    pub fn new(id: BatchId, batch_type: BatchType) -> Self {
        Self {
            id,
            batch_type,
            operations: Vec::new(),
            metadata: BatchMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: BatchMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> BatchId {
        self.id
    }

    #[must_use]
    pub fn batch_type(&self) -> BatchType {
        self.batch_type
    }

    #[must_use]
    pub fn is_undoable(&self) -> bool {
        self.batch_type.is_undoable
    }

    #[must_use]
    pub fn is_undo(&self) -> bool {
        self.batch_type.is_undo
    }

    #[must_use]
    pub fn is_redo(&self) -> bool {
        self.batch_type.is_redo
    }

    #[must_use]
    pub fn metadata(&self) -> &BatchMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Records an operation that has just been applied.
    pub fn add_operation(&mut self, operation: Operation) {
        if operation.is_document_operation
            && let Some(last) = self.last_document_operation()
        {
            debug_assert_eq!(
                operation.base_version,
                last.base_version + 1,
                "batch operations must have contiguous versions"
            );
        }
        self.operations.push(operation);
    }

    pub fn document_operations(&self) -> impl DoubleEndedIterator<Item = &Operation> + '_ {
        self.operations.iter().filter(|op| op.is_document_operation)
    }

    /// Version of the document right before the batch's first document operation.
    #[must_use]
    pub fn base_version(&self) -> Option<Version> {
        self.document_operations().next().map(|op| op.base_version)
    }

    #[must_use]
    pub fn last_document_operation(&self) -> Option<&Operation> {
        self.document_operations().next_back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Item;
    use crate::position::Position;

    #[test]
    fn batch_versions_track_document_operations() {
        let mut batch = Batch::new(BatchId(1), BatchType::default());
        assert_eq!(batch.base_version(), None);
        batch.add_operation(
            Operation::insert(0, Position::new(crate::RootId(5), 0), Item::from_text("s"))
                .with_document_operation(false),
        );
        batch.add_operation(Operation::insert(3, Position::main(0), Item::from_text("a")));
        batch.add_operation(Operation::insert(4, Position::main(1), Item::from_text("b")));
        assert_eq!(batch.base_version(), Some(3));
        assert_eq!(batch.last_document_operation().map(|op| op.base_version), Some(4));
        assert_eq!(batch.document_operations().count(), 2);
        assert_eq!(batch.operations().len(), 3);
    }

    #[test]
    fn batch_type_presets() {
        assert!(BatchType::undo().is_undo);
        assert!(BatchType::redo().is_redo);
        assert!(!BatchType::not_undoable().is_undoable);
        assert_eq!(BatchType::default(), BatchType::undoable());
    }

    #[test]
    fn metadata_builder() {
        let batch = Batch::new(BatchId(2), BatchType::default())
            .with_metadata(BatchMetadata::new("Paste").with_source(ChangeSource::Programmatic));
        assert_eq!(batch.description(), "Paste");
        assert_eq!(batch.metadata().source, ChangeSource::Programmatic);
        assert_eq!(BatchId(2).to_string(), "batch#2");
    }
}
