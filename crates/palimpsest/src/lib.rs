#![forbid(unsafe_code)]

//! palimpsest public facade crate.
//!
//! Re-exports the document model and, with the default `runtime` feature,
//! the undo/redo machinery. Most code only needs the [`prelude`].

// --- Model re-exports ------------------------------------------------------

pub use palimpsest_model::{
    Batch, BatchId, BatchMetadata, BatchType, ChangeEvent, ChangeSource, Document, History, Item,
    Model, ModelError, Operation, OperationKind, Position, Range, Result, Root, RootId, RootKind,
    Selection, Stickiness, Subscription, TransformOptions, TransformedSets, Version, Writer,
    transform, transform_sets,
};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "runtime")]
pub use palimpsest_runtime::{
    CommandOutcome, Editor, HistoryConfig, HistoryManager, RedoCommand, UndoCommand,
    restore_selection,
};

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Batch, BatchType, Model, ModelError, Operation, Position, Range, Result, RootId,
        Selection, Writer,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{Editor, HistoryConfig};

    pub use crate::model;
    #[cfg(feature = "runtime")]
    pub use crate::runtime;
}

pub use palimpsest_model as model;
#[cfg(feature = "runtime")]
pub use palimpsest_runtime as runtime;
