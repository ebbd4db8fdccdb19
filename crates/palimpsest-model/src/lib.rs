#![forbid(unsafe_code)]

//! Versioned document model for palimpsest.
//!
//! Every edit is an [`Operation`]: atomic, reversible, tagged with the
//! document version it expects, and recorded in the [`History`] log once
//! applied. [`transform_sets`] rewrites operations computed against an old
//! version so they apply cleanly to the current one.
//!
//! # Module Structure
//!
//! - [`position`] / [`range`]: addressing and positional transformation
//! - [`operation`]: operation kinds and reversal
//! - [`document`]: roots, items, markers, apply and validation
//! - [`history`]: the version-indexed operation log
//! - [`batch`]: change groups
//! - [`transform`]: operational transformation
//! - [`selection`] / [`model`]: the editing session

pub mod batch;
pub mod document;
pub mod error;
pub mod history;
pub mod model;
pub mod operation;
pub mod position;
pub mod range;
pub mod selection;
pub mod transform;

pub use batch::{Batch, BatchId, BatchMetadata, BatchType, ChangeSource};
pub use document::{Document, Item, Root, RootKind};
pub use error::{ModelError, Result};
pub use history::History;
pub use model::{ChangeEvent, Model, Subscription, Writer};
pub use operation::{
    AttributeOperation, InsertOperation, MarkerOperation, MoveOperation, Operation, OperationKind,
    OperationMeta, Relation, RelationSide,
};
pub use position::{Position, RootId, Stickiness, Version};
pub use range::{Range, normalize_ranges};
pub use selection::Selection;
pub use transform::{TransformOptions, TransformedSets, transform, transform_sets};
