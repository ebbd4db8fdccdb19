#![forbid(unsafe_code)]

//! palimpsest runtime
//!
//! Undo and redo on top of `palimpsest-model`. Undoing a batch reverses its
//! operations and transforms them against everything applied since, so edits
//! made after the undone batch are preserved.
//!
//! # Key Components
//!
//! - [`UndoCommand`] / [`RedoCommand`] - stacks of recorded batches
//! - [`HistoryManager`] - registers batches and cross-feeds the two stacks
//! - [`restore_selection`] - maps a captured selection onto the current document
//! - [`Editor`] - a model plus its history, the usual entry point

pub mod editor;
pub mod undo;

pub use editor::Editor;
pub use undo::{
    CommandOutcome, HistoryConfig, HistoryManager, RedoCommand, StackItem, UndoCommand,
    restore_selection,
};
