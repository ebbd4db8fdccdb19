#![forbid(unsafe_code)]

//! Undo/redo for a collaboratively edited document.
//!
//! Undo does not roll the document back to an older snapshot. It reverses
//! the operations of one batch, transforms the reversals against everything
//! applied since, and applies the result as a new batch. Changes made after
//! the undone batch survive, and any batch on the stack can be undone
//! selectively.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        HistoryManager                           │
//! │  ┌──────────────────┐          ┌──────────────────┐             │
//! │  │   UndoCommand    │          │   RedoCommand    │             │
//! │  │  ┌────────────┐  │  undo()  │  ┌────────────┐  │             │
//! │  │  │ G3 + sel   │  │ ──────►  │  │ U2 + sel   │  │             │
//! │  │  ├────────────┤  │          │  └────────────┘  │             │
//! │  │  │ G1 + sel   │  │  ◄────── │                  │             │
//! │  │  └────────────┘  │  redo()  │                  │             │
//! │  └──────────────────┘          └──────────────────┘             │
//! └─────────────────────────────────────────────────────────────────┘
//!                     │ execute()
//!                     ▼
//!   reverse ops ─► transform vs history since ─► apply as one batch
//!                                                    │
//!                                                    ▼
//!                                           restore selection
//! ```
//!
//! # Module Structure
//!
//! - [`command`]: `UndoCommand`, `RedoCommand` and the shared reversal routine
//! - [`history`]: `HistoryManager`, batch registration and stack limits
//! - [`restore`]: mapping a captured selection onto the current document

pub mod command;
pub mod history;
pub mod restore;

pub use command::{CommandOutcome, RedoCommand, StackItem, UndoCommand};
pub use history::{HistoryConfig, HistoryManager};
pub use restore::restore_selection;
