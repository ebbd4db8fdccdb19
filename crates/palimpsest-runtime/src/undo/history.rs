#![forbid(unsafe_code)]

//! History manager wiring batches into the undo and redo commands.
//!
//! The [`HistoryManager`] decides which completed batches become undo steps
//! and routes the batches produced by undo and redo onto the opposite stack.
//!
//! # Invariants
//!
//! 1. A batch id is registered at most once. Ids grow with creation order,
//!    so only the newest id seen is remembered.
//! 2. Batches flagged not undoable, undo batches and empty batches never
//!    reach the undo stack.
//! 3. A fresh user batch clears the redo stack; a redo batch does not.
//! 4. `undo_depth() <= config.max_depth` after any operation.
//!
//! ```text
//! register(G1), register(G2)
//! ┌───────────────────────────────────────────────┐
//! │ Undo: [G1, G2]                                │
//! │ Redo: []                                      │
//! └───────────────────────────────────────────────┘
//!
//! undo()  produces U2 (reverts G2)
//! ┌───────────────────────────────────────────────┐
//! │ Undo: [G1]                                    │
//! │ Redo: [U2]                                    │
//! └───────────────────────────────────────────────┘
//!
//! redo()  produces R2 (reverts U2)
//! ┌───────────────────────────────────────────────┐
//! │ Undo: [G1, R2]                                │
//! │ Redo: []                                      │
//! └───────────────────────────────────────────────┘
//! ```

use std::fmt;

use palimpsest_model::{Batch, BatchId, Model, Selection};

use super::command::{CommandOutcome, RedoCommand, UndoCommand};

/// Configuration for the history manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum number of batches kept on the undo stack.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// No depth limit.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_depth: usize::MAX,
        }
    }
}

/// Owns the undo and redo commands plus the newest batch id seen.
pub struct HistoryManager {
    undo: UndoCommand,
    redo: RedoCommand,
    last_seen: Option<BatchId>,
    config: HistoryConfig,
}

impl fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryManager")
            .field("undo_depth", &self.undo.depth())
            .field("redo_depth", &self.redo.depth())
            .field("last_seen", &self.last_seen)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl HistoryManager {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            undo: UndoCommand::new(),
            redo: RedoCommand::new(),
            last_seen: None,
            config,
        }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Offers a completed batch to the undo stack.
    ///
    /// `selection_before` is the selection as it was before the batch ran.
    /// Returns whether the batch was recorded.
    pub fn register_batch(&mut self, batch: &Batch, selection_before: Selection) -> bool {
        if batch.is_empty() || !batch.is_undoable() || batch.is_undo() {
            return false;
        }
        if !self.see(batch.id()) {
            return false;
        }

        if !batch.is_redo() {
            self.redo.clear_stack();
        }
        self.undo.add_batch(batch.clone(), selection_before);
        tracing::debug!(
            target: "palimpsest.undo",
            batch = %batch.id(),
            redo = batch.is_redo(),
            undo_depth = self.undo.depth(),
            "batch registered"
        );
        self.enforce_limits();
        true
    }

    // ========================================================================
    // Undo/Redo
    // ========================================================================

    /// Undoes `target`, or the most recent step when `None`.
    ///
    /// The produced batch goes onto the redo stack together with the
    /// selection as it was just before the undo.
    pub fn undo(&mut self, model: &mut Model, target: Option<BatchId>) -> Option<CommandOutcome> {
        let selection_before = model.selection().clone();
        let outcome = self.undo.execute(model, target)?;
        self.see(outcome.produced.id());
        self.redo
            .add_batch(outcome.produced.clone(), selection_before);
        Some(outcome)
    }

    /// Redoes the most recent undo.
    pub fn redo(&mut self, model: &mut Model) -> Option<CommandOutcome> {
        let selection_before = model.selection().clone();
        let outcome = self.redo.execute(model)?;
        self.register_batch(&outcome.produced, selection_before);
        Some(outcome)
    }

    // ========================================================================
    // Query
    // ========================================================================

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.undo.is_enabled()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.redo.is_enabled()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.depth()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.depth()
    }

    /// Whether `id` can be undone selectively.
    #[must_use]
    pub fn is_undoable(&self, id: BatchId) -> bool {
        self.undo.contains(id)
    }

    /// Descriptions for undo steps, most recent first.
    #[must_use]
    pub fn undo_descriptions(&self, limit: usize) -> Vec<&str> {
        self.undo.descriptions(limit)
    }

    /// Descriptions for redo steps, most recent first.
    #[must_use]
    pub fn redo_descriptions(&self, limit: usize) -> Vec<&str> {
        self.redo.descriptions(limit)
    }

    #[must_use]
    pub fn next_undo_description(&self) -> Option<&str> {
        self.undo.descriptions(1).into_iter().next()
    }

    #[must_use]
    pub fn next_redo_description(&self) -> Option<&str> {
        self.redo.descriptions(1).into_iter().next()
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Clears both stacks. Used when the whole content is replaced outside
    /// of undo.
    pub fn clear(&mut self) {
        self.undo.clear_stack();
        self.redo.clear_stack();
        tracing::debug!(target: "palimpsest.undo", "history cleared");
    }

    /// Records `id` as seen. Returns `false` when it is not newer than the
    /// newest id seen so far.
    fn see(&mut self, id: BatchId) -> bool {
        if self.last_seen.is_some_and(|last| id <= last) {
            return false;
        }
        self.last_seen = Some(id);
        true
    }

    fn enforce_limits(&mut self) {
        while self.undo.depth() > self.config.max_depth {
            if let Some(evicted) = self.undo.evict_oldest() {
                tracing::trace!(
                    target: "palimpsest.undo",
                    batch = %evicted.batch.id(),
                    "evicted oldest undo step"
                );
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use palimpsest_model::{BatchType, Position, RootId};

    fn model_with(text: &str) -> Model {
        let mut model = Model::new();
        let batch = model.create_batch(BatchType::not_undoable());
        let (_, result) =
            model.enqueue_change(batch, |writer| writer.insert_text(Position::main(0), text));
        result.expect("seed");
        model
    }

    fn type_text(model: &mut Model, mgr: &mut HistoryManager, at: usize, text: &str) -> BatchId {
        let selection = model.selection().clone();
        let batch = model
            .create_batch(BatchType::default())
            .with_description(format!("type {text}"));
        let (batch, result) =
            model.enqueue_change(batch, |writer| writer.insert_text(Position::main(at), text));
        result.expect("insert");
        mgr.register_batch(&batch, selection);
        batch.id()
    }

    #[test]
    fn test_new_manager() {
        let mgr = HistoryManager::default();
        assert!(!mgr.can_undo());
        assert!(!mgr.can_redo());
        assert_eq!(mgr.config().max_depth, 100);
    }

    #[test]
    fn test_register_then_undo_redo() {
        let mut model = model_with("AB");
        let mut mgr = HistoryManager::default();
        type_text(&mut model, &mut mgr, 2, "C");
        assert!(mgr.can_undo());

        mgr.undo(&mut model, None).expect("undo");
        assert_eq!(model.text(RootId::MAIN), "AB");
        assert!(!mgr.can_undo());
        assert!(mgr.can_redo());

        mgr.redo(&mut model).expect("redo");
        assert_eq!(model.text(RootId::MAIN), "ABC");
        assert!(mgr.can_undo());
        assert!(!mgr.can_redo());
    }

    #[test]
    fn test_new_batch_clears_redo() {
        let mut model = model_with("AB");
        let mut mgr = HistoryManager::default();
        type_text(&mut model, &mut mgr, 2, "C");
        mgr.undo(&mut model, None).expect("undo");
        assert!(mgr.can_redo());

        type_text(&mut model, &mut mgr, 0, "D");
        assert!(!mgr.can_redo());
        assert_eq!(mgr.undo_depth(), 1);
    }

    #[test]
    fn test_redo_keeps_remaining_redo_steps() {
        let mut model = model_with("");
        let mut mgr = HistoryManager::default();
        type_text(&mut model, &mut mgr, 0, "a");
        type_text(&mut model, &mut mgr, 1, "b");
        mgr.undo(&mut model, None).expect("undo b");
        mgr.undo(&mut model, None).expect("undo a");
        assert_eq!(mgr.redo_depth(), 2);

        mgr.redo(&mut model).expect("redo a");
        assert_eq!(model.text(RootId::MAIN), "a");
        assert_eq!(mgr.redo_depth(), 1);
        mgr.redo(&mut model).expect("redo b");
        assert_eq!(model.text(RootId::MAIN), "ab");
    }

    #[test]
    fn test_ignores_non_undoable_and_duplicates() {
        let mut model = model_with("AB");
        let mut mgr = HistoryManager::default();
        let selection = model.selection().clone();

        let batch = model.create_batch(BatchType::not_undoable());
        let (batch, result) =
            model.enqueue_change(batch, |w| w.insert_text(Position::main(0), "x"));
        result.expect("insert");
        assert!(!mgr.register_batch(&batch, selection.clone()));

        let (batch, result) = model.change(|w| w.insert_text(Position::main(0), "y"));
        result.expect("insert");
        assert!(mgr.register_batch(&batch, selection.clone()));
        assert!(!mgr.register_batch(&batch, selection.clone()));
        // An older batch offered late is a duplicate as well.
        let (older, result) = model.change(|w| w.insert_text(Position::main(0), "z"));
        result.expect("insert");
        let (newer, result) = model.change(|w| w.insert_text(Position::main(0), "w"));
        result.expect("insert");
        assert!(mgr.register_batch(&newer, selection.clone()));
        assert!(!mgr.register_batch(&older, selection.clone()));

        let (empty, ()) = model.change(|_| {});
        assert!(!mgr.register_batch(&empty, selection));
        assert_eq!(mgr.undo_depth(), 2);
    }

    #[test]
    fn test_max_depth_evicts_oldest() {
        let mut model = model_with("");
        let mut mgr = HistoryManager::new(HistoryConfig::new(2));
        let first = type_text(&mut model, &mut mgr, 0, "a");
        type_text(&mut model, &mut mgr, 1, "b");
        type_text(&mut model, &mut mgr, 2, "c");
        assert_eq!(mgr.undo_depth(), 2);
        assert!(!mgr.is_undoable(first));
        assert_eq!(mgr.undo_descriptions(10), vec!["type c", "type b"]);
    }

    #[test]
    fn test_descriptions() {
        let mut model = model_with("");
        let mut mgr = HistoryManager::new(HistoryConfig::unlimited());
        type_text(&mut model, &mut mgr, 0, "a");
        type_text(&mut model, &mut mgr, 1, "b");
        assert_eq!(mgr.next_undo_description(), Some("type b"));
        assert_eq!(mgr.next_redo_description(), None);

        mgr.undo(&mut model, None).expect("undo");
        assert_eq!(mgr.next_undo_description(), Some("type a"));
        assert_eq!(mgr.redo_descriptions(10).len(), 1);
    }

    #[test]
    fn test_undo_batch_is_never_registered() {
        let mut model = model_with("");
        let mut mgr = HistoryManager::default();
        type_text(&mut model, &mut mgr, 0, "a");
        let outcome = mgr.undo(&mut model, None).expect("undo");
        let selection = model.selection().clone();
        assert!(!mgr.register_batch(&outcome.produced, selection));
        assert_eq!(mgr.undo_depth(), 0);
        assert!(format!("{mgr:?}").contains("last_seen"));
    }

    #[test]
    fn test_clear() {
        let mut model = model_with("");
        let mut mgr = HistoryManager::default();
        type_text(&mut model, &mut mgr, 0, "a");
        type_text(&mut model, &mut mgr, 1, "b");
        mgr.undo(&mut model, None).expect("undo");
        mgr.clear();
        assert!(!mgr.can_undo());
        assert!(!mgr.can_redo());
    }

    #[test]
    fn test_config_builders() {
        assert_eq!(HistoryConfig::default().with_max_depth(5).max_depth, 5);
        assert_eq!(HistoryConfig::unlimited().max_depth, usize::MAX);
    }

    #[test]
    fn test_debug_impl() {
        let mgr = HistoryManager::default();
        let debug = format!("{mgr:?}");
        assert!(debug.contains("HistoryManager"));
        assert!(debug.contains("undo_depth"));
    }
}
