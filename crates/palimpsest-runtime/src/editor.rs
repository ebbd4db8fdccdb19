#![forbid(unsafe_code)]

//! Editing session combining a [`Model`] with its undo history.
//!
//! Every change made through [`Editor`] is offered to the
//! [`HistoryManager`] together with the selection captured before it ran.

use palimpsest_model::{
    Batch, BatchId, BatchType, Model, Position, Range, Result, RootId, Writer,
};

use crate::undo::{CommandOutcome, HistoryConfig, HistoryManager};

#[derive(Debug, Default)]
pub struct Editor {
    model: Model,
    history: HistoryManager,
}

impl Editor {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            model: Model::new(),
            history: HistoryManager::new(config),
        }
    }

    /// Wraps an existing model. Nothing applied before is undoable.
    #[must_use]
    pub fn with_model(model: Model, config: HistoryConfig) -> Self {
        Self {
            model,
            history: HistoryManager::new(config),
        }
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Direct model access. Changes made through it bypass the history.
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    #[must_use]
    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    #[must_use]
    pub fn text(&self, root: RootId) -> String {
        self.model.text(root)
    }

    /// Runs `f` as one undoable change.
    pub fn change<R>(&mut self, f: impl FnOnce(&mut Writer<'_>) -> R) -> R {
        self.change_with(BatchType::default(), f)
    }

    pub fn change_with<R>(
        &mut self,
        batch_type: BatchType,
        f: impl FnOnce(&mut Writer<'_>) -> R,
    ) -> R {
        let batch = self.model.create_batch(batch_type);
        self.enqueue(batch, f)
    }

    /// Runs `f` as one undoable change labelled `description`.
    pub fn change_described<R>(
        &mut self,
        description: &str,
        f: impl FnOnce(&mut Writer<'_>) -> R,
    ) -> R {
        let batch = self
            .model
            .create_batch(BatchType::default())
            .with_description(description);
        self.enqueue(batch, f)
    }

    fn enqueue<R>(&mut self, batch: Batch, f: impl FnOnce(&mut Writer<'_>) -> R) -> R {
        let selection_before = self.model.selection().clone();
        let (batch, result) = self.model.enqueue_change(batch, f);
        self.history.register_batch(&batch, selection_before);
        result
    }

    /// Replaces the whole content of `root` with `text`.
    ///
    /// A replace that is not undoable invalidates every recorded step, so it
    /// clears both stacks.
    pub fn set_data(&mut self, root: RootId, text: &str, batch_type: BatchType) -> Result<()> {
        let len = self.model.document().root(root)?.len();
        let whole = Range::new(Position::new(root, 0), Position::new(root, len));
        self.change_with(batch_type, |writer| {
            writer.remove(whole)?;
            writer.insert_text(Position::new(root, 0), text)
        })?;
        if !batch_type.is_undoable {
            self.history.clear();
        }
        Ok(())
    }

    pub fn undo(&mut self) -> Option<CommandOutcome> {
        self.history.undo(&mut self.model, None)
    }

    /// Undoes one specific recorded batch, leaving later changes in place.
    pub fn undo_batch(&mut self, id: BatchId) -> Option<CommandOutcome> {
        self.history.undo(&mut self.model, Some(id))
    }

    pub fn redo(&mut self) -> Option<CommandOutcome> {
        self.history.redo(&mut self.model)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
}
