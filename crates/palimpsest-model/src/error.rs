use thiserror::Error;

use crate::position::{Position, RootId, Version};

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("operation expects version {expected} but the document is at {actual}")]
    VersionMismatch { expected: Version, actual: Version },

    #[error("unknown root: {root}")]
    UnknownRoot { root: RootId },

    #[error("root is detached: {root}")]
    DetachedRoot { root: RootId },

    #[error("root is read-only: {root}")]
    ReadOnlyRoot { root: RootId },

    #[error("position {position} is out of bounds (root length {len})")]
    OutOfBounds { position: Position, len: usize },

    #[error("cannot move range starting at {start} into itself at {target}")]
    MoveIntoItself { start: Position, target: Position },

    #[error("attribute `{key}` at {position} does not hold the expected old value")]
    AttributeMismatch { key: String, position: Position },

    #[error("operation mixes scratch and document roots")]
    ScratchMismatch,

    #[error("marker already exists: {name}")]
    MarkerExists { name: String },

    #[error("unknown marker: {name}")]
    UnknownMarker { name: String },

    #[error("invalid range: {message}")]
    InvalidRange { message: String },
}

impl ModelError {
    #[must_use]
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Whether the error comes from a stale base version rather than bad content.
    #[must_use]
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }
}
