#![forbid(unsafe_code)]

//! Atomic, reversible document operations.
//!
//! Every [`Operation`] names the document version it expects to be applied
//! against (`base_version`). Applying it advances the document version by one.
//!
//! # Kinds
//!
//! | kind      | payload                               | reverse                      |
//! |-----------|---------------------------------------|------------------------------|
//! | Insert    | position, items                       | Remove into the graveyard    |
//! | Remove    | source, how_many, graveyard target    | Move back out                |
//! | Move      | source, how_many, target              | Move back                    |
//! | Attribute | range, key, old value, new value      | swap old and new             |
//! | Marker    | name, old range, new range            | swap old and new             |
//! | NoOp      | none                                  | NoOp                         |
//!
//! A Remove is a Move whose target lies in the graveyard; [`Operation::move_to`]
//! picks the tag from the target root so the two never disagree.

use std::fmt;

use serde_json::Value;
use smallvec::{SmallVec, smallvec};

use crate::document::Item;
use crate::position::{Position, RootId, Stickiness, Version};
use crate::range::Range;

/// Which side of a removed range a transformed operation was anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelationSide {
    /// The operation targeted the start of the removed content.
    Before,
    /// The operation targeted the end of the removed content.
    After,
}

/// Hint recorded during transformation: this operation was anchored next to
/// content removed by the operation applied at `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relation {
    pub version: Version,
    pub side: RelationSide,
}

/// Transformation metadata carried by value.
///
/// References into the history log are version numbers, so an operation stays
/// meaningful after the operations it points at were transformed away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperationMeta {
    /// Version of the operation this one was produced by reversing.
    pub reverses: Option<Version>,
    /// Anchor hint relative to an earlier removal.
    pub relation: Option<Relation>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InsertOperation {
    pub position: Position,
    pub items: Vec<Item>,
}

impl InsertOperation {
    #[must_use]
    pub fn how_many(&self) -> usize {
        self.items.len()
    }
}

/// Moves `how_many` items starting at `source` to `target`.
///
/// `target` is expressed in the coordinates before the move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveOperation {
    pub source: Position,
    pub how_many: usize,
    pub target: Position,
}

impl MoveOperation {
    #[must_use]
    pub fn source_range(&self) -> Range {
        Range::from_position_and_shift(self.source, self.how_many)
    }

    /// Where the moved content starts once the move is applied.
    #[must_use]
    pub fn insertion_position(&self) -> Option<Position> {
        self.target.transformed_by_deletion(self.source, self.how_many)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeOperation {
    pub range: Range,
    pub key: String,
    /// Value every item in `range` holds before the change (`None` = unset).
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkerOperation {
    pub name: String,
    pub old_range: Option<Range>,
    pub new_range: Option<Range>,
    pub affects_data: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperationKind {
    Insert(InsertOperation),
    Remove(MoveOperation),
    Move(MoveOperation),
    Attribute(AttributeOperation),
    Marker(MarkerOperation),
    NoOp,
}

impl OperationKind {
    /// A move or a remove, tagged by the target root.
    #[must_use]
    pub fn from_move(mv: MoveOperation) -> Self {
        if mv.target.root.is_graveyard() {
            Self::Remove(mv)
        } else {
            Self::Move(mv)
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Remove(_) => "remove",
            Self::Move(_) => "move",
            Self::Attribute(_) => "attribute",
            Self::Marker(_) => "marker",
            Self::NoOp => "noop",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Operation {
    pub base_version: Version,
    pub kind: OperationKind,
    /// `false` for operations on scratch roots; those never touch the version
    /// counter or the history log.
    pub is_document_operation: bool,
    pub meta: OperationMeta,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind.name(), self.base_version)?;
        match &self.kind {
            OperationKind::Insert(op) => write!(f, " {} +{}", op.position, op.how_many()),
            OperationKind::Remove(op) | OperationKind::Move(op) => {
                write!(f, " {} x{} -> {}", op.source, op.how_many, op.target)
            }
            OperationKind::Attribute(op) => write!(f, " {} {}", op.range, op.key),
            OperationKind::Marker(op) => write!(f, " {}", op.name),
            OperationKind::NoOp => Ok(()),
        }
    }
}

impl Operation {
    #[must_use]
    pub fn new(base_version: Version, kind: OperationKind) -> Self {
        Self {
            base_version,
            kind,
            is_document_operation: true,
            meta: OperationMeta::default(),
        }
    }

    #[must_use]
    pub fn insert(base_version: Version, position: Position, items: Vec<Item>) -> Self {
        Self::new(
            base_version,
            OperationKind::Insert(InsertOperation { position, items }),
        )
    }

    /// A move, or a remove when `target` lies in the graveyard.
    #[must_use]
    pub fn move_to(
        base_version: Version,
        source: Position,
        how_many: usize,
        target: Position,
    ) -> Self {
        Self::new(
            base_version,
            OperationKind::from_move(MoveOperation {
                source,
                how_many,
                target,
            }),
        )
    }

    #[must_use]
    pub fn attribute(
        base_version: Version,
        range: Range,
        key: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> Self {
        Self::new(
            base_version,
            OperationKind::Attribute(AttributeOperation {
                range,
                key: key.into(),
                old_value,
                new_value,
            }),
        )
    }

    #[must_use]
    pub fn marker(
        base_version: Version,
        name: impl Into<String>,
        old_range: Option<Range>,
        new_range: Option<Range>,
        affects_data: bool,
    ) -> Self {
        Self::new(
            base_version,
            OperationKind::Marker(MarkerOperation {
                name: name.into(),
                old_range,
                new_range,
                affects_data,
            }),
        )
    }

    #[must_use]
    pub fn no_op(base_version: Version) -> Self {
        Self::new(base_version, OperationKind::NoOp)
    }

    #[must_use]
    pub fn with_document_operation(mut self, is_document_operation: bool) -> Self {
        self.is_document_operation = is_document_operation;
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: OperationMeta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn is_no_op(&self) -> bool {
        matches!(self.kind, OperationKind::NoOp)
    }

    /// A move or remove whose content would land exactly where it already is.
    #[must_use]
    pub fn is_self_move(&self) -> bool {
        match &self.kind {
            OperationKind::Move(mv) | OperationKind::Remove(mv) => {
                mv.insertion_position() == Some(mv.source)
            }
            _ => false,
        }
    }

    /// The same operation turned into a no-op, keeping version and flags.
    #[must_use]
    pub fn to_no_op(&self) -> Self {
        Self {
            kind: OperationKind::NoOp,
            ..self.clone()
        }
    }

    /// Roots this operation reads or writes.
    #[must_use]
    pub fn roots(&self) -> SmallVec<[RootId; 2]> {
        match &self.kind {
            OperationKind::Insert(op) => smallvec![op.position.root],
            OperationKind::Remove(op) | OperationKind::Move(op) => {
                if op.source.root == op.target.root {
                    smallvec![op.source.root]
                } else {
                    smallvec![op.source.root, op.target.root]
                }
            }
            OperationKind::Attribute(op) => smallvec![op.range.root()],
            OperationKind::Marker(op) => op
                .old_range
                .iter()
                .chain(op.new_range.iter())
                .map(Range::root)
                .fold(SmallVec::new(), |mut roots, root| {
                    if !roots.contains(&root) {
                        roots.push(root);
                    }
                    roots
                }),
            OperationKind::NoOp => SmallVec::new(),
        }
    }

    /// The operation that undoes this one, valid right after this one was applied.
    ///
    /// Pure function of the payload: no document lookup happens. The result
    /// remembers which version it reverses so transformation can consult
    /// relation hints recorded against it.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let kind = match &self.kind {
            OperationKind::Insert(op) => OperationKind::Remove(MoveOperation {
                source: op.position,
                how_many: op.how_many(),
                target: Position::graveyard(0),
            }),
            OperationKind::Remove(op) | OperationKind::Move(op) => {
                let moved_to = op.insertion_position().unwrap_or(op.target);
                OperationKind::from_move(MoveOperation {
                    source: moved_to,
                    how_many: op.how_many,
                    target: op
                        .source
                        .transformed_by_insertion(moved_to, op.how_many, Stickiness::ToNone),
                })
            }
            OperationKind::Attribute(op) => OperationKind::Attribute(AttributeOperation {
                range: op.range,
                key: op.key.clone(),
                old_value: op.new_value.clone(),
                new_value: op.old_value.clone(),
            }),
            OperationKind::Marker(op) => OperationKind::Marker(MarkerOperation {
                name: op.name.clone(),
                old_range: op.new_range,
                new_range: op.old_range,
                affects_data: op.affects_data,
            }),
            OperationKind::NoOp => OperationKind::NoOp,
        };
        Self {
            base_version: self.base_version + 1,
            kind,
            is_document_operation: self.is_document_operation,
            meta: OperationMeta {
                reverses: Some(self.base_version),
                relation: None,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
