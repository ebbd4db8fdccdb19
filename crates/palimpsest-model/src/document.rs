#![forbid(unsafe_code)]

//! The document: roots of items, named markers, a version counter and the
//! history log.
//!
//! # Roots
//!
//! ```text
//! root#0  $graveyard  discard area, removed content lands here
//! root#1  main        default content root
//! root#N  ...         created at runtime (content or scratch)
//! ```
//!
//! Scratch roots hold detached content: operations on them are not document
//! operations, so they neither advance the version nor enter the history.
//!
//! # Failure Modes
//!
//! - **Stale operation**: a document operation whose `base_version` differs
//!   from the current version is rejected with `VersionMismatch`.
//! - **Invalid payload**: out-of-bounds offsets, moving a range into itself and
//!   attribute old-value mismatches are rejected before any mutation happens.

use std::collections::BTreeMap;

use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{ModelError, Result};
use crate::history::History;
use crate::operation::{Operation, OperationKind};
use crate::position::{Position, RootId, Version};
use crate::range::Range;

/// One grapheme cluster with its attributes.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Item {
    pub text: String,
    pub attributes: BTreeMap<String, Value>,
}

impl Item {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Splits `text` into one item per grapheme cluster.
    #[must_use]
    pub fn from_text(text: &str) -> Vec<Self> {
        text.graphemes(true).map(Self::new).collect()
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    Content,
    Graveyard,
    Scratch,
}

#[derive(Debug, Clone)]
pub struct Root {
    pub name: String,
    pub kind: RootKind,
    pub items: Vec<Item>,
    pub read_only: bool,
    pub attached: bool,
}

impl Root {
    fn new(name: impl Into<String>, kind: RootKind) -> Self {
        Self {
            name: name.into(),
            kind,
            items: Vec::new(),
            read_only: false,
            attached: true,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.items.iter().map(|item| item.text.as_str()).collect()
    }
}

pub const GRAVEYARD_NAME: &str = "$graveyard";
pub const MAIN_NAME: &str = "main";

#[derive(Debug, Clone)]
pub struct Document {
    roots: Vec<Root>,
    markers: BTreeMap<String, Range>,
    version: Version,
    history: History,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document with the graveyard and an empty `main` root at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: vec![
                Root::new(GRAVEYARD_NAME, RootKind::Graveyard),
                Root::new(MAIN_NAME, RootKind::Content),
            ],
            markers: BTreeMap::new(),
            version: 0,
            history: History::new(),
        }
    }

    // ========================================================================
    // Roots
    // ========================================================================

    pub fn create_root(&mut self, name: impl Into<String>) -> RootId {
        self.push_root(Root::new(name, RootKind::Content))
    }

    pub fn create_scratch_root(&mut self, name: impl Into<String>) -> RootId {
        self.push_root(Root::new(name, RootKind::Scratch))
    }

    fn push_root(&mut self, root: Root) -> RootId {
        let id = RootId(self.roots.len() as u32);
        tracing::debug!(
            target: "palimpsest.model",
            root = %id,
            name = %root.name,
            kind = ?root.kind,
            "root created"
        );
        self.roots.push(root);
        id
    }

    /// Makes a content root unaddressable. Its items stay in memory so that
    /// history entries referencing it remain inspectable.
    pub fn detach_root(&mut self, id: RootId) -> Result<()> {
        let root = self.root_mut(id)?;
        if root.kind == RootKind::Graveyard {
            return Err(ModelError::invalid_range("the graveyard cannot be detached"));
        }
        root.attached = false;
        tracing::debug!(target: "palimpsest.model", root = %id, "root detached");
        Ok(())
    }

    pub fn set_root_read_only(&mut self, id: RootId, read_only: bool) -> Result<()> {
        self.root_mut(id)?.read_only = read_only;
        Ok(())
    }

    pub fn root(&self, id: RootId) -> Result<&Root> {
        self.roots
            .get(id.0 as usize)
            .ok_or(ModelError::UnknownRoot { root: id })
    }

    fn root_mut(&mut self, id: RootId) -> Result<&mut Root> {
        self.roots
            .get_mut(id.0 as usize)
            .ok_or(ModelError::UnknownRoot { root: id })
    }

    #[must_use]
    pub fn root_by_name(&self, name: &str) -> Option<RootId> {
        self.roots
            .iter()
            .position(|root| root.name == name)
            .map(|index| RootId(index as u32))
    }

    pub fn root_ids(&self) -> impl Iterator<Item = RootId> + '_ {
        (0..self.roots.len()).map(|index| RootId(index as u32))
    }

    /// The root exists and is attached.
    #[must_use]
    pub fn is_addressable(&self, id: RootId) -> bool {
        self.root(id).is_ok_and(|root| root.attached)
    }

    /// The root is addressable and not read-only.
    #[must_use]
    pub fn is_editable(&self, id: RootId) -> bool {
        self.root(id).is_ok_and(|root| root.attached && !root.read_only)
    }

    /// The root holds live document content (not graveyard, not scratch,
    /// not detached).
    #[must_use]
    pub fn is_content_root(&self, id: RootId) -> bool {
        self.root(id)
            .is_ok_and(|root| root.attached && root.kind == RootKind::Content)
    }

    #[must_use]
    pub fn is_scratch_root(&self, id: RootId) -> bool {
        self.root(id).is_ok_and(|root| root.kind == RootKind::Scratch)
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Concatenated text of a root; empty for unknown roots.
    #[must_use]
    pub fn text(&self, id: RootId) -> String {
        self.root(id).map(Root::text).unwrap_or_default()
    }

    #[must_use]
    pub fn items(&self, id: RootId) -> &[Item] {
        self.root(id).map_or(&[], |root| root.items.as_slice())
    }

    #[must_use]
    pub fn marker(&self, name: &str) -> Option<Range> {
        self.markers.get(name).copied()
    }

    pub fn markers(&self) -> impl Iterator<Item = (&str, Range)> + '_ {
        self.markers.iter().map(|(name, range)| (name.as_str(), *range))
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    // ========================================================================
    // Apply
    // ========================================================================

    /// Checks that `operation` could be applied right now, ignoring its version.
    pub fn validate_operation(&self, operation: &Operation) -> Result<()> {
        self.check_scope(operation)?;
        match &operation.kind {
            OperationKind::Insert(op) => self.check_position(op.position),
            OperationKind::Remove(op) | OperationKind::Move(op) => {
                self.check_range(&op.source_range())?;
                self.check_position(op.target)?;
                if op.insertion_position().is_none() {
                    return Err(ModelError::MoveIntoItself {
                        start: op.source,
                        target: op.target,
                    });
                }
                Ok(())
            }
            OperationKind::Attribute(op) => {
                self.check_range(&op.range)?;
                let root = self.root(op.range.root())?;
                for offset in op.range.start.offset..op.range.end.offset {
                    if root.items[offset].attribute(&op.key) != op.old_value.as_ref() {
                        return Err(ModelError::AttributeMismatch {
                            key: op.key.clone(),
                            position: Position::new(op.range.root(), offset),
                        });
                    }
                }
                Ok(())
            }
            OperationKind::Marker(op) => match &op.new_range {
                Some(range) => self.check_range(range),
                None => Ok(()),
            },
            OperationKind::NoOp => Ok(()),
        }
    }

    /// Applies `operation`, advancing the version and recording it in the
    /// history when it is a document operation.
    pub fn apply_operation(&mut self, operation: &Operation) -> Result<()> {
        if operation.is_document_operation && operation.base_version != self.version {
            return Err(ModelError::VersionMismatch {
                expected: operation.base_version,
                actual: self.version,
            });
        }
        self.validate_operation(operation)?;

        match &operation.kind {
            OperationKind::Insert(op) => {
                let root = self.root_mut(op.position.root)?;
                let at = op.position.offset;
                root.items.splice(at..at, op.items.iter().cloned());
            }
            OperationKind::Remove(op) | OperationKind::Move(op) => {
                let insert_at = op.insertion_position().ok_or(ModelError::MoveIntoItself {
                    start: op.source,
                    target: op.target,
                })?;
                let start = op.source.offset;
                let moved: Vec<Item> = self
                    .root_mut(op.source.root)?
                    .items
                    .drain(start..start + op.how_many)
                    .collect();
                let root = self.root_mut(insert_at.root)?;
                root.items.splice(insert_at.offset..insert_at.offset, moved);
            }
            OperationKind::Attribute(op) => {
                let root = self.root_mut(op.range.root())?;
                for item in &mut root.items[op.range.start.offset..op.range.end.offset] {
                    match &op.new_value {
                        Some(value) => {
                            item.attributes.insert(op.key.clone(), value.clone());
                        }
                        None => {
                            item.attributes.remove(&op.key);
                        }
                    }
                }
            }
            OperationKind::Marker(op) => match op.new_range {
                Some(range) => {
                    self.markers.insert(op.name.clone(), range);
                }
                None => {
                    self.markers.remove(&op.name);
                }
            },
            OperationKind::NoOp => {}
        }

        if matches!(
            operation.kind,
            OperationKind::Insert(_) | OperationKind::Move(_) | OperationKind::Remove(_)
        ) {
            self.transform_markers(operation);
        }

        if operation.is_document_operation {
            self.version += 1;
            self.history.push(operation.clone());
        }
        tracing::trace!(
            target: "palimpsest.model",
            op = %operation,
            version = self.version,
            "operation applied"
        );
        Ok(())
    }

    fn transform_markers(&mut self, operation: &Operation) {
        for range in self.markers.values_mut() {
            let pieces = range.transformed_by_operation(operation, false);
            if let Some(joined) = Range::joined(&pieces) {
                *range = joined;
            }
        }
    }

    fn check_scope(&self, operation: &Operation) -> Result<()> {
        let roots = operation.roots();
        let mut scratch = 0;
        for &id in &roots {
            let root = self.root(id)?;
            if !root.attached {
                return Err(ModelError::DetachedRoot { root: id });
            }
            if root.kind == RootKind::Scratch {
                scratch += 1;
            }
        }
        let mixed = scratch > 0 && scratch < roots.len();
        let misflagged = !roots.is_empty() && (scratch > 0) == operation.is_document_operation;
        if mixed || misflagged {
            return Err(ModelError::ScratchMismatch);
        }
        Ok(())
    }

    fn check_position(&self, position: Position) -> Result<()> {
        let len = self.root(position.root)?.len();
        if position.offset > len {
            return Err(ModelError::OutOfBounds { position, len });
        }
        Ok(())
    }

    fn check_range(&self, range: &Range) -> Result<()> {
        if range.start.root != range.end.root || range.start.offset > range.end.offset {
            return Err(ModelError::invalid_range(format!("{range} is malformed")));
        }
        self.check_position(range.end)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document_with(text: &str) -> Document {
        let mut doc = Document::new();
        doc.apply_operation(&Operation::insert(0, Position::main(0), Item::from_text(text)))
            .expect("seed insert");
        doc
    }

    #[test]
    fn test_new_document_has_graveyard_and_main() {
        let doc = Document::new();
        assert_eq!(doc.root_by_name(GRAVEYARD_NAME), Some(RootId::GRAVEYARD));
        assert_eq!(doc.root_by_name(MAIN_NAME), Some(RootId::MAIN));
        assert_eq!(doc.version(), 0);
        assert!(doc.history().is_empty());
    }

    #[test]
    fn test_insert_advances_version_and_history() {
        let doc = document_with("AB");
        assert_eq!(doc.text(RootId::MAIN), "AB");
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.history().len(), 1);
    }

    #[test]
    fn test_graphemes_are_single_items() {
        let doc = document_with("e\u{301}x");
        assert_eq!(doc.items(RootId::MAIN).len(), 2);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut doc = document_with("AB");
        let err = doc
            .apply_operation(&Operation::insert(0, Position::main(0), Item::from_text("X")))
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::VersionMismatch {
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn test_remove_moves_into_graveyard() {
        let mut doc = document_with("ABC");
        doc.apply_operation(&Operation::move_to(1, Position::main(1), 1, Position::graveyard(0)))
            .unwrap();
        assert_eq!(doc.text(RootId::MAIN), "AC");
        assert_eq!(doc.text(RootId::GRAVEYARD), "B");
    }

    #[test]
    fn test_move_within_root() {
        let mut doc = document_with("ABCDE");
        doc.apply_operation(&Operation::move_to(1, Position::main(1), 2, Position::main(5)))
            .unwrap();
        assert_eq!(doc.text(RootId::MAIN), "ADEBC");
        doc.apply_operation(&Operation::move_to(2, Position::main(3), 2, Position::main(1)))
            .unwrap();
        assert_eq!(doc.text(RootId::MAIN), "ABCDE");
    }

    #[test]
    fn test_move_into_itself_rejected() {
        let mut doc = document_with("ABCDE");
        let err = doc
            .apply_operation(&Operation::move_to(1, Position::main(1), 3, Position::main(2)))
            .unwrap_err();
        assert!(matches!(err, ModelError::MoveIntoItself { .. }));
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut doc = document_with("AB");
        let err = doc
            .apply_operation(&Operation::insert(1, Position::main(3), Item::from_text("X")))
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::OutOfBounds {
                position: Position::main(3),
                len: 2
            }
        );
    }

    #[test]
    fn test_attribute_requires_old_value() {
        let mut doc = document_with("AB");
        let set = Operation::attribute(1, Range::main(0, 2), "bold", None, Some(json!(true)));
        doc.apply_operation(&set).unwrap();
        assert_eq!(doc.items(RootId::MAIN)[1].attribute("bold"), Some(&json!(true)));

        let stale = Operation::attribute(2, Range::main(0, 1), "bold", None, Some(json!(false)));
        assert!(matches!(
            doc.apply_operation(&stale),
            Err(ModelError::AttributeMismatch { .. })
        ));

        doc.apply_operation(&set.reversed()).unwrap();
        assert_eq!(doc.items(RootId::MAIN)[0].attribute("bold"), None);
    }

    #[test]
    fn test_markers_follow_content() {
        let mut doc = document_with("ABCD");
        doc.apply_operation(&Operation::marker(1, "comment", None, Some(Range::main(1, 3)), false))
            .unwrap();
        doc.apply_operation(&Operation::insert(2, Position::main(0), Item::from_text("XY")))
            .unwrap();
        assert_eq!(doc.marker("comment"), Some(Range::main(3, 5)));
        doc.apply_operation(&Operation::marker(3, "comment", Some(Range::main(3, 5)), None, false))
            .unwrap();
        assert_eq!(doc.marker("comment"), None);
    }

    #[test]
    fn test_scratch_operations_skip_history() {
        let mut doc = Document::new();
        let scratch = doc.create_scratch_root("clipboard");
        let op = Operation::insert(0, Position::new(scratch, 0), Item::from_text("tmp"))
            .with_document_operation(false);
        doc.apply_operation(&op).unwrap();
        assert_eq!(doc.text(scratch), "tmp");
        assert_eq!(doc.version(), 0);
        assert!(doc.history().is_empty());

        let flagged_wrong = Operation::insert(0, Position::new(scratch, 0), Item::from_text("x"));
        assert_eq!(doc.apply_operation(&flagged_wrong), Err(ModelError::ScratchMismatch));

        let mixed = Operation::move_to(0, Position::new(scratch, 0), 1, Position::main(0));
        assert_eq!(doc.validate_operation(&mixed), Err(ModelError::ScratchMismatch));
    }

    #[test]
    fn test_detached_root_rejects_operations() {
        let mut doc = Document::new();
        let side = doc.create_root("side");
        doc.detach_root(side).unwrap();
        assert!(!doc.is_addressable(side));
        let err = doc
            .apply_operation(&Operation::insert(0, Position::new(side, 0), Item::from_text("x")))
            .unwrap_err();
        assert_eq!(err, ModelError::DetachedRoot { root: side });
        assert!(doc.detach_root(RootId::GRAVEYARD).is_err());
    }

    #[test]
    fn test_read_only_root_is_not_editable() {
        let mut doc = Document::new();
        doc.set_root_read_only(RootId::MAIN, true).unwrap();
        assert!(doc.is_addressable(RootId::MAIN));
        assert!(!doc.is_editable(RootId::MAIN));
        assert!(doc.is_content_root(RootId::MAIN));
        assert!(!doc.is_content_root(RootId::GRAVEYARD));
    }
}
