#![forbid(unsafe_code)]

//! Positions inside a multi-root document.
//!
//! A [`Position`] addresses the gap before the item at `offset` in one root.
//! Positions are ordered by `(root, offset)`, which is document order within a
//! root and a stable (if arbitrary) order across roots.
//!
//! The `transformed_by_*` family answers "where is this gap after some change
//! was applied?". They are pure functions of the change payload and never look
//! at the document itself.
//!
//! ```text
//! items:     A   B   C   D
//! offsets: 0   1   2   3   4
//!
//! insert "X" at 1 (ToNext / ToNone stickiness):
//!   position 1 -> 2, position 0 -> 0
//! delete [1, 3):
//!   position 2 -> None (strictly inside), position 3 -> 1
//! ```

use std::fmt;

/// Document version counter. Every applied document operation advances it by one.
pub type Version = u64;

/// Identifier of a document root.
///
/// Root `0` is always the graveyard: the discard area removed content is moved
/// into. Root `1` is the default content root created with every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RootId(pub u32);

impl RootId {
    /// The discard area.
    pub const GRAVEYARD: Self = Self(0);
    /// The default content root.
    pub const MAIN: Self = Self(1);

    #[must_use]
    pub const fn is_graveyard(self) -> bool {
        self.0 == Self::GRAVEYARD.0
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root#{}", self.0)
    }
}

/// How a position reacts to content inserted exactly at its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stickiness {
    /// Not bound to either neighbour; shifted past inserted content.
    #[default]
    ToNone,
    /// Bound to the following item; shifted past inserted content and carried
    /// along when the following item is moved.
    ToNext,
    /// Bound to the preceding item; stays before inserted content and is
    /// carried along when the preceding item is moved.
    ToPrevious,
}

/// A gap between two items of a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub root: RootId,
    pub offset: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.root, self.offset)
    }
}

impl Position {
    #[must_use]
    pub const fn new(root: RootId, offset: usize) -> Self {
        Self { root, offset }
    }

    /// Shorthand for a position in [`RootId::MAIN`].
    #[must_use]
    pub const fn main(offset: usize) -> Self {
        Self::new(RootId::MAIN, offset)
    }

    /// Shorthand for a position in the graveyard.
    #[must_use]
    pub const fn graveyard(offset: usize) -> Self {
        Self::new(RootId::GRAVEYARD, offset)
    }

    #[must_use]
    pub const fn shifted_by(self, delta: usize) -> Self {
        Self::new(self.root, self.offset + delta)
    }

    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self.root == other.root && self.offset < other.offset
    }

    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self.root == other.root && self.offset > other.offset
    }

    /// Position after `how_many` items were inserted at `at`.
    #[must_use]
    pub fn transformed_by_insertion(
        self,
        at: Position,
        how_many: usize,
        stickiness: Stickiness,
    ) -> Self {
        if self.root != at.root {
            return self;
        }
        let shifts = at.offset < self.offset
            || (at.offset == self.offset && stickiness != Stickiness::ToPrevious);
        if shifts { self.shifted_by(how_many) } else { self }
    }

    /// Position after `[source, source + how_many)` was taken out of its root.
    ///
    /// Returns `None` when the position was strictly inside the deleted range.
    #[must_use]
    pub fn transformed_by_deletion(self, source: Position, how_many: usize) -> Option<Self> {
        if self.root != source.root || source.offset >= self.offset {
            return Some(self);
        }
        if source.offset + how_many > self.offset {
            return None;
        }
        Some(Self::new(self.root, self.offset - how_many))
    }

    /// Re-bases a position that lies inside a moved range onto its new location.
    ///
    /// `source` is the start of the moved range before the move and `target` the
    /// start of the moved range after the move.
    #[must_use]
    pub fn combined(self, source: Position, target: Position) -> Self {
        debug_assert_eq!(self.root, source.root);
        Self::new(target.root, target.offset + (self.offset - source.offset))
    }

    /// Position after `[source, source + how_many)` was moved to `target`.
    ///
    /// `target` is expressed in the coordinates before the move. A position
    /// strictly inside the moved range travels with the content; stickiness
    /// decides the fate of positions on the moved range boundaries.
    #[must_use]
    pub fn transformed_by_move(
        self,
        source: Position,
        how_many: usize,
        target: Position,
        stickiness: Stickiness,
    ) -> Self {
        let Some(insert_at) = target.transformed_by_deletion(source, how_many) else {
            return self;
        };
        if source == insert_at {
            return self;
        }
        let transformed = self.transformed_by_deletion(source, how_many);
        let moved = transformed.is_none()
            || (self == source && stickiness == Stickiness::ToNext)
            || (self == source.shifted_by(how_many) && stickiness == Stickiness::ToPrevious);
        match transformed {
            Some(position) if !moved => {
                position.transformed_by_insertion(insert_at, how_many, stickiness)
            }
            _ => self.combined(source, insert_at),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
