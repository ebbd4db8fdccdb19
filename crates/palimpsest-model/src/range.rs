#![forbid(unsafe_code)]

//! Flat ranges of items inside one root.
//!
//! Range transformation mirrors position transformation, but a range may be
//! split into several pieces when a change lands inside it (`spread`) or when
//! only part of it is moved away.
//!
//! # Invariants
//!
//! 1. `start.root == end.root`
//! 2. `start.offset <= end.offset`
//! 3. Every transformation result is non-empty for a non-empty input except
//!    when all of the range content was moved and the pieces collapse.

use std::fmt;

use smallvec::{SmallVec, smallvec};

use crate::operation::{Operation, OperationKind};
use crate::position::{Position, RootId, Stickiness};

/// Transformation results. Most changes produce one or two pieces.
pub type RangePieces = SmallVec<[Range; 2]>;

/// Half-open range `[start, end)` inside a single root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end.offset)
    }
}

impl Range {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        debug_assert_eq!(start.root, end.root, "range must stay inside one root");
        debug_assert!(start.offset <= end.offset, "range start after end");
        Self { start, end }
    }

    #[must_use]
    pub fn collapsed(at: Position) -> Self {
        Self { start: at, end: at }
    }

    #[must_use]
    pub fn from_position_and_shift(start: Position, how_many: usize) -> Self {
        Self::new(start, start.shifted_by(how_many))
    }

    /// Range in [`RootId::MAIN`].
    #[must_use]
    pub fn main(start: usize, end: usize) -> Self {
        Self::new(Position::main(start), Position::main(end))
    }

    #[must_use]
    pub fn root(&self) -> RootId {
        self.start.root
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end.offset - self.start.offset
    }

    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }

    /// Whether `position` lies strictly between the range boundaries.
    #[must_use]
    pub fn contains_position(&self, position: Position) -> bool {
        position.is_after(&self.start) && position.is_before(&self.end)
    }

    /// Whether `other` is fully covered. With `loose`, shared boundaries count.
    #[must_use]
    pub fn contains_range(&self, other: &Range, loose: bool) -> bool {
        if other.root() != self.root() {
            return false;
        }
        if loose {
            self.start.offset <= other.start.offset && other.end.offset <= self.end.offset
        } else {
            self.start.offset < other.start.offset && other.end.offset < self.end.offset
        }
    }

    #[must_use]
    pub fn is_intersecting(&self, other: &Range) -> bool {
        self.root() == other.root()
            && self.start.offset < other.end.offset
            && self.end.offset > other.start.offset
    }

    #[must_use]
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if !self.is_intersecting(other) {
            return None;
        }
        Some(Range::new(
            self.start.max(other.start),
            self.end.min(other.end),
        ))
    }

    /// Parts of `self` not covered by `other`, in document order.
    #[must_use]
    pub fn difference(&self, other: &Range) -> RangePieces {
        if !self.is_intersecting(other) {
            return smallvec![*self];
        }
        let mut pieces = RangePieces::new();
        if self.contains_position(other.start) {
            pieces.push(Range::new(self.start, other.start));
        }
        if self.contains_position(other.end) {
            pieces.push(Range::new(other.end, self.end));
        }
        pieces
    }

    /// Range after `how_many` items were inserted at `at`.
    ///
    /// With `spread`, an insertion strictly inside the range splits it so the
    /// inserted content is not covered.
    #[must_use]
    pub fn transformed_by_insertion(
        &self,
        at: Position,
        how_many: usize,
        spread: bool,
    ) -> RangePieces {
        if spread && self.contains_position(at) {
            return smallvec![
                Range::new(self.start, at),
                Range::new(
                    at.shifted_by(how_many),
                    self.end
                        .transformed_by_insertion(at, how_many, Stickiness::ToNone)
                ),
            ];
        }
        let (start_stick, end_stick) = self.boundary_stickiness();
        smallvec![Range::new(
            self.start.transformed_by_insertion(at, how_many, start_stick),
            self.end.transformed_by_insertion(at, how_many, end_stick),
        )]
    }

    /// Range after `[source, source + how_many)` was moved to `target`.
    ///
    /// The part of the range that was moved follows the content; the rest
    /// stays. Pieces are returned as `[difference..., common]` with the common
    /// part placed between the difference pieces when there are two.
    #[must_use]
    pub fn transformed_by_move(
        &self,
        source: Position,
        how_many: usize,
        target: Position,
        spread: bool,
    ) -> RangePieces {
        if self.is_collapsed() {
            let moved = self
                .start
                .transformed_by_move(source, how_many, target, Stickiness::ToNone);
            return smallvec![Range::collapsed(moved)];
        }

        let moved = Range::from_position_and_shift(source, how_many);
        let Some(insert_at) = target.transformed_by_deletion(source, how_many) else {
            return smallvec![*self];
        };

        if self.contains_position(target)
            && !spread
            && (moved.contains_position(self.start) || moved.contains_position(self.end))
        {
            let (start_stick, end_stick) = self.boundary_stickiness();
            let start = self.start.transformed_by_move(source, how_many, target, start_stick);
            let end = self.end.transformed_by_move(source, how_many, target, end_stick);
            return smallvec![Range::new(start, end)];
        }

        let difference_set = self.difference(&moved);
        let common = self.intersection(&moved);

        let difference = match difference_set.as_slice() {
            [single] => deleted(single, source, how_many),
            [_, _] => self
                .end
                .transformed_by_deletion(source, how_many)
                .map(|end| Range::new(self.start, end)),
            _ => None,
        };

        let mut result = match difference {
            Some(range) => {
                range.transformed_by_insertion(insert_at, how_many, common.is_some() || spread)
            }
            None => RangePieces::new(),
        };

        if let Some(common) = common {
            let transformed = Range::new(
                common.start.combined(moved.start, insert_at),
                common.end.combined(moved.start, insert_at),
            );
            if result.len() == 2 {
                result.insert(1, transformed);
            } else {
                result.push(transformed);
            }
        }
        result
    }

    /// Range pieces after `operation` was applied.
    #[must_use]
    pub fn transformed_by_operation(&self, operation: &Operation, spread: bool) -> RangePieces {
        match &operation.kind {
            OperationKind::Insert(insert) => {
                self.transformed_by_insertion(insert.position, insert.how_many(), spread)
            }
            OperationKind::Move(mv) | OperationKind::Remove(mv) => {
                self.transformed_by_move(mv.source, mv.how_many, mv.target, spread)
            }
            OperationKind::Attribute(_) | OperationKind::Marker(_) | OperationKind::NoOp => {
                smallvec![*self]
            }
        }
    }

    /// Range pieces after every operation in `operations` was applied in order.
    #[must_use]
    pub fn transformed_by_operations<'a>(
        &self,
        operations: impl IntoIterator<Item = &'a Operation>,
    ) -> Vec<Range> {
        let mut ranges = vec![*self];
        for operation in operations {
            ranges = ranges
                .iter()
                .flat_map(|range| range.transformed_by_operation(operation, false))
                .collect();
        }
        ranges
    }

    /// Smallest range spanning touching pieces, starting from the first piece
    /// in document order. Pieces in other roots or separated by a gap are ignored.
    #[must_use]
    pub fn joined(pieces: &[Range]) -> Option<Range> {
        let mut sorted: SmallVec<[Range; 4]> = pieces.iter().copied().collect();
        sorted.sort();
        let mut iter = sorted.into_iter();
        let mut joined = iter.next()?;
        for piece in iter {
            if piece.root() == joined.root() && piece.start.offset <= joined.end.offset {
                joined.end = joined.end.max(piece.end);
            } else {
                break;
            }
        }
        Some(joined)
    }

    fn boundary_stickiness(&self) -> (Stickiness, Stickiness) {
        if self.is_collapsed() {
            (Stickiness::ToNone, Stickiness::ToNone)
        } else {
            (Stickiness::ToNext, Stickiness::ToPrevious)
        }
    }
}

fn deleted(range: &Range, source: Position, how_many: usize) -> Option<Range> {
    let start = range.start.transformed_by_deletion(source, how_many)?;
    let end = range.end.transformed_by_deletion(source, how_many)?;
    Some(Range::new(start, end))
}

/// Sorts ranges into document order and merges overlapping or touching ones.
#[must_use]
pub fn normalize_ranges(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.sort();
    let mut normalized: Vec<Range> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match normalized.last_mut() {
            Some(last) if last.root() == range.root() && range.start.offset <= last.end.offset => {
                last.end = last.end.max(range.end);
            }
            _ => normalized.push(range),
        }
    }
    normalized
}

// ============================================================================
// Tests
// ============================================================================
