#![forbid(unsafe_code)]

//! User selection: a set of ranges plus a direction.

use crate::position::Position;
use crate::range::{Range, normalize_ranges};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Selection {
    ranges: Vec<Range>,
    backward: bool,
}

impl Default for Selection {
    fn default() -> Self {
        Self::caret(Position::main(0))
    }
}

impl Selection {
    /// Ranges are normalized into document order; overlapping ranges merge.
    #[must_use]
    pub fn new(ranges: Vec<Range>, backward: bool) -> Self {
        Self {
            ranges: normalize_ranges(ranges),
            backward,
        }
    }

    #[must_use]
    pub fn caret(at: Position) -> Self {
        Self::new(vec![Range::collapsed(at)], false)
    }

    #[must_use]
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    #[must_use]
    pub fn is_backward(&self) -> bool {
        self.backward
    }

    #[must_use]
    pub fn first_range(&self) -> Option<Range> {
        self.ranges.first().copied()
    }

    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_collapsed()
    }

    /// Anchor and focus follow the direction of the last range.
    #[must_use]
    pub fn focus(&self) -> Option<Position> {
        self.ranges
            .last()
            .map(|range| if self.backward { range.start } else { range.end })
    }

    pub(crate) fn ranges_mut(&mut self) -> &mut Vec<Range> {
        &mut self.ranges
    }
}
