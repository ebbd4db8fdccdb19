#![forbid(unsafe_code)]

//! Selection restoration after undo and redo.

use palimpsest_model::{Document, Operation, Range, Selection, normalize_ranges};

/// Maps `ranges` through `operations` and builds the selection to show.
///
/// Each captured range may split into several pieces. Pieces outside content
/// roots are dropped, as is any piece strictly contained in another surviving
/// piece. Each captured range then contributes at most its first normalized
/// piece. Returns `None` when nothing survives, in which case the current
/// selection should be kept.
#[must_use]
pub fn restore_selection(
    ranges: &[Range],
    backward: bool,
    operations: &[Operation],
    document: &Document,
) -> Option<Selection> {
    let mut groups: Vec<Vec<Range>> = ranges
        .iter()
        .map(|range| {
            range
                .transformed_by_operations(operations)
                .into_iter()
                .filter(|piece| document.is_content_root(piece.root()))
                .collect()
        })
        .collect();

    let surviving: Vec<Range> = groups.iter().flatten().copied().collect();
    for group in &mut groups {
        group.retain(|range| {
            !surviving
                .iter()
                .any(|other| other != range && other.contains_range(range, true))
        });
    }

    let restored: Vec<Range> = groups
        .into_iter()
        .filter_map(|group| normalize_ranges(group).first().copied())
        .collect();

    if restored.is_empty() {
        return None;
    }
    Some(Selection::new(restored, backward))
}
