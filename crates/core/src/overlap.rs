#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::diff::{ChangeKind, ChangeOp, split_lines};

/// A region of the base text that two change sets both touch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapRegion {
    pub start: usize,
    pub end: usize,
    pub original: String,
    pub yours: String,
    pub theirs: String,
    pub your_kind: ChangeKind,
    pub their_kind: ChangeKind,
}

/// Half-open interval overlap, with one deliberate extension: two zero-width
/// ranges at the same position count as overlapping. Two agents inserting at
/// the identical point is ambiguous (which insertion goes first?), so it is
/// reported as a conflict rather than auto-ordered.
pub fn ranges_overlap(a: (usize, usize), b: (usize, usize)) -> bool {
    if a.0 < b.1 && b.0 < a.1 {
        return true;
    }
    a.0 == a.1 && b.0 == b.1 && a.0 == b.0
}

/// For every pair of changes (yours x theirs), both derived from the same
/// base, emit a region covering the union of their old ranges.
pub fn find_overlaps(
    your_changes: &[ChangeOp],
    their_changes: &[ChangeOp],
    base: &str,
) -> Vec<OverlapRegion> {
    let base_lines = split_lines(base);
    let mut overlaps = Vec::new();

    for yc in your_changes {
        for tc in their_changes {
            if !ranges_overlap((yc.old_start, yc.old_end), (tc.old_start, tc.old_end)) {
                continue;
            }
            let start = yc.old_start.min(tc.old_start);
            let end = yc.old_end.max(tc.old_end);
            let original = if start < base_lines.len() {
                base_lines[start..end.min(base_lines.len())].join("\n")
            } else {
                String::new()
            };
            overlaps.push(OverlapRegion {
                start,
                end,
                original,
                yours: yc.new_lines.join("\n"),
                theirs: tc.new_lines.join("\n"),
                your_kind: yc.kind,
                their_kind: tc.kind,
            });
        }
    }

    overlaps
}
