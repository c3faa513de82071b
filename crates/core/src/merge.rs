#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::diff::{ChangeKind, ChangeOp, extract_changes, split_lines};
use crate::overlap::OverlapRegion;

/// How two divergent edits of a common base relate to each other. "No
/// conflict" has no variant on purpose: an analysis is only ever built once
/// a version mismatch exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Different parts edited, or both sides made the identical edit.
    Compatible,
    /// Same area touched, but the texts suggest compatible intent.
    SemanticOverlap,
    /// Incompatible changes; an agent or human must decide.
    TrueConflict,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictType::Compatible => "compatible",
            ConflictType::SemanticOverlap => "semantic_overlap",
            ConflictType::TrueConflict => "true_conflict",
        }
    }
}

/// Classify a conflict and attempt an automatic merge.
///
/// Returns the classification, the merged content when one could be computed,
/// and a confidence score. The cascade is fixed policy: the tests depend on
/// the exact classification each branch produces, so resist the temptation to
/// make any step smarter.
pub fn classify_and_merge(
    base: &str,
    yours: &str,
    theirs: &str,
    overlaps: &[OverlapRegion],
) -> (ConflictType, Option<String>, f64) {
    // Disjoint change sets merge deterministically.
    if overlaps.is_empty() {
        let merged = three_way_merge(base, yours, theirs);
        return (ConflictType::Compatible, Some(merged), 0.95);
    }

    // Both sides happened to make the same edit.
    let identical = overlaps
        .iter()
        .all(|o| o.yours.trim() == o.theirs.trim());
    if identical {
        return (ConflictType::Compatible, Some(theirs.to_string()), 1.0);
    }

    // One side's text literally contains the other's: keep the superset.
    if theirs.trim().contains(yours.trim()) {
        return (ConflictType::SemanticOverlap, Some(theirs.to_string()), 0.8);
    }
    if yours.trim().contains(theirs.trim()) {
        return (ConflictType::SemanticOverlap, Some(yours.to_string()), 0.8);
    }

    // Narrow heuristic: both sides only inserted into the overlap region, so
    // keep theirs and append whatever yours added beyond the base.
    let all_inserts = overlaps.iter().all(|o| {
        o.your_kind == ChangeKind::Insert && o.their_kind == ChangeKind::Insert
    });
    if all_inserts {
        let residual = yours.replace(base, "");
        let merged = format!("{theirs}\n{}", residual.trim());
        return (ConflictType::SemanticOverlap, Some(merged), 0.6);
    }

    (ConflictType::TrueConflict, None, 0.0)
}

/// Deterministic three-way merge of two edits against a common base.
///
/// All non-equal opcodes from base->yours and base->theirs are applied to a
/// mutable copy of the base lines, highest start line first so earlier
/// indices stay valid as splices change the array length. An op whose range
/// intersects an already-applied range is skipped; when the caller has
/// verified there are no cross-side overlaps no op is ever skipped, but the
/// guard keeps the function safe under cascaded reuse where the protected
/// range grows with each merge.
pub fn three_way_merge(base: &str, yours: &str, theirs: &str) -> String {
    let mut result: Vec<String> = split_lines(base).iter().map(|s| s.to_string()).collect();

    let mut ops: Vec<ChangeOp> = extract_changes(base, yours);
    ops.extend(extract_changes(base, theirs));
    // Wider ops must land before a zero-width insert at the same start
    // line, or the later splice overwrites the freshly inserted lines.
    // Stable sort: on fully tied ranges, "yours" ops keep precedence.
    ops.sort_by(|a, b| (b.old_start, b.old_end).cmp(&(a.old_start, a.old_end)));

    let mut applied: Vec<(usize, usize)> = Vec::new();
    for op in ops {
        let blocked = applied
            .iter()
            .any(|&(start, end)| op.old_start < end && start < op.old_end);
        if blocked {
            continue;
        }
        result.splice(op.old_start..op.old_end, op.new_lines.iter().cloned());
        applied.push((op.old_start, op.old_end));
    }

    result.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap::find_overlaps;

    fn analyze(base: &str, yours: &str, theirs: &str) -> (ConflictType, Option<String>, f64) {
        let your_changes = extract_changes(base, yours);
        let their_changes = extract_changes(base, theirs);
        let overlaps = find_overlaps(&your_changes, &their_changes, base);
        classify_and_merge(base, yours, theirs, &overlaps)
    }

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let (kind, merged, confidence) = analyze("L1\nL2\nL3", "A1\nL2\nL3", "L1\nL2\nB3");
        assert_eq!(kind, ConflictType::Compatible);
        assert_eq!(merged.as_deref(), Some("A1\nL2\nB3"));
        assert!(confidence > 0.9);
    }

    #[test]
    fn identical_edits_are_compatible() {
        let (kind, merged, confidence) = analyze("L1\nL2", "X1\nL2", "X1\nL2");
        assert_eq!(kind, ConflictType::Compatible);
        assert_eq!(merged.as_deref(), Some("X1\nL2"));
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn superset_side_wins_as_semantic_overlap() {
        let (kind, merged, _) = analyze("intro", "intro revised", "intro revised with details");
        assert_eq!(kind, ConflictType::SemanticOverlap);
        assert_eq!(merged.as_deref(), Some("intro revised with details"));
    }

    #[test]
    fn same_line_rewrites_are_a_true_conflict() {
        let (kind, merged, confidence) = analyze("L1\nL2", "alpha\nL2", "omega\nL2");
        assert_eq!(kind, ConflictType::TrueConflict);
        assert!(merged.is_none());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn no_partial_application_of_a_conflicting_edit() {
        // One of the two edited regions collides; the whole edit must be
        // rejected, not cherry-picked down to its safe region.
        let base = "a\nb\nc\nd";
        let yours = "A\nb\nc\nD1";
        let theirs = "a\nb\nc\nD2";
        let (kind, merged, _) = analyze(base, yours, theirs);
        assert_eq!(kind, ConflictType::TrueConflict);
        assert!(merged.is_none());
    }

    #[test]
    fn empty_side_diff_leaves_the_other_side_intact() {
        // An agent re-submitting the base unchanged has an empty change set,
        // so the merge is a no-op for that side.
        let (kind, merged, _) = analyze("", "", "alpha");
        assert_eq!(kind, ConflictType::Compatible);
        assert_eq!(merged.as_deref(), Some("alpha"));
    }

    #[test]
    fn three_way_merge_applies_from_the_bottom_up() {
        let base = "1\n2\n3\n4\n5";
        let yours = "1\nY\n3\n4\n5";
        let theirs = "1\n2\n3\nT\n5";
        assert_eq!(three_way_merge(base, yours, theirs), "1\nY\n3\nT\n5");
    }

    #[test]
    fn insert_before_a_replaced_line_keeps_both_edits() {
        // The insert at (2,2) and the replace at (2,3) do not overlap, so
        // this is the compatible path; the replace must land first or it
        // would splice over the inserted line.
        let base = "a\nb\nc";
        let yours = "a\nb\nX\nc";
        let theirs = "a\nb\nC";
        assert_eq!(three_way_merge(base, yours, theirs), "a\nb\nX\nC");

        let (kind, merged, _) = analyze(base, yours, theirs);
        assert_eq!(kind, ConflictType::Compatible);
        assert_eq!(merged.as_deref(), Some("a\nb\nX\nC"));
    }

    #[test]
    fn skip_guard_drops_ops_that_hit_an_applied_range() {
        // Direct reuse with overlapping sides: the later op on the same
        // range must be skipped rather than double-applied.
        let base = "x\ny";
        let merged = three_way_merge(base, "a\ny", "b\ny");
        // "yours" sorts first on the tied start line, "theirs" is skipped.
        assert_eq!(merged, "a\ny");
    }

    #[test]
    fn insert_heuristic_appends_residual_lines() {
        let base = "shared";
        let yours = "shared\nyours-extra";
        let theirs = "shared\ntheirs-extra";
        let (kind, merged, confidence) = analyze(base, yours, theirs);
        assert_eq!(kind, ConflictType::SemanticOverlap);
        assert_eq!(merged.as_deref(), Some("shared\ntheirs-extra\nyours-extra"));
        assert!(confidence < 0.8);
    }
}
