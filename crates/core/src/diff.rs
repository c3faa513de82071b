#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// What a single change does to the base text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Delete,
    Replace,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Delete => "delete",
            ChangeKind::Replace => "replace",
        }
    }
}

/// One contiguous change between two snapshots, addressed by half-open,
/// zero-based line ranges over the respective line-split sequences.
/// `old_start == old_end` denotes a pure insertion at that position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOp {
    pub kind: ChangeKind,
    pub old_start: usize,
    pub old_end: usize,
    pub new_start: usize,
    pub new_end: usize,
    pub old_lines: Vec<String>,
    pub new_lines: Vec<String>,
}

/// Line-split used throughout the diff pipeline: empty text yields zero
/// lines, and a trailing newline does not produce a phantom empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

/// Compute the ordered, non-equal opcodes aligning `old` to `new` using a
/// longest-common-subsequence alignment over lines. Equal runs are elided.
/// Overlap detection downstream is boundary-sensitive, so there is no
/// heuristic smoothing here.
pub fn extract_changes(old: &str, new: &str) -> Vec<ChangeOp> {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let n = old_lines.len();
    let m = new_lines.len();

    // dp[i][j] = LCS length of old[i..] vs new[j..].
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if old_lines[i] == new_lines[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut changes = Vec::new();
    let mut i = 0;
    let mut j = 0;
    // Walk the alignment; every maximal non-equal run becomes one opcode.
    while i < n || j < m {
        if i < n && j < m && old_lines[i] == new_lines[j] {
            i += 1;
            j += 1;
            continue;
        }

        let old_start = i;
        let new_start = j;
        while i < n || j < m {
            if i < n && j < m && old_lines[i] == new_lines[j] {
                break;
            }
            if j == m || (i < n && dp[i + 1][j] >= dp[i][j + 1]) {
                i += 1;
            } else {
                j += 1;
            }
        }

        let kind = if old_start == i {
            ChangeKind::Insert
        } else if new_start == j {
            ChangeKind::Delete
        } else {
            ChangeKind::Replace
        };
        changes.push(ChangeOp {
            kind,
            old_start,
            old_end: i,
            new_start,
            new_end: j,
            old_lines: old_lines[old_start..i].iter().map(|s| s.to_string()).collect(),
            new_lines: new_lines[new_start..j].iter().map(|s| s.to_string()).collect(),
        });
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_snapshots_produce_no_changes() {
        assert!(extract_changes("a\nb\nc", "a\nb\nc").is_empty());
        assert!(extract_changes("", "").is_empty());
    }

    #[test]
    fn single_line_replace() {
        let changes = extract_changes("L1\nL2\nL3", "A1\nL2\nL3");
        assert_eq!(changes.len(), 1);
        let op = &changes[0];
        assert_eq!(op.kind, ChangeKind::Replace);
        assert_eq!((op.old_start, op.old_end), (0, 1));
        assert_eq!(op.new_lines, vec!["A1".to_string()]);
        assert_eq!(op.old_lines, vec!["L1".to_string()]);
    }

    #[test]
    fn insertion_is_zero_width_on_the_old_side() {
        let changes = extract_changes("a\nc", "a\nb\nc");
        assert_eq!(changes.len(), 1);
        let op = &changes[0];
        assert_eq!(op.kind, ChangeKind::Insert);
        assert_eq!((op.old_start, op.old_end), (1, 1));
        assert_eq!(op.new_lines, vec!["b".to_string()]);
    }

    #[test]
    fn deletion_has_empty_new_lines() {
        let changes = extract_changes("a\nb\nc", "a\nc");
        assert_eq!(changes.len(), 1);
        let op = &changes[0];
        assert_eq!(op.kind, ChangeKind::Delete);
        assert_eq!((op.old_start, op.old_end), (1, 2));
        assert!(op.new_lines.is_empty());
    }

    #[test]
    fn empty_base_is_a_single_insert_at_zero() {
        let changes = extract_changes("", "alpha");
        assert_eq!(changes.len(), 1);
        let op = &changes[0];
        assert_eq!(op.kind, ChangeKind::Insert);
        assert_eq!((op.old_start, op.old_end), (0, 0));
    }

    #[test]
    fn disjoint_edits_yield_separate_opcodes() {
        let changes = extract_changes("a\nb\nc\nd\ne", "A\nb\nc\nd\nE");
        assert_eq!(changes.len(), 2);
        assert_eq!((changes[0].old_start, changes[0].old_end), (0, 1));
        assert_eq!((changes[1].old_start, changes[1].old_end), (4, 5));
    }

    #[test]
    fn equal_runs_between_changes_are_elided() {
        let changes = extract_changes("a\nb\nc", "x\nb\ny\nz");
        // "b" survives as the anchor; everything else changes around it.
        assert!(changes.iter().all(|op| !op.old_lines.contains(&"b".to_string())));
    }
}
