#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::diff::{ChangeOp, extract_changes};
use crate::merge::{ConflictType, classify_and_merge};
use crate::overlap::{OverlapRegion, find_overlaps};

/// Version and authorship context the store knows about a divergent edit.
#[derive(Clone, Debug)]
pub struct ConflictContext {
    pub node_id: String,
    pub node_title: String,
    pub your_base_version: i64,
    pub current_version: i64,
    pub your_agent_id: String,
    pub other_agents: Vec<String>,
    pub their_summaries: Vec<String>,
}

/// Everything a caller needs to decide how to resolve a conflicting edit.
/// Built exclusively by [`ConflictAnalysis::analyze`], which is what keeps
/// `auto_merge_possible` and `auto_merged_content` consistent with each
/// other.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConflictAnalysis {
    pub conflict_type: ConflictType,
    pub node_id: String,
    pub node_title: String,

    pub your_base_version: i64,
    pub current_version: i64,
    pub concurrent_edit_count: i64,

    /// The snapshot the edit was based on.
    pub original_content: String,
    /// What the editing agent tried to write.
    pub your_content: String,
    /// What is stored now.
    pub current_content: String,

    pub your_changes: Vec<ChangeOp>,
    pub their_changes: Vec<ChangeOp>,
    pub overlapping_regions: Vec<OverlapRegion>,

    pub your_agent_id: String,
    pub other_agents: Vec<String>,
    pub their_summaries: Vec<String>,

    pub auto_merge_possible: bool,
    pub auto_merged_content: Option<String>,
    pub auto_merge_confidence: f64,
}

impl ConflictAnalysis {
    /// Run the full pipeline: change extraction for both sides, overlap
    /// detection, classification and (when safe) the automatic merge.
    pub fn analyze(ctx: ConflictContext, base: &str, yours: &str, theirs: &str) -> Self {
        let your_changes = extract_changes(base, yours);
        let their_changes = extract_changes(base, theirs);
        let overlapping_regions = find_overlaps(&your_changes, &their_changes, base);
        let (conflict_type, auto_merged_content, auto_merge_confidence) =
            classify_and_merge(base, yours, theirs, &overlapping_regions);

        Self {
            conflict_type,
            node_id: ctx.node_id,
            node_title: ctx.node_title,
            your_base_version: ctx.your_base_version,
            current_version: ctx.current_version,
            concurrent_edit_count: ctx.current_version - ctx.your_base_version,
            original_content: base.to_string(),
            your_content: yours.to_string(),
            current_content: theirs.to_string(),
            your_changes,
            their_changes,
            overlapping_regions,
            your_agent_id: ctx.your_agent_id,
            other_agents: ctx.other_agents,
            their_summaries: ctx.their_summaries,
            auto_merge_possible: auto_merged_content.is_some(),
            auto_merged_content,
            auto_merge_confidence,
        }
    }

    /// Render the conflict as a structured resolution prompt for the agent
    /// (or human) that has to decide.
    pub fn to_prompt(&self) -> String {
        let mut out = String::new();
        out.push_str("## CONFLICT DETECTED - Resolution required\n\n");
        out.push_str(&format!(
            "- Node: `{}` - \"{}\"\n- Conflict type: {}\n- Your base version: {}\n- Current version: {} ({} edit(s) since you read)\n",
            self.node_id,
            self.node_title,
            self.conflict_type.as_str(),
            self.your_base_version,
            self.current_version,
            self.concurrent_edit_count,
        ));
        if self.other_agents.is_empty() {
            out.push_str("- Other editors: unknown\n");
        } else {
            out.push_str(&format!("- Other editors: {}\n", self.other_agents.join(", ")));
        }

        out.push_str("\n### Their intent\n");
        if self.their_summaries.is_empty() {
            out.push_str("- (no edit summary provided)\n");
        } else {
            for summary in &self.their_summaries {
                out.push_str(&format!("- {summary}\n"));
            }
        }

        out.push_str(&format!(
            "\n### Original content (version {})\n```\n{}\n```\n",
            self.your_base_version, self.original_content
        ));
        out.push_str("\n### Your changes\n");
        out.push_str(&format_diff(&self.your_changes));
        out.push_str(&format!(
            "\nYour new content:\n```\n{}\n```\n",
            self.your_content
        ));
        out.push_str(&format!(
            "\n### Their changes (current version {})\n",
            self.current_version
        ));
        out.push_str(&format_diff(&self.their_changes));
        out.push_str(&format!(
            "\nCurrent content:\n```\n{}\n```\n",
            self.current_content
        ));

        out.push_str("\n### Overlap analysis\n");
        if self.overlapping_regions.is_empty() {
            out.push_str("No direct overlaps detected - changes are in different parts.\n");
        } else {
            for (index, region) in self.overlapping_regions.iter().enumerate() {
                out.push_str(&format!(
                    "Overlap {} (lines {}-{}):\n  original: {}\n  yours:    {}\n  theirs:   {}\n",
                    index + 1,
                    region.start,
                    region.end,
                    truncate(&region.original, 100),
                    truncate(&region.yours, 100),
                    truncate(&region.theirs, 100),
                ));
            }
        }

        out.push_str("\n### Resolution options\n");
        out.push_str("- ACCEPT_YOURS: overwrite with your version (discards their changes)\n");
        out.push_str("- ACCEPT_THEIRS: keep the current version (discards your changes)\n");
        if self.auto_merge_possible {
            out.push_str(&format!(
                "- ACCEPT_AUTO_MERGE: apply the computed merge (confidence {:.0}%)\n",
                self.auto_merge_confidence * 100.0
            ));
        }
        out.push_str("- MANUAL_MERGE <content>: provide your own merged content\n");
        out
    }
}

/// Outcome of an edit or resolution attempt. A conflict is not an error:
/// callers receive the analysis and are expected to resolve it explicitly.
#[derive(Clone, Debug)]
pub enum EditOutcome {
    Applied {
        node_id: String,
        new_version: i64,
        message: String,
    },
    Conflict(Box<ConflictAnalysis>),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }

    pub fn conflict(&self) -> Option<&ConflictAnalysis> {
        match self {
            EditOutcome::Conflict(analysis) => Some(analysis),
            EditOutcome::Applied { .. } => None,
        }
    }
}

fn format_diff(changes: &[ChangeOp]) -> String {
    if changes.is_empty() {
        return "(no changes)\n".to_string();
    }
    let mut out = String::from("```diff\n");
    for op in changes {
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            op.old_start,
            op.old_end - op.old_start,
            op.new_start,
            op.new_end - op.new_start,
        ));
        for line in &op.old_lines {
            out.push_str(&format!("- {line}\n"));
        }
        for line in &op.new_lines {
            out.push_str(&format!("+ {line}\n"));
        }
    }
    out.push_str("```\n");
    out
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max).collect();
        format!("{prefix}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ConflictContext {
        ConflictContext {
            node_id: "h2_1".to_string(),
            node_title: "Auth Flow".to_string(),
            your_base_version: 1,
            current_version: 2,
            your_agent_id: "agent_b".to_string(),
            other_agents: vec!["agent_a".to_string()],
            their_summaries: vec!["agent_a: reworked intro".to_string()],
        }
    }

    #[test]
    fn analyze_keeps_merge_fields_consistent() {
        let analysis = ConflictAnalysis::analyze(context(), "L1\nL2", "A1\nL2", "L1\nB2");
        assert!(analysis.auto_merge_possible);
        assert!(analysis.auto_merged_content.is_some());
        assert_eq!(analysis.concurrent_edit_count, 1);

        let conflicted = ConflictAnalysis::analyze(context(), "L1", "alpha", "omega");
        assert!(!conflicted.auto_merge_possible);
        assert!(conflicted.auto_merged_content.is_none());
        assert_eq!(conflicted.conflict_type, ConflictType::TrueConflict);
    }

    #[test]
    fn analysis_survives_a_serde_round_trip() {
        let analysis = ConflictAnalysis::analyze(context(), "L1\nL2", "A1\nL2", "L1\nB2");
        let json = serde_json::to_string(&analysis).expect("serialize");
        let back: ConflictAnalysis = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.node_id, analysis.node_id);
        assert_eq!(back.conflict_type, analysis.conflict_type);
        assert_eq!(back.auto_merged_content, analysis.auto_merged_content);
    }

    #[test]
    fn prompt_mentions_versions_and_options() {
        let analysis = ConflictAnalysis::analyze(context(), "L1", "alpha", "omega");
        let prompt = analysis.to_prompt();
        assert!(prompt.contains("Your base version: 1"));
        assert!(prompt.contains("Current version: 2"));
        assert!(prompt.contains("ACCEPT_THEIRS"));
        assert!(!prompt.contains("ACCEPT_AUTO_MERGE"));
    }
}
