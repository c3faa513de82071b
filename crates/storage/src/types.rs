#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use trellis_core::ConflictAnalysis;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Section,
    Content,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Section => "section",
            NodeKind::Content => "content",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "root" => Some(NodeKind::Root),
            "section" => Some(NodeKind::Section),
            "content" => Some(NodeKind::Content),
            _ => None,
        }
    }
}

/// One entry of a node's bounded edit-history window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditHistoryEntry {
    pub version: i64,
    pub agent: String,
    pub ts_ms: i64,
    pub summary: Option<String>,
    pub prev_version: Option<i64>,
}

/// A versioned document node. `children` is ordered: insertion order is
/// document order.
#[derive(Clone, Debug)]
pub struct NodeRecord {
    pub id: String,
    pub kind: NodeKind,
    pub title: String,
    pub content: String,
    pub level: i64,
    pub parent_id: Option<String>,
    pub children: Vec<String>,
    pub summary: Option<String>,
    pub version: i64,
    pub last_editor: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub edit_history: Vec<EditHistoryEntry>,
}

/// A conflict persisted for later resolution; survives process restarts.
#[derive(Clone, Debug)]
pub struct StoredConflict {
    pub agent_id: String,
    pub node_id: String,
    pub stored_at_ms: i64,
    pub analysis: ConflictAnalysis,
}

/// One row of `get_node_history`: the bounded window entry, annotated with
/// whether a full snapshot exists for that version.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub version: i64,
    pub agent: String,
    pub ts_ms: i64,
    pub summary: Option<String>,
    pub has_content: bool,
    pub content_preview: Option<String>,
}

/// Read-only simulation of an edit.
#[derive(Clone, Debug)]
pub enum DryRunReport {
    WouldSucceed {
        reason: &'static str,
        current_version: i64,
        new_version: i64,
        content_changed: bool,
    },
    WouldConflict {
        your_base_version: i64,
        current_version: i64,
        versions_behind: i64,
    },
}

#[derive(Clone, Debug)]
pub struct PendingReadStatus {
    pub node_id: String,
    pub read_version: i64,
    pub current_version: i64,
    pub read_at_ms: i64,
    pub stale: bool,
    pub stale_by: i64,
}

#[derive(Clone, Debug)]
pub struct RecentEdit {
    pub node_id: String,
    pub version: i64,
    pub ts_ms: i64,
    pub summary: Option<String>,
}

/// Diagnostic snapshot of one agent's session state. Best-effort: on
/// failure the collected part is returned with `error` set.
#[derive(Clone, Debug)]
pub struct AgentStatus {
    pub agent_id: String,
    pub pending_reads: Vec<PendingReadStatus>,
    pub pending_conflicts: Vec<StoredConflict>,
    pub recent_edits: Vec<RecentEdit>,
    pub nodes_touched: Vec<String>,
    pub error: Option<String>,
}

/// Best-effort database health snapshot.
#[derive(Clone, Debug, Default)]
pub struct DbHealth {
    pub initialized: bool,
    pub node_count: usize,
    pub has_root: bool,
    pub pending_read_count: usize,
    pub pending_conflict_count: usize,
    pub total_versions: i64,
    pub active_agents: Vec<String>,
    pub last_edit_ms: Option<i64>,
    pub storage_dir: String,
    pub error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SearchHit {
    pub node_id: String,
    pub title: String,
    pub version: i64,
    pub match_in_title: bool,
    /// Up to five `(line_number, line)` pairs, 1-based.
    pub matching_lines: Vec<(usize, String)>,
    pub total_matches: usize,
}

#[derive(Clone, Debug)]
pub struct AgentSummary {
    pub agent_id: String,
    pub edit_count: usize,
    pub nodes_edited: Vec<String>,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
}
