#![forbid(unsafe_code)]

use rusqlite::{OptionalExtension, Transaction, params};

use trellis_core::{AgentId, ConflictAnalysis, ConflictContext, EditOutcome};

use crate::error::StoreError;
use crate::requests::{EditNodeRequest, EditStrategy};
use crate::types::{DryRunReport, NodeRecord};

use super::{
    SqliteStore, apply_edit_tx, delete_conflict_tx, delete_pending_read_tx, require_node,
};

impl SqliteStore {
    /// Submit an edit under optimistic concurrency. The agent's pending
    /// read is consumed whether or not the edit applies; a conflicting
    /// edit mutates nothing and returns the analysis for resolution.
    pub fn edit_node(&mut self, request: EditNodeRequest) -> Result<EditOutcome, StoreError> {
        let tx = self.conn.transaction()?;
        let node = require_node(&tx, &request.node_id)?;

        let pending = pending_read_tx(&tx, &request.node_id, &request.agent)?;
        delete_pending_read_tx(&tx, &request.node_id, &request.agent)?;

        // Without a declared read the agent is treated as writing against
        // the live version.
        let (base_version, base_content) = match pending {
            Some((version, content)) => (version, content),
            None => (node.version, node.content.clone()),
        };

        if base_version == node.version {
            let outcome =
                apply_edit_tx(&tx, &node, &request.content, &request.agent, request.summary.as_deref())?;
            delete_conflict_tx(&tx, &request.node_id, &request.agent)?;
            tx.commit()?;
            return Ok(outcome);
        }

        let analysis = analyze_divergence(&node, base_version, &base_content, &request);

        match request.strategy {
            EditStrategy::Force => {
                let summary = match request.summary.as_deref() {
                    Some(s) => format!("{s} [forced, overwrote v{}]", node.version),
                    None => format!("[forced, overwrote v{}]", node.version),
                };
                let outcome =
                    apply_edit_tx(&tx, &node, &request.content, &request.agent, Some(&summary))?;
                delete_conflict_tx(&tx, &request.node_id, &request.agent)?;
                tx.commit()?;
                Ok(outcome)
            }
            EditStrategy::Auto if analysis.auto_merged_content.is_some() => {
                let merged = analysis
                    .auto_merged_content
                    .clone()
                    .ok_or(StoreError::InvalidResolution("no auto-merge available"))?;
                let summary = match request.summary.as_deref() {
                    Some(s) => format!("auto-merged: {s}"),
                    None => "auto-merged".to_string(),
                };
                let outcome = apply_edit_tx(&tx, &node, &merged, &request.agent, Some(&summary))?;
                delete_conflict_tx(&tx, &request.node_id, &request.agent)?;
                tx.commit()?;
                Ok(outcome)
            }
            EditStrategy::Prompt | EditStrategy::Auto => {
                // Commit so the consumed pending read persists; the node
                // row itself is untouched.
                tx.commit()?;
                tracing::debug!(
                    node = %request.node_id,
                    agent = %request.agent,
                    kind = analysis.conflict_type.as_str(),
                    "edit conflicted"
                );
                Ok(EditOutcome::Conflict(Box::new(analysis)))
            }
        }
    }

    /// Restore a historical snapshot as a new version. History only moves
    /// forward; the rollback itself is an edit.
    pub fn rollback(
        &mut self,
        node_id: &str,
        version: i64,
        agent: &AgentId,
    ) -> Result<EditOutcome, StoreError> {
        let tx = self.conn.transaction()?;
        let node = require_node(&tx, node_id)?;

        let snapshot = tx
            .query_row(
                "SELECT content FROM history WHERE node_id=?1 AND version=?2",
                params![node_id, version],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or(StoreError::UnknownVersion { version })?;

        let summary = format!("rolled back to v{version}");
        let outcome = apply_edit_tx(&tx, &node, &snapshot, agent, Some(&summary))?;
        delete_pending_read_tx(&tx, node_id, agent)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Simulate an edit without mutating anything: reports whether the
    /// submit would apply directly or run conflict analysis.
    pub fn dry_run_edit(
        &self,
        node_id: &str,
        content: &str,
        agent: &AgentId,
    ) -> Result<DryRunReport, StoreError> {
        let node = require_node(&self.conn, node_id)?;

        let pending = self
            .conn
            .query_row(
                "SELECT read_version FROM pending_reads WHERE node_id=?1 AND agent_id=?2",
                params![node_id, agent.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        let report = match pending {
            Some(read_version) if read_version != node.version => DryRunReport::WouldConflict {
                your_base_version: read_version,
                current_version: node.version,
                versions_behind: node.version - read_version,
            },
            Some(_) => DryRunReport::WouldSucceed {
                reason: "base matches current version",
                current_version: node.version,
                new_version: node.version + 1,
                content_changed: content != node.content,
            },
            None => DryRunReport::WouldSucceed {
                reason: "no pending read; current version would be the base",
                current_version: node.version,
                new_version: node.version + 1,
                content_changed: content != node.content,
            },
        };
        Ok(report)
    }
}

fn pending_read_tx(
    tx: &Transaction<'_>,
    node_id: &str,
    agent: &AgentId,
) -> Result<Option<(i64, String)>, StoreError> {
    Ok(tx
        .query_row(
            "SELECT read_version, base_content FROM pending_reads WHERE node_id=?1 AND agent_id=?2",
            params![node_id, agent.as_str()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?)
}

/// Build the conflict analysis for an edit whose base is behind the node.
/// Other editors and their stated intents come from the history entries
/// the submitting agent has not seen.
fn analyze_divergence(
    node: &NodeRecord,
    base_version: i64,
    base_content: &str,
    request: &EditNodeRequest,
) -> ConflictAnalysis {
    let mut other_agents: Vec<String> = Vec::new();
    let mut their_summaries: Vec<String> = Vec::new();
    for entry in &node.edit_history {
        if entry.version <= base_version || entry.agent == request.agent.as_str() {
            continue;
        }
        if !other_agents.contains(&entry.agent) {
            other_agents.push(entry.agent.clone());
        }
        if let Some(summary) = &entry.summary {
            their_summaries.push(format!("{}: {}", entry.agent, summary));
        }
    }

    let ctx = ConflictContext {
        node_id: node.id.clone(),
        node_title: node.title.clone(),
        your_base_version: base_version,
        current_version: node.version,
        your_agent_id: request.agent.as_str().to_string(),
        other_agents,
        their_summaries,
    };

    ConflictAnalysis::analyze(ctx, base_content, &request.content, &node.content)
}
