#![forbid(unsafe_code)]

use rusqlite::{OptionalExtension, Transaction, params};

use trellis_core::{AgentId, ConflictAnalysis, EditOutcome};

use crate::error::StoreError;
use crate::requests::{ResolveRequest, Resolution};
use crate::types::StoredConflict;

use super::{SqliteStore, apply_edit_tx, delete_conflict_tx, delete_pending_read_tx, require_node};

impl SqliteStore {
    /// Apply an explicit resolution for a stored conflict. The stored
    /// analysis must still match the node's live version; anything else
    /// fails with [`StoreError::StaleConflict`] and the agent has to
    /// re-read and retry.
    pub fn resolve_conflict(&mut self, request: ResolveRequest) -> Result<EditOutcome, StoreError> {
        let tx = self.conn.transaction()?;
        let node = require_node(&tx, &request.node_id)?;

        let stored = stored_conflict_tx(&tx, &request.node_id, &request.agent)?;
        if let Some(stored) = &stored {
            if stored.analysis.current_version != node.version {
                return Err(StoreError::StaleConflict {
                    expected: stored.analysis.current_version,
                    actual: node.version,
                });
            }
        }

        let outcome = match request.resolution {
            Resolution::AcceptTheirs => {
                // Keeping the current content is a no-op on the node; only
                // the conflict record goes away.
                delete_conflict_tx(&tx, &request.node_id, &request.agent)?;
                delete_pending_read_tx(&tx, &request.node_id, &request.agent)?;
                EditOutcome::Applied {
                    node_id: node.id.clone(),
                    new_version: node.version,
                    message: "conflict resolved: kept current version".to_string(),
                }
            }
            Resolution::AcceptYours => {
                let stored = stored.ok_or(StoreError::InvalidResolution(
                    "no stored conflict for this agent and node",
                ))?;
                let outcome = apply_edit_tx(
                    &tx,
                    &node,
                    &stored.analysis.your_content,
                    &request.agent,
                    Some("resolved: accepted yours"),
                )?;
                delete_conflict_tx(&tx, &request.node_id, &request.agent)?;
                delete_pending_read_tx(&tx, &request.node_id, &request.agent)?;
                outcome
            }
            Resolution::AcceptAutoMerge => {
                let stored = stored.ok_or(StoreError::InvalidResolution(
                    "no stored conflict for this agent and node",
                ))?;
                let merged = stored
                    .analysis
                    .auto_merged_content
                    .as_deref()
                    .ok_or(StoreError::InvalidResolution("no auto-merge available"))?;
                let outcome = apply_edit_tx(
                    &tx,
                    &node,
                    merged,
                    &request.agent,
                    Some("resolved: accepted auto-merge"),
                )?;
                delete_conflict_tx(&tx, &request.node_id, &request.agent)?;
                delete_pending_read_tx(&tx, &request.node_id, &request.agent)?;
                outcome
            }
            Resolution::ManualMerge => {
                let content = request.manual_content.as_deref().ok_or(
                    StoreError::InvalidResolution("manual content required for MANUAL_MERGE"),
                )?;
                let outcome = apply_edit_tx(
                    &tx,
                    &node,
                    content,
                    &request.agent,
                    Some("resolved: manual merge"),
                )?;
                delete_conflict_tx(&tx, &request.node_id, &request.agent)?;
                delete_pending_read_tx(&tx, &request.node_id, &request.agent)?;
                outcome
            }
        };

        tx.commit()?;
        tracing::debug!(
            node = %request.node_id,
            agent = %request.agent,
            resolution = request.resolution.as_str(),
            "conflict resolved"
        );
        Ok(outcome)
    }
}

fn stored_conflict_tx(
    tx: &Transaction<'_>,
    node_id: &str,
    agent: &AgentId,
) -> Result<Option<StoredConflict>, StoreError> {
    let row = tx
        .query_row(
            "SELECT stored_at_ms, analysis_json FROM conflicts WHERE agent_id=?1 AND node_id=?2",
            params![agent.as_str(), node_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    let Some((stored_at_ms, analysis_json)) = row else {
        return Ok(None);
    };
    let analysis: ConflictAnalysis = serde_json::from_str(&analysis_json)?;
    Ok(Some(StoredConflict {
        agent_id: agent.as_str().to_string(),
        node_id: node_id.to_string(),
        stored_at_ms,
        analysis,
    }))
}
