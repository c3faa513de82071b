#![forbid(unsafe_code)]

use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};

use trellis_core::{AgentId, ConflictAnalysis};

use crate::error::StoreError;
use crate::types::{
    AgentStatus, AgentSummary, PendingReadStatus, RecentEdit, StoredConflict,
};

use super::{SqliteStore, load_node, now_ms};

impl SqliteStore {
    /// Persist a conflict for later resolution. One slot per
    /// `(agent, node)`: a newer conflict replaces the older one.
    pub fn store_conflict(
        &mut self,
        agent: &AgentId,
        analysis: &ConflictAnalysis,
    ) -> Result<(), StoreError> {
        let analysis_json = serde_json::to_string(analysis)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO conflicts(agent_id, node_id, stored_at_ms, analysis_json) \
             VALUES (?1, ?2, ?3, ?4)",
            params![agent.as_str(), analysis.node_id, now_ms(), analysis_json],
        )?;
        Ok(())
    }

    /// Stored conflicts, optionally scoped to one agent. Ordered oldest
    /// first.
    pub fn get_pending_conflicts(
        &self,
        agent: Option<&AgentId>,
    ) -> Result<Vec<StoredConflict>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_id, node_id, stored_at_ms, analysis_json FROM conflicts \
             WHERE (?1 IS NULL OR agent_id=?1) \
             ORDER BY stored_at_ms ASC, agent_id ASC, node_id ASC",
        )?;
        let mut rows = stmt.query(params![agent.map(AgentId::as_str)])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let analysis_json = row.get::<_, String>(3)?;
            let analysis: ConflictAnalysis = serde_json::from_str(&analysis_json)?;
            out.push(StoredConflict {
                agent_id: row.get::<_, String>(0)?,
                node_id: row.get::<_, String>(1)?,
                stored_at_ms: row.get::<_, i64>(2)?,
                analysis,
            });
        }
        Ok(out)
    }

    pub fn clear_conflict(&mut self, node_id: &str, agent: &AgentId) -> Result<bool, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM conflicts WHERE agent_id=?1 AND node_id=?2",
            params![agent.as_str(), node_id],
        )?;
        Ok(removed > 0)
    }

    /// Drop pending reads older than `ttl`. Returns how many were swept.
    pub fn cleanup_stale_reads(&mut self, ttl: Duration) -> Result<usize, StoreError> {
        let cutoff = now_ms() - ttl.as_millis() as i64;
        let removed = self.conn.execute(
            "DELETE FROM pending_reads WHERE read_at_ms <= ?1",
            params![cutoff],
        )?;
        if removed > 0 {
            tracing::debug!(removed, "stale pending reads swept");
        }
        Ok(removed)
    }

    /// Drop stored conflicts older than `ttl`. Returns how many were swept.
    pub fn cleanup_stale_conflicts(&mut self, ttl: Duration) -> Result<usize, StoreError> {
        let cutoff = now_ms() - ttl.as_millis() as i64;
        let removed = self.conn.execute(
            "DELETE FROM conflicts WHERE stored_at_ms <= ?1",
            params![cutoff],
        )?;
        if removed > 0 {
            tracing::debug!(removed, "stale conflicts swept");
        }
        Ok(removed)
    }

    /// Every agent that appears in any node's edit history, with rough
    /// activity figures.
    pub fn list_all_agents(&self) -> Result<Vec<AgentSummary>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id FROM nodes ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get::<_, String>(0)?);
        }
        drop(rows);
        drop(stmt);

        let mut summaries: Vec<AgentSummary> = Vec::new();
        for id in ids {
            let Some(node) = load_node(&self.conn, &id)? else {
                continue;
            };
            for entry in &node.edit_history {
                match summaries.iter_mut().find(|s| s.agent_id == entry.agent) {
                    Some(summary) => {
                        summary.edit_count += 1;
                        if !summary.nodes_edited.contains(&node.id) {
                            summary.nodes_edited.push(node.id.clone());
                        }
                        summary.first_seen_ms = summary.first_seen_ms.min(entry.ts_ms);
                        summary.last_seen_ms = summary.last_seen_ms.max(entry.ts_ms);
                    }
                    None => summaries.push(AgentSummary {
                        agent_id: entry.agent.clone(),
                        edit_count: 1,
                        nodes_edited: vec![node.id.clone()],
                        first_seen_ms: entry.ts_ms,
                        last_seen_ms: entry.ts_ms,
                    }),
                }
            }
        }
        summaries.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(summaries)
    }

    /// Suggest a free agent name of the form `agent_N`. Falls back to a
    /// timestamp-derived name when the first 99 are taken.
    pub fn suggest_agent_name(&self) -> Result<String, StoreError> {
        let taken: Vec<String> = self
            .list_all_agents()?
            .into_iter()
            .map(|s| s.agent_id)
            .collect();

        for n in 1..=99 {
            let candidate = format!("agent_{n}");
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Ok(format!("agent_{}", now_ms() % 100_000))
    }

    /// Best-effort session snapshot for one agent. Collection errors do
    /// not fail the call; they are reported in `error`.
    pub fn get_agent_status(&self, agent: &AgentId) -> Result<AgentStatus, StoreError> {
        let mut status = AgentStatus {
            agent_id: agent.as_str().to_string(),
            pending_reads: Vec::new(),
            pending_conflicts: Vec::new(),
            recent_edits: Vec::new(),
            nodes_touched: Vec::new(),
            error: None,
        };

        if let Err(err) = fill_agent_status(&self.conn, agent, &mut status) {
            status.error = Some(err.to_string());
        }
        Ok(status)
    }
}

fn fill_agent_status(
    conn: &Connection,
    agent: &AgentId,
    status: &mut AgentStatus,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT node_id, read_version, read_at_ms FROM pending_reads \
         WHERE agent_id=?1 ORDER BY read_at_ms ASC",
    )?;
    let mut rows = stmt.query(params![agent.as_str()])?;
    let mut reads = Vec::new();
    while let Some(row) = rows.next()? {
        reads.push((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ));
    }
    drop(rows);
    drop(stmt);

    for (node_id, read_version, read_at_ms) in reads {
        let current_version = conn
            .query_row(
                "SELECT version FROM nodes WHERE id=?1",
                params![node_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .unwrap_or(read_version);
        status.pending_reads.push(PendingReadStatus {
            node_id,
            read_version,
            current_version,
            read_at_ms,
            stale: current_version > read_version,
            stale_by: current_version - read_version,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT node_id, stored_at_ms, analysis_json FROM conflicts \
         WHERE agent_id=?1 ORDER BY stored_at_ms ASC",
    )?;
    let mut rows = stmt.query(params![agent.as_str()])?;
    while let Some(row) = rows.next()? {
        let analysis: ConflictAnalysis = serde_json::from_str(&row.get::<_, String>(2)?)?;
        status.pending_conflicts.push(StoredConflict {
            agent_id: agent.as_str().to_string(),
            node_id: row.get::<_, String>(0)?,
            stored_at_ms: row.get::<_, i64>(1)?,
            analysis,
        });
    }
    drop(rows);
    drop(stmt);

    let mut stmt = conn.prepare(
        "SELECT node_id, version, ts_ms, summary FROM history \
         WHERE agent=?1 ORDER BY ts_ms DESC LIMIT 10",
    )?;
    let mut rows = stmt.query(params![agent.as_str()])?;
    while let Some(row) = rows.next()? {
        let edit = RecentEdit {
            node_id: row.get::<_, String>(0)?,
            version: row.get::<_, i64>(1)?,
            ts_ms: row.get::<_, i64>(2)?,
            summary: row.get::<_, Option<String>>(3)?,
        };
        if !status.nodes_touched.contains(&edit.node_id) {
            status.nodes_touched.push(edit.node_id.clone());
        }
        status.recent_edits.push(edit);
    }

    Ok(())
}
