#![forbid(unsafe_code)]

use rusqlite::{OptionalExtension, params};

use trellis_core::AgentId;

use crate::error::StoreError;
use crate::requests::CreateNodeRequest;
use crate::types::{EditHistoryEntry, NodeRecord};

use super::{
    SqliteStore, delete_conflict_tx, insert_snapshot_tx, load_node, now_ms, require_node,
    update_children_tx, validate_node_id,
};

impl SqliteStore {
    /// Create a node at version 1. Returns `Ok(false)` when the id is
    /// already taken; an existing node is never overwritten.
    pub fn create_node(&mut self, request: CreateNodeRequest) -> Result<bool, StoreError> {
        validate_node_id(&request.node_id)?;

        let tx = self.conn.transaction()?;

        if load_node(&tx, &request.node_id)?.is_some() {
            return Ok(false);
        }

        let parent = match request.parent_id.as_deref() {
            Some(parent_id) => Some(require_node(&tx, parent_id)?),
            None => None,
        };

        let now_ms = now_ms();
        let edit_history = vec![EditHistoryEntry {
            version: 1,
            agent: request.agent.as_str().to_string(),
            ts_ms: now_ms,
            summary: Some("created".to_string()),
            prev_version: None,
        }];
        let edit_history_json = serde_json::to_string(&edit_history)?;

        tx.execute(
            "INSERT INTO nodes(id, kind, title, content, level, parent_id, children_json, summary, \
                               version, last_editor, created_at_ms, updated_at_ms, edit_history_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', NULL, 1, ?7, ?8, ?8, ?9)",
            params![
                request.node_id,
                request.kind.as_str(),
                request.title,
                request.content,
                request.level,
                request.parent_id,
                request.agent.as_str(),
                now_ms,
                edit_history_json,
            ],
        )?;

        insert_snapshot_tx(
            &tx,
            &request.node_id,
            1,
            &request.content,
            request.agent.as_str(),
            now_ms,
            Some("created"),
        )?;

        if let Some(parent) = parent {
            let mut children = parent.children;
            children.push(request.node_id.clone());
            update_children_tx(&tx, &parent.id, &children)?;
        }

        tx.commit()?;
        tracing::debug!(node = %request.node_id, agent = %request.agent, "node created");
        Ok(true)
    }

    pub fn read_node(&self, node_id: &str) -> Result<Option<NodeRecord>, StoreError> {
        load_node(&self.conn, node_id)
    }

    /// Read a node and record the agent's intent to edit it. The recorded
    /// `(version, content)` pair becomes the diff base if the node moves
    /// on before the agent submits. Re-reading refreshes the base and
    /// clears any conflict stored for this agent on this node.
    pub fn read_for_edit(
        &mut self,
        node_id: &str,
        agent: &AgentId,
    ) -> Result<NodeRecord, StoreError> {
        let tx = self.conn.transaction()?;
        let node = require_node(&tx, node_id)?;

        tx.execute(
            "INSERT INTO pending_reads(node_id, agent_id, read_version, read_at_ms, base_content) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(node_id, agent_id) DO UPDATE SET \
               read_version=excluded.read_version, \
               read_at_ms=excluded.read_at_ms, \
               base_content=excluded.base_content",
            params![node_id, agent.as_str(), node.version, now_ms(), node.content],
        )?;
        delete_conflict_tx(&tx, node_id, agent)?;

        tx.commit()?;
        Ok(node)
    }

    pub fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id FROM nodes ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get::<_, String>(0)?);
        }
        drop(rows);
        drop(stmt);

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = load_node(&self.conn, &id)? {
                out.push(node);
            }
        }
        Ok(out)
    }

    /// Rename a node. Title is metadata: no version bump, no snapshot.
    pub fn update_title(
        &mut self,
        node_id: &str,
        title: &str,
        agent: &AgentId,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        require_node(&tx, node_id)?;
        tx.execute(
            "UPDATE nodes SET title=?2, last_editor=?3, updated_at_ms=?4 WHERE id=?1",
            params![node_id, title, agent.as_str(), now_ms()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Attach or replace a node's one-line summary. Metadata only.
    pub fn update_summary(
        &mut self,
        node_id: &str,
        summary: &str,
        agent: &AgentId,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        require_node(&tx, node_id)?;
        tx.execute(
            "UPDATE nodes SET summary=?2, last_editor=?3, updated_at_ms=?4 WHERE id=?1",
            params![node_id, summary, agent.as_str(), now_ms()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Next free id of the form `h{level}_{n}` for the given level.
    pub fn next_node_id(&self, level: i64) -> Result<String, StoreError> {
        let prefix = format!("h{level}_");
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM nodes WHERE id LIKE ?1")?;
        let mut rows = stmt.query(params![format!("{prefix}%")])?;

        let mut max_n: i64 = 0;
        while let Some(row) = rows.next()? {
            let id = row.get::<_, String>(0)?;
            if let Some(rest) = id.strip_prefix(&prefix) {
                if let Ok(n) = rest.parse::<i64>() {
                    max_n = max_n.max(n);
                }
            }
        }
        Ok(format!("{prefix}{}", max_n + 1))
    }

    /// Case-insensitive lookup of a direct child by title.
    pub fn find_child_by_title(
        &self,
        parent_id: &str,
        title: &str,
    ) -> Result<Option<NodeRecord>, StoreError> {
        let parent = require_node(&self.conn, parent_id)?;
        let wanted = title.trim().to_lowercase();
        for child_id in &parent.children {
            if let Some(child) = load_node(&self.conn, child_id)? {
                if child.title.trim().to_lowercase() == wanted {
                    return Ok(Some(child));
                }
            }
        }
        Ok(None)
    }

    /// Content of a specific historical version, when a snapshot exists.
    pub fn get_version_content(
        &self,
        node_id: &str,
        version: i64,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT content FROM history WHERE node_id=?1 AND version=?2",
                params![node_id, version],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    }
}
