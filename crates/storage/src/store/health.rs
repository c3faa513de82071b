#![forbid(unsafe_code)]

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;
use crate::types::{DbHealth, HistoryEntry, SearchHit};

use super::{SqliteStore, load_node, require_node};

const MAX_MATCHING_LINES: usize = 5;
const PREVIEW_CHARS: usize = 80;

impl SqliteStore {
    /// Best-effort health snapshot. Never fails: collection errors are
    /// reported inside the result.
    pub fn get_db_health(&self) -> DbHealth {
        let mut health = DbHealth {
            storage_dir: self.storage_dir.display().to_string(),
            ..DbHealth::default()
        };
        if let Err(err) = fill_db_health(&self.conn, &mut health) {
            health.error = Some(err.to_string());
        }
        health
    }

    /// Substring search across titles and content, case-insensitive by
    /// default. At most five matching lines are reported per node.
    pub fn search_content(
        &self,
        query: &str,
        case_sensitive: bool,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let needle = if case_sensitive {
            query.trim().to_string()
        } else {
            query.trim().to_lowercase()
        };
        if needle.is_empty() {
            return Err(StoreError::InvalidInput("search query must not be empty"));
        }

        let mut stmt = self.conn.prepare("SELECT id FROM nodes ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get::<_, String>(0)?);
        }
        drop(rows);
        drop(stmt);

        let mut hits = Vec::new();
        for id in ids {
            let Some(node) = load_node(&self.conn, &id)? else {
                continue;
            };
            let matches = |text: &str| {
                if case_sensitive {
                    text.contains(&needle)
                } else {
                    text.to_lowercase().contains(&needle)
                }
            };
            let match_in_title = matches(&node.title);

            let mut matching_lines = Vec::new();
            let mut total_matches = 0usize;
            for (index, line) in node.content.lines().enumerate() {
                if matches(line) {
                    total_matches += 1;
                    if matching_lines.len() < MAX_MATCHING_LINES {
                        matching_lines.push((index + 1, line.to_string()));
                    }
                }
            }

            if match_in_title || total_matches > 0 {
                hits.push(SearchHit {
                    node_id: node.id,
                    title: node.title,
                    version: node.version,
                    match_in_title,
                    matching_lines,
                    total_matches,
                });
            }
        }
        Ok(hits)
    }

    /// A node's edit history window, newest first, annotated with whether
    /// a full snapshot survives for each version.
    pub fn get_node_history(&self, node_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let node = require_node(&self.conn, node_id)?;

        let mut entries = Vec::with_capacity(node.edit_history.len());
        for window_entry in node.edit_history.iter().rev() {
            let content = self
                .conn
                .query_row(
                    "SELECT content FROM history WHERE node_id=?1 AND version=?2",
                    params![node_id, window_entry.version],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;

            let content_preview = content.as_deref().map(|text| {
                let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
                if text.chars().count() > PREVIEW_CHARS {
                    preview.push_str("...");
                }
                preview
            });

            entries.push(HistoryEntry {
                version: window_entry.version,
                agent: window_entry.agent.clone(),
                ts_ms: window_entry.ts_ms,
                summary: window_entry.summary.clone(),
                has_content: content.is_some(),
                content_preview,
            });
        }
        Ok(entries)
    }
}

fn fill_db_health(conn: &Connection, health: &mut DbHealth) -> Result<(), StoreError> {
    health.node_count = conn.query_row("SELECT COUNT(1) FROM nodes", [], |row| {
        row.get::<_, i64>(0)
    })? as usize;
    health.initialized = health.node_count > 0;

    health.has_root = conn
        .query_row(
            "SELECT 1 FROM nodes WHERE kind='root' LIMIT 1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();

    health.pending_read_count = conn.query_row(
        "SELECT COUNT(1) FROM pending_reads",
        [],
        |row| row.get::<_, i64>(0),
    )? as usize;

    health.pending_conflict_count = conn.query_row(
        "SELECT COUNT(1) FROM conflicts",
        [],
        |row| row.get::<_, i64>(0),
    )? as usize;

    health.total_versions = conn.query_row(
        "SELECT COALESCE(SUM(version), 0) FROM nodes",
        [],
        |row| row.get::<_, i64>(0),
    )?;

    let mut stmt =
        conn.prepare("SELECT DISTINCT last_editor FROM nodes ORDER BY last_editor ASC")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        health.active_agents.push(row.get::<_, String>(0)?);
    }
    drop(rows);
    drop(stmt);

    health.last_edit_ms = conn.query_row(
        "SELECT MAX(updated_at_ms) FROM nodes",
        [],
        |row| row.get::<_, Option<i64>>(0),
    )?;

    Ok(())
}
