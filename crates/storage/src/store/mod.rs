#![forbid(unsafe_code)]

mod agents;
mod edit;
mod health;
mod nodes;
mod resolve;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use trellis_core::{AgentId, EditOutcome};

use crate::error::StoreError;
use crate::types::{EditHistoryEntry, NodeKind, NodeRecord};

const DB_FILE: &str = "trellis.db";
const SCHEMA_VERSION: i64 = 1;
/// Edits kept in a node's inline history window; full snapshots live in
/// the `history` table and are not bounded by this.
const HISTORY_WINDOW: usize = 20;
const MAX_NODE_ID_LEN: usize = 128;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\n\
             PRAGMA synchronous = NORMAL;\n\
             PRAGMA foreign_keys = ON;",
        )?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        tracing::debug!(dir = %storage_dir.display(), "store opened");
        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = [
        "store_state",
        "nodes",
        "history",
        "pending_reads",
        "conflicts",
    ]
    .into_iter()
    .collect();

    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }

    for table in required {
        if !tables.contains(table) {
            return Err(StoreError::InvalidInput(
                "RESET_REQUIRED: required table is missing",
            ));
        }
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS nodes (
          id TEXT PRIMARY KEY,
          kind TEXT NOT NULL,
          title TEXT NOT NULL,
          content TEXT NOT NULL,
          level INTEGER NOT NULL,
          parent_id TEXT,
          children_json TEXT NOT NULL,
          summary TEXT,
          version INTEGER NOT NULL,
          last_editor TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          edit_history_json TEXT NOT NULL,
          CHECK(version >= 1)
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);

        CREATE TABLE IF NOT EXISTS history (
          node_id TEXT NOT NULL,
          version INTEGER NOT NULL,
          content TEXT NOT NULL,
          agent TEXT NOT NULL,
          ts_ms INTEGER NOT NULL,
          summary TEXT,
          PRIMARY KEY(node_id, version)
        );

        CREATE TABLE IF NOT EXISTS pending_reads (
          node_id TEXT NOT NULL,
          agent_id TEXT NOT NULL,
          read_version INTEGER NOT NULL,
          read_at_ms INTEGER NOT NULL,
          base_content TEXT NOT NULL,
          PRIMARY KEY(node_id, agent_id)
        );

        CREATE INDEX IF NOT EXISTS idx_pending_reads_agent ON pending_reads(agent_id);

        CREATE TABLE IF NOT EXISTS conflicts (
          agent_id TEXT NOT NULL,
          node_id TEXT NOT NULL,
          stored_at_ms INTEGER NOT NULL,
          analysis_json TEXT NOT NULL,
          PRIMARY KEY(agent_id, node_id)
        );
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn validate_node_id(node_id: &str) -> Result<(), StoreError> {
    if node_id.is_empty() {
        return Err(StoreError::InvalidInput("node id must not be empty"));
    }
    if node_id.len() > MAX_NODE_ID_LEN {
        return Err(StoreError::InvalidInput("node id is too long"));
    }
    Ok(())
}

/// Load a node row. Works on both a plain connection and a transaction,
/// since `Transaction` derefs to `Connection`.
fn load_node(conn: &Connection, node_id: &str) -> Result<Option<NodeRecord>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, kind, title, content, level, parent_id, children_json, summary, \
                    version, last_editor, created_at_ms, updated_at_ms, edit_history_json \
             FROM nodes WHERE id=?1",
            params![node_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, i64>(10)?,
                    row.get::<_, i64>(11)?,
                    row.get::<_, String>(12)?,
                ))
            },
        )
        .optional()?;

    let Some((
        id,
        kind,
        title,
        content,
        level,
        parent_id,
        children_json,
        summary,
        version,
        last_editor,
        created_at_ms,
        updated_at_ms,
        edit_history_json,
    )) = row
    else {
        return Ok(None);
    };

    let kind = NodeKind::parse(&kind).ok_or(StoreError::InvalidInput("invalid node kind row"))?;
    let children: Vec<String> = serde_json::from_str(&children_json)?;
    let edit_history: Vec<EditHistoryEntry> = serde_json::from_str(&edit_history_json)?;

    Ok(Some(NodeRecord {
        id,
        kind,
        title,
        content,
        level,
        parent_id,
        children,
        summary,
        version,
        last_editor,
        created_at_ms,
        updated_at_ms,
        edit_history,
    }))
}

fn require_node(conn: &Connection, node_id: &str) -> Result<NodeRecord, StoreError> {
    load_node(conn, node_id)?.ok_or(StoreError::UnknownNode)
}

fn insert_snapshot_tx(
    tx: &Transaction<'_>,
    node_id: &str,
    version: i64,
    content: &str,
    agent: &str,
    ts_ms: i64,
    summary: Option<&str>,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR REPLACE INTO history(node_id, version, content, agent, ts_ms, summary) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![node_id, version, content, agent, ts_ms, summary],
    )?;
    Ok(())
}

/// Bump the node to a new version with `content`, push the history window
/// entry, write the full snapshot, and report the applied outcome.
fn apply_edit_tx(
    tx: &Transaction<'_>,
    node: &NodeRecord,
    content: &str,
    agent: &AgentId,
    summary: Option<&str>,
) -> Result<EditOutcome, StoreError> {
    let now_ms = now_ms();
    let new_version = node.version + 1;

    let mut edit_history = node.edit_history.clone();
    edit_history.push(EditHistoryEntry {
        version: new_version,
        agent: agent.as_str().to_string(),
        ts_ms: now_ms,
        summary: summary.map(str::to_string),
        prev_version: Some(node.version),
    });
    if edit_history.len() > HISTORY_WINDOW {
        let excess = edit_history.len() - HISTORY_WINDOW;
        edit_history.drain(..excess);
    }
    let edit_history_json = serde_json::to_string(&edit_history)?;

    tx.execute(
        "UPDATE nodes SET content=?2, version=?3, last_editor=?4, updated_at_ms=?5, edit_history_json=?6 \
         WHERE id=?1",
        params![
            node.id,
            content,
            new_version,
            agent.as_str(),
            now_ms,
            edit_history_json,
        ],
    )?;

    insert_snapshot_tx(tx, &node.id, new_version, content, agent.as_str(), now_ms, summary)?;

    tracing::debug!(
        node = %node.id,
        from = node.version,
        to = new_version,
        agent = %agent,
        "edit applied"
    );

    Ok(EditOutcome::Applied {
        node_id: node.id.clone(),
        new_version,
        message: format!("edit applied: v{} -> v{}", node.version, new_version),
    })
}

fn update_children_tx(
    tx: &Transaction<'_>,
    node_id: &str,
    children: &[String],
) -> Result<(), StoreError> {
    let children_json = serde_json::to_string(children)?;
    tx.execute(
        "UPDATE nodes SET children_json=?2 WHERE id=?1",
        params![node_id, children_json],
    )?;
    Ok(())
}

fn delete_pending_read_tx(
    tx: &Transaction<'_>,
    node_id: &str,
    agent: &AgentId,
) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM pending_reads WHERE node_id=?1 AND agent_id=?2",
        params![node_id, agent.as_str()],
    )?;
    Ok(())
}

fn delete_conflict_tx(
    tx: &Transaction<'_>,
    node_id: &str,
    agent: &AgentId,
) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM conflicts WHERE agent_id=?1 AND node_id=?2",
        params![agent.as_str(), node_id],
    )?;
    Ok(())
}
