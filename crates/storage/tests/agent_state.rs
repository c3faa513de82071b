#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use trellis_core::AgentId;
use trellis_storage::{
    CreateNodeRequest, EditNodeRequest, EditStrategy, NodeKind, SqliteStore,
};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("trellis_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn agent(name: &str) -> AgentId {
    AgentId::try_new(name).expect("agent id")
}

fn create(store: &mut SqliteStore, node_id: &str, content: &str) {
    let created = store
        .create_node(CreateNodeRequest {
            node_id: node_id.to_string(),
            kind: NodeKind::Root,
            title: "Document".to_string(),
            content: content.to_string(),
            level: 1,
            parent_id: None,
            agent: agent("setup"),
        })
        .expect("create node");
    assert!(created);
}

fn edit(store: &mut SqliteStore, node_id: &str, content: &str, who: &str) {
    store.read_for_edit(node_id, &agent(who)).expect("read");
    let outcome = store
        .edit_node(EditNodeRequest {
            node_id: node_id.to_string(),
            content: content.to_string(),
            agent: agent(who),
            summary: None,
            strategy: EditStrategy::Prompt,
        })
        .expect("edit");
    assert!(outcome.is_applied());
}

#[test]
fn agent_status_reports_stale_reads_and_recent_edits() {
    let mut store = SqliteStore::open(temp_dir("agent_status")).expect("open store");
    create(&mut store, "h1_1", "L1");

    store.read_for_edit("h1_1", &agent("agent_b")).expect("read b");
    edit(&mut store, "h1_1", "A1", "agent_a");

    let status = store.get_agent_status(&agent("agent_b")).expect("status");
    assert!(status.error.is_none());
    assert_eq!(status.pending_reads.len(), 1);
    let read = &status.pending_reads[0];
    assert_eq!(read.node_id, "h1_1");
    assert_eq!(read.read_version, 1);
    assert_eq!(read.current_version, 2);
    assert!(read.stale);
    assert_eq!(read.stale_by, 1);

    let status = store.get_agent_status(&agent("agent_a")).expect("status");
    assert_eq!(status.recent_edits.len(), 1);
    assert_eq!(status.nodes_touched, vec!["h1_1".to_string()]);
}

#[test]
fn cleanup_sweeps_by_ttl_only() {
    let mut store = SqliteStore::open(temp_dir("cleanup_ttl")).expect("open store");
    create(&mut store, "h1_1", "L1");
    store.read_for_edit("h1_1", &agent("agent_a")).expect("read");

    // A generous TTL keeps the fresh read.
    let swept = store
        .cleanup_stale_reads(Duration::from_secs(3600))
        .expect("cleanup");
    assert_eq!(swept, 0);

    // A zero TTL sweeps everything.
    let swept = store
        .cleanup_stale_reads(Duration::from_secs(0))
        .expect("cleanup");
    assert_eq!(swept, 1);

    let status = store.get_agent_status(&agent("agent_a")).expect("status");
    assert!(status.pending_reads.is_empty());
}

#[test]
fn conflict_cleanup_sweeps_stored_conflicts() {
    let mut store = SqliteStore::open(temp_dir("conflict_cleanup")).expect("open store");
    create(&mut store, "h1_1", "L1");

    store.read_for_edit("h1_1", &agent("agent_b")).expect("read b");
    edit(&mut store, "h1_1", "A1", "agent_a");
    let outcome = store
        .edit_node(EditNodeRequest {
            node_id: "h1_1".to_string(),
            content: "B1".to_string(),
            agent: agent("agent_b"),
            summary: None,
            strategy: EditStrategy::Prompt,
        })
        .expect("edit");
    let analysis = outcome.conflict().expect("conflict").clone();
    store.store_conflict(&agent("agent_b"), &analysis).expect("store");

    assert_eq!(store.get_pending_conflicts(None).expect("all").len(), 1);
    let swept = store
        .cleanup_stale_conflicts(Duration::from_secs(0))
        .expect("cleanup");
    assert_eq!(swept, 1);
    assert!(store.get_pending_conflicts(None).expect("all").is_empty());
}

#[test]
fn agents_are_listed_with_activity_figures() {
    let mut store = SqliteStore::open(temp_dir("agent_listing")).expect("open store");
    create(&mut store, "h1_1", "L1");
    edit(&mut store, "h1_1", "A1", "agent_a");
    edit(&mut store, "h1_1", "A2", "agent_a");
    edit(&mut store, "h1_1", "B1", "agent_b");

    let agents = store.list_all_agents().expect("agents");
    let names: Vec<&str> = agents.iter().map(|a| a.agent_id.as_str()).collect();
    assert_eq!(names, vec!["agent_a", "agent_b", "setup"]);

    let a = agents.iter().find(|a| a.agent_id == "agent_a").expect("a");
    assert_eq!(a.edit_count, 2);
    assert_eq!(a.nodes_edited, vec!["h1_1".to_string()]);
    assert!(a.first_seen_ms <= a.last_seen_ms);
}

#[test]
fn suggested_names_skip_taken_ones() {
    let mut store = SqliteStore::open(temp_dir("suggest_name")).expect("open store");
    assert_eq!(store.suggest_agent_name().expect("fresh"), "agent_1");

    create(&mut store, "h1_1", "L1");
    edit(&mut store, "h1_1", "one", "agent_1");
    edit(&mut store, "h1_1", "two", "agent_2");

    assert_eq!(store.suggest_agent_name().expect("suggest"), "agent_3");
}

#[test]
fn health_summarizes_the_store() {
    let mut store = SqliteStore::open(temp_dir("health")).expect("open store");

    let health = store.get_db_health();
    assert!(!health.initialized);
    assert_eq!(health.node_count, 0);

    create(&mut store, "h1_1", "L1");
    edit(&mut store, "h1_1", "A1", "agent_a");
    store.read_for_edit("h1_1", &agent("agent_b")).expect("read b");

    let health = store.get_db_health();
    assert!(health.error.is_none());
    assert!(health.initialized);
    assert!(health.has_root);
    assert_eq!(health.node_count, 1);
    assert_eq!(health.pending_read_count, 1);
    assert_eq!(health.pending_conflict_count, 0);
    assert_eq!(health.total_versions, 2);
    assert_eq!(health.active_agents, vec!["agent_a".to_string()]);
    assert!(health.last_edit_ms.is_some());
}

#[test]
fn state_survives_reopening_the_store() {
    let dir = temp_dir("reopen");
    {
        let mut store = SqliteStore::open(&dir).expect("open store");
        create(&mut store, "h1_1", "L1");
        edit(&mut store, "h1_1", "A1", "agent_a");
        store.read_for_edit("h1_1", &agent("agent_b")).expect("read b");
    }

    let store = SqliteStore::open(&dir).expect("reopen store");
    let node = store.read_node("h1_1").expect("read").expect("node");
    assert_eq!(node.version, 2);
    assert_eq!(node.content, "A1");

    let status = store.get_agent_status(&agent("agent_b")).expect("status");
    assert_eq!(status.pending_reads.len(), 1, "pending reads persist");
}
