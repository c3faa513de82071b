#![forbid(unsafe_code)]

use std::path::PathBuf;

use trellis_core::{AgentId, EditOutcome};
use trellis_storage::{
    CreateNodeRequest, EditNodeRequest, EditStrategy, NodeKind, SqliteStore, StoreError,
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

fn create_request(node_id: &str, parent_id: Option<&str>, level: i64) -> CreateNodeRequest {
    CreateNodeRequest {
        node_id: node_id.to_string(),
        kind: if level == 1 {
            NodeKind::Root
        } else {
            NodeKind::Section
        },
        title: format!("Title of {node_id}"),
        content: String::new(),
        level,
        parent_id: parent_id.map(str::to_string),
        agent: agent("setup"),
    }
}

#[test]
fn create_links_children_in_document_order() {
    let mut store = SqliteStore::open(temp_dir("children_order")).expect("open store");
    assert!(store.create_node(create_request("h1_1", None, 1)).expect("root"));
    assert!(store.create_node(create_request("h2_1", Some("h1_1"), 2)).expect("first"));
    assert!(store.create_node(create_request("h2_2", Some("h1_1"), 2)).expect("second"));

    let root = store.read_node("h1_1").expect("read").expect("root");
    assert_eq!(root.children, vec!["h2_1".to_string(), "h2_2".to_string()]);

    let child = store.read_node("h2_1").expect("read").expect("child");
    assert_eq!(child.parent_id.as_deref(), Some("h1_1"));
    assert_eq!(child.version, 1);
}

#[test]
fn create_is_idempotent_on_existing_ids() {
    let mut store = SqliteStore::open(temp_dir("create_idempotent")).expect("open store");
    assert!(store.create_node(create_request("h1_1", None, 1)).expect("first"));

    let mut again = create_request("h1_1", None, 1);
    again.title = "Other title".to_string();
    assert!(!store.create_node(again).expect("second"));

    let node = store.read_node("h1_1").expect("read").expect("node");
    assert_eq!(node.title, "Title of h1_1", "existing node must be untouched");
}

#[test]
fn create_with_missing_parent_fails() {
    let mut store = SqliteStore::open(temp_dir("missing_parent")).expect("open store");
    let err = store
        .create_node(create_request("h2_1", Some("h1_9"), 2))
        .expect_err("missing parent");
    assert!(matches!(err, StoreError::UnknownNode));
    assert!(store.read_node("h2_1").expect("read").is_none());
}

#[test]
fn title_and_summary_updates_do_not_bump_the_version() {
    let mut store = SqliteStore::open(temp_dir("metadata_updates")).expect("open store");
    assert!(store.create_node(create_request("h2_1", None, 2)).expect("create"));

    store
        .update_title("h2_1", "Renamed", &agent("agent_a"))
        .expect("title");
    store
        .update_summary("h2_1", "what this section covers", &agent("agent_a"))
        .expect("summary");

    let node = store.read_node("h2_1").expect("read").expect("node");
    assert_eq!(node.version, 1);
    assert_eq!(node.title, "Renamed");
    assert_eq!(node.summary.as_deref(), Some("what this section covers"));
    assert_eq!(node.last_editor, "agent_a");
}

#[test]
fn next_node_id_counts_per_level() {
    let mut store = SqliteStore::open(temp_dir("next_node_id")).expect("open store");
    assert_eq!(store.next_node_id(2).expect("fresh"), "h2_1");

    assert!(store.create_node(create_request("h2_1", None, 2)).expect("create"));
    assert!(store.create_node(create_request("h2_7", None, 2)).expect("create"));
    assert!(store.create_node(create_request("h3_2", None, 3)).expect("create"));

    assert_eq!(store.next_node_id(2).expect("level 2"), "h2_8");
    assert_eq!(store.next_node_id(3).expect("level 3"), "h3_3");
}

#[test]
fn find_child_by_title_is_case_insensitive() {
    let mut store = SqliteStore::open(temp_dir("find_child")).expect("open store");
    assert!(store.create_node(create_request("h1_1", None, 1)).expect("root"));
    let mut child = create_request("h2_1", Some("h1_1"), 2);
    child.title = "Auth Flow".to_string();
    assert!(store.create_node(child).expect("child"));

    let found = store
        .find_child_by_title("h1_1", "  auth flow ")
        .expect("find")
        .expect("hit");
    assert_eq!(found.id, "h2_1");

    assert!(store.find_child_by_title("h1_1", "nope").expect("find").is_none());
}

#[test]
fn rollback_restores_a_snapshot_as_a_new_version() {
    let mut store = SqliteStore::open(temp_dir("rollback")).expect("open store");
    let mut request = create_request("h2_1", None, 2);
    request.content = "first".to_string();
    assert!(store.create_node(request).expect("create"));

    store.read_for_edit("h2_1", &agent("agent_a")).expect("read");
    let outcome = store
        .edit_node(EditNodeRequest {
            node_id: "h2_1".to_string(),
            content: "second".to_string(),
            agent: agent("agent_a"),
            summary: Some("rework".to_string()),
            strategy: EditStrategy::Prompt,
        })
        .expect("edit");
    assert!(outcome.is_applied());

    let outcome = store
        .rollback("h2_1", 1, &agent("agent_a"))
        .expect("rollback");
    match outcome {
        EditOutcome::Applied { new_version, .. } => assert_eq!(new_version, 3),
        EditOutcome::Conflict(_) => panic!("expected applied outcome"),
    }

    let node = store.read_node("h2_1").expect("read").expect("node");
    assert_eq!(node.content, "first");
    assert_eq!(node.version, 3, "rollback moves history forward");
    let last = node.edit_history.last().expect("entry");
    assert_eq!(last.summary.as_deref(), Some("rolled back to v1"));

    let err = store
        .rollback("h2_1", 99, &agent("agent_a"))
        .expect_err("unknown version");
    assert!(matches!(err, StoreError::UnknownVersion { version: 99 }));
}

#[test]
fn history_reports_snapshots_newest_first() {
    let mut store = SqliteStore::open(temp_dir("history_order")).expect("open store");
    let mut request = create_request("h2_1", None, 2);
    request.content = "v1 content".to_string();
    assert!(store.create_node(request).expect("create"));

    store.read_for_edit("h2_1", &agent("agent_a")).expect("read");
    store
        .edit_node(EditNodeRequest {
            node_id: "h2_1".to_string(),
            content: "v2 content".to_string(),
            agent: agent("agent_a"),
            summary: Some("tighten wording".to_string()),
            strategy: EditStrategy::Prompt,
        })
        .expect("edit");

    let history = store.get_node_history("h2_1").expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version, 2);
    assert_eq!(history[0].summary.as_deref(), Some("tighten wording"));
    assert!(history[0].has_content);
    assert_eq!(history[1].version, 1);
    assert!(history[1].has_content);

    assert_eq!(
        store.get_version_content("h2_1", 2).expect("snapshot"),
        Some("v2 content".to_string())
    );
}

#[test]
fn search_matches_titles_and_caps_reported_lines() {
    let mut store = SqliteStore::open(temp_dir("search")).expect("open store");
    let mut request = create_request("h2_1", None, 2);
    request.title = "Token Rotation".to_string();
    request.content = (0..8)
        .map(|n| format!("token line {n}"))
        .collect::<Vec<_>>()
        .join("\n");
    assert!(store.create_node(request).expect("create"));

    let mut other = create_request("h2_2", None, 2);
    other.content = "nothing relevant".to_string();
    assert!(store.create_node(other).expect("create"));

    let hits = store.search_content("TOKEN", false).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node_id, "h2_1");
    assert!(hits[0].match_in_title);
    assert_eq!(hits[0].matching_lines.len(), 5);
    assert_eq!(hits[0].total_matches, 8);
    assert_eq!(hits[0].matching_lines[0].0, 1);

    // Case-sensitive search only matches the exact casing.
    assert!(store.search_content("TOKEN", true).expect("search").is_empty());
    let hits = store.search_content("token line", true).expect("search");
    assert_eq!(hits.len(), 1);
    assert!(!hits[0].match_in_title);

    let err = store.search_content("   ", false).expect_err("blank query");
    assert!(matches!(err, StoreError::InvalidInput(_)));
}
