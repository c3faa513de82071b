#![forbid(unsafe_code)]

use std::io::Read as _;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use trellis_core::{AgentId, EditOutcome};
use trellis_storage::{
    CreateNodeRequest, EditNodeRequest, EditStrategy, DryRunReport, NodeKind, ResolveRequest,
    Resolution, SqliteStore, StoreError,
};

use crate::EXIT_CONFLICT;
use crate::markdown;

type CmdResult = Result<ExitCode, Box<dyn std::error::Error>>;

fn require_agent(agent: Option<&str>) -> Result<AgentId, Box<dyn std::error::Error>> {
    let name = agent.ok_or("agent name required: pass --agent or set TRELLIS_AGENT")?;
    Ok(AgentId::try_new(name)?)
}

/// `-` means stdin, like the usual unix convention.
fn resolve_content(inline: &str) -> Result<String, Box<dyn std::error::Error>> {
    if inline == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer.trim_end_matches('\n').to_string())
    } else {
        Ok(inline.to_string())
    }
}

fn format_ts(ts_ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts_ms / 1000)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| format!("{ts_ms}ms"))
}

pub fn init(store: &mut SqliteStore, title: &str, agent: Option<&str>) -> CmdResult {
    let agent = require_agent(agent)?;
    let node_id = store.next_node_id(1)?;
    let created = store.create_node(CreateNodeRequest {
        node_id: node_id.clone(),
        kind: NodeKind::Root,
        title: title.to_string(),
        content: String::new(),
        level: 1,
        parent_id: None,
        agent,
    })?;
    if created {
        println!("created root {node_id} \"{title}\"");
    } else {
        println!("root {node_id} already exists");
    }
    Ok(ExitCode::SUCCESS)
}

pub fn add(
    store: &mut SqliteStore,
    parent: &str,
    title: &str,
    content: &str,
    agent: Option<&str>,
) -> CmdResult {
    let agent = require_agent(agent)?;
    let parent_node = store.read_node(parent)?.ok_or(StoreError::UnknownNode)?;
    let level = parent_node.level + 1;
    let node_id = store.next_node_id(level)?;
    let content = resolve_content(content)?;

    store.create_node(CreateNodeRequest {
        node_id: node_id.clone(),
        kind: NodeKind::Section,
        title: title.to_string(),
        content,
        level,
        parent_id: Some(parent.to_string()),
        agent,
    })?;
    println!("created {node_id} \"{title}\" under {parent}");
    Ok(ExitCode::SUCCESS)
}

pub fn load(store: &mut SqliteStore, file: &Path, agent: Option<&str>) -> CmdResult {
    let agent = require_agent(agent)?;
    let text = std::fs::read_to_string(file)?;
    let blocks = markdown::parse_document(&text);
    if blocks.is_empty() {
        return Err("document is empty".into());
    }

    // Heading levels map to tree depth; each block's parent is the nearest
    // open block with a smaller level.
    let mut stack: Vec<(i64, String)> = Vec::new();
    let mut created = 0usize;
    for block in blocks {
        while stack.last().is_some_and(|(level, _)| *level >= block.level) {
            stack.pop();
        }
        let parent_id = stack.last().map(|(_, id)| id.clone());

        // Headingless text is a content leaf under the document root; the
        // root is created first when the document carries none.
        if block.headingless {
            let root_id = match parent_id {
                Some(id) => id,
                None => ensure_root(store, &agent, &mut created)?,
            };
            let was_created = store.create_node(CreateNodeRequest {
                node_id: "content_0".to_string(),
                kind: NodeKind::Content,
                title: block.title,
                content: block.content,
                level: 2,
                parent_id: Some(root_id),
                agent: agent.clone(),
            })?;
            if was_created {
                created += 1;
            }
            continue;
        }

        // Re-importing merges: a child with the same title under the same
        // parent is reused instead of duplicated.
        if let Some(parent) = parent_id.as_deref() {
            if let Some(existing) = store.find_child_by_title(parent, &block.title)? {
                stack.push((block.level, existing.id));
                continue;
            }
        }

        let node_id = store.next_node_id(block.level)?;
        let kind = if parent_id.is_none() {
            NodeKind::Root
        } else {
            NodeKind::Section
        };

        let was_created = store.create_node(CreateNodeRequest {
            node_id: node_id.clone(),
            kind,
            title: block.title,
            content: block.content,
            level: block.level,
            parent_id,
            agent: agent.clone(),
        })?;
        if was_created {
            created += 1;
        }
        stack.push((block.level, node_id));
    }
    println!("imported {created} node(s) from {}", file.display());
    Ok(ExitCode::SUCCESS)
}

/// The existing document root, or a freshly created one.
fn ensure_root(
    store: &mut SqliteStore,
    agent: &AgentId,
    created: &mut usize,
) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(root) = store
        .list_nodes()?
        .into_iter()
        .find(|node| node.kind == NodeKind::Root)
    {
        return Ok(root.id);
    }

    let root_id = store.next_node_id(1)?;
    store.create_node(CreateNodeRequest {
        node_id: root_id.clone(),
        kind: NodeKind::Root,
        title: "Document".to_string(),
        content: String::new(),
        level: 1,
        parent_id: None,
        agent: agent.clone(),
    })?;
    *created += 1;
    Ok(root_id)
}

pub fn export(store: &SqliteStore, file: Option<&Path>) -> CmdResult {
    let nodes = store.list_nodes()?;
    let rendered = markdown::export_document(&nodes)?;
    match file {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            println!("exported {} node(s) to {}", nodes.len(), path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(ExitCode::SUCCESS)
}

pub fn tree(store: &SqliteStore) -> CmdResult {
    let nodes = store.list_nodes()?;
    print!("{}", markdown::render_tree(&nodes));
    Ok(ExitCode::SUCCESS)
}

pub fn peek(store: &SqliteStore, node_id: &str) -> CmdResult {
    let node = store.read_node(node_id)?.ok_or(StoreError::UnknownNode)?;
    println!(
        "[{}] v{} \"{}\" (last edited by {})",
        node.id, node.version, node.title, node.last_editor
    );
    if let Some(summary) = &node.summary {
        println!("summary: {summary}");
    }
    println!("{}", node.content);
    Ok(ExitCode::SUCCESS)
}

pub fn read(store: &mut SqliteStore, node_id: &str, agent: Option<&str>) -> CmdResult {
    let agent = require_agent(agent)?;
    let node = store.read_for_edit(node_id, &agent)?;
    println!(
        "[{}] v{} \"{}\" (edit intent recorded for {})",
        node.id, node.version, node.title, agent
    );
    println!("{}", node.content);
    Ok(ExitCode::SUCCESS)
}

#[allow(clippy::too_many_arguments)]
pub fn edit(
    store: &mut SqliteStore,
    node_id: &str,
    content: Option<&str>,
    file: Option<&Path>,
    summary: Option<String>,
    strategy: &str,
    agent: Option<&str>,
) -> CmdResult {
    let agent = require_agent(agent)?;
    let strategy: EditStrategy = strategy.parse()?;
    let content = match (content, file) {
        (Some(inline), _) => resolve_content(inline)?,
        (None, Some(path)) => std::fs::read_to_string(path)?
            .trim_end_matches('\n')
            .to_string(),
        (None, None) => return Err("new content required: pass --content or --file".into()),
    };

    let outcome = store.edit_node(EditNodeRequest {
        node_id: node_id.to_string(),
        content,
        agent: agent.clone(),
        summary,
        strategy,
    })?;

    match outcome {
        EditOutcome::Applied { message, .. } => {
            println!("{message}");
            Ok(ExitCode::SUCCESS)
        }
        EditOutcome::Conflict(analysis) => {
            store.store_conflict(&agent, &analysis)?;
            println!("{}", analysis.to_prompt());
            println!(
                "resolve with: trellis resolve {node_id} <RESOLUTION> --agent {agent}"
            );
            Ok(ExitCode::from(EXIT_CONFLICT))
        }
    }
}

pub fn resolve(
    store: &mut SqliteStore,
    node_id: &str,
    resolution: &str,
    content: Option<&str>,
    agent: Option<&str>,
) -> CmdResult {
    let agent = require_agent(agent)?;
    let resolution: Resolution = resolution.parse()?;
    let manual_content = content.map(resolve_content).transpose()?;

    let outcome = store.resolve_conflict(ResolveRequest {
        node_id: node_id.to_string(),
        resolution,
        agent,
        manual_content,
    });

    match outcome {
        Ok(EditOutcome::Applied { message, .. }) => {
            println!("{message}");
            Ok(ExitCode::SUCCESS)
        }
        Ok(EditOutcome::Conflict(_)) => Err("unexpected conflict outcome from resolution".into()),
        Err(err @ StoreError::StaleConflict { .. }) => {
            eprintln!("{err}");
            Ok(ExitCode::from(EXIT_CONFLICT))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn title(
    store: &mut SqliteStore,
    node_id: &str,
    new_title: &str,
    agent: Option<&str>,
) -> CmdResult {
    let agent = require_agent(agent)?;
    store.update_title(node_id, new_title, &agent)?;
    println!("renamed {node_id} to \"{new_title}\"");
    Ok(ExitCode::SUCCESS)
}

pub fn summarize(
    store: &mut SqliteStore,
    node_id: &str,
    summary: &str,
    agent: Option<&str>,
) -> CmdResult {
    let agent = require_agent(agent)?;
    store.update_summary(node_id, summary, &agent)?;
    println!("summary set on {node_id}");
    Ok(ExitCode::SUCCESS)
}

pub fn status(store: &SqliteStore, agent: Option<&str>) -> CmdResult {
    let agent = require_agent(agent)?;
    let status = store.get_agent_status(&agent)?;

    println!("agent: {}", status.agent_id);
    if let Some(error) = &status.error {
        println!("warning: status is partial: {error}");
    }

    println!("pending reads: {}", status.pending_reads.len());
    for read in &status.pending_reads {
        if read.stale {
            println!(
                "  {} read at v{}, now v{} ({} behind)",
                read.node_id, read.read_version, read.current_version, read.stale_by
            );
        } else {
            println!("  {} read at v{} (current)", read.node_id, read.read_version);
        }
    }

    println!("pending conflicts: {}", status.pending_conflicts.len());
    for conflict in &status.pending_conflicts {
        println!(
            "  {} ({}) stored {}",
            conflict.node_id,
            conflict.analysis.conflict_type.as_str(),
            format_ts(conflict.stored_at_ms)
        );
    }

    println!("recent edits: {}", status.recent_edits.len());
    for edit in &status.recent_edits {
        println!(
            "  {} v{} at {}{}",
            edit.node_id,
            edit.version,
            format_ts(edit.ts_ms),
            edit.summary
                .as_deref()
                .map(|s| format!(" - {s}"))
                .unwrap_or_default()
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub fn conflicts(store: &SqliteStore, all: bool, agent: Option<&str>) -> CmdResult {
    let scoped;
    let filter = if all {
        None
    } else {
        scoped = require_agent(agent)?;
        Some(&scoped)
    };

    let conflicts = store.get_pending_conflicts(filter)?;
    if conflicts.is_empty() {
        println!("no pending conflicts");
        return Ok(ExitCode::SUCCESS);
    }
    for conflict in &conflicts {
        println!(
            "{} on {}: {} (v{} vs v{}), stored {}",
            conflict.agent_id,
            conflict.node_id,
            conflict.analysis.conflict_type.as_str(),
            conflict.analysis.your_base_version,
            conflict.analysis.current_version,
            format_ts(conflict.stored_at_ms),
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub fn agents(store: &SqliteStore) -> CmdResult {
    let agents = store.list_all_agents()?;
    if agents.is_empty() {
        println!("no agents recorded");
        return Ok(ExitCode::SUCCESS);
    }
    for agent in &agents {
        println!(
            "{}: {} edit(s) across {} node(s), last seen {}",
            agent.agent_id,
            agent.edit_count,
            agent.nodes_edited.len(),
            format_ts(agent.last_seen_ms),
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub fn whoami(store: &SqliteStore, agent: Option<&str>) -> CmdResult {
    match agent {
        Some(name) => {
            let agent = AgentId::try_new(name)?;
            println!("{agent}");
        }
        None => {
            let suggested = store.suggest_agent_name()?;
            println!("no agent configured; suggested name: {suggested}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn search(store: &SqliteStore, query: &str, case_sensitive: bool) -> CmdResult {
    let hits = store.search_content(query, case_sensitive)?;
    if hits.is_empty() {
        println!("no matches");
        return Ok(ExitCode::SUCCESS);
    }
    for hit in &hits {
        let title_note = if hit.match_in_title { " [title]" } else { "" };
        println!(
            "[{}] v{} \"{}\"{} - {} matching line(s)",
            hit.node_id, hit.version, hit.title, title_note, hit.total_matches
        );
        for (line_number, line) in &hit.matching_lines {
            println!("  {line_number}: {line}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn history(store: &SqliteStore, node_id: &str) -> CmdResult {
    let entries = store.get_node_history(node_id)?;
    for entry in &entries {
        let snapshot = if entry.has_content {
            ""
        } else {
            " (no snapshot)"
        };
        println!(
            "v{} by {} at {}{}{}",
            entry.version,
            entry.agent,
            format_ts(entry.ts_ms),
            entry
                .summary
                .as_deref()
                .map(|s| format!(" - {s}"))
                .unwrap_or_default(),
            snapshot,
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub fn rollback(
    store: &mut SqliteStore,
    node_id: &str,
    version: i64,
    agent: Option<&str>,
) -> CmdResult {
    let agent = require_agent(agent)?;
    match store.rollback(node_id, version, &agent)? {
        EditOutcome::Applied {
            new_version,
            message,
            ..
        } => {
            println!("{message} (now v{new_version})");
            Ok(ExitCode::SUCCESS)
        }
        EditOutcome::Conflict(_) => Err("unexpected conflict outcome from rollback".into()),
    }
}

pub fn dry_run(
    store: &SqliteStore,
    node_id: &str,
    content: &str,
    agent: Option<&str>,
) -> CmdResult {
    let agent = require_agent(agent)?;
    let content = resolve_content(content)?;
    match store.dry_run_edit(node_id, &content, &agent)? {
        DryRunReport::WouldSucceed {
            reason,
            current_version,
            new_version,
            content_changed,
        } => {
            println!("edit would apply: v{current_version} -> v{new_version} ({reason})");
            if !content_changed {
                println!("note: content is identical to the current version");
            }
            Ok(ExitCode::SUCCESS)
        }
        DryRunReport::WouldConflict {
            your_base_version,
            current_version,
            versions_behind,
        } => {
            println!(
                "edit would conflict: base v{your_base_version}, current v{current_version} ({versions_behind} behind)"
            );
            Ok(ExitCode::from(EXIT_CONFLICT))
        }
    }
}

pub fn cleanup(store: &mut SqliteStore, reads_ttl: u64, conflicts_ttl: u64) -> CmdResult {
    let reads = store.cleanup_stale_reads(Duration::from_secs(reads_ttl))?;
    let conflicts = store.cleanup_stale_conflicts(Duration::from_secs(conflicts_ttl))?;
    println!("swept {reads} pending read(s) and {conflicts} conflict(s)");
    Ok(ExitCode::SUCCESS)
}

pub fn check(store: &SqliteStore) -> CmdResult {
    let health = store.get_db_health();
    println!("storage: {}", health.storage_dir);
    println!("initialized: {}", health.initialized);
    println!("nodes: {} (root present: {})", health.node_count, health.has_root);
    println!("total versions: {}", health.total_versions);
    println!("pending reads: {}", health.pending_read_count);
    println!("pending conflicts: {}", health.pending_conflict_count);
    println!("active agents: {}", health.active_agents.join(", "));
    if let Some(last_edit) = health.last_edit_ms {
        println!("last edit: {}", format_ts(last_edit));
    }
    if let Some(error) = &health.error {
        println!("warning: health is partial: {error}");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
