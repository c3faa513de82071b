#![forbid(unsafe_code)]

//! Markdown import/export for the document tree. Import understands ATX
//! headings and ignores heading-like lines inside fenced code blocks;
//! export is the inverse pre-order walk.

use std::collections::{HashMap, HashSet};

use trellis_storage::{NodeKind, NodeRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedBlock {
    pub level: i64,
    pub title: String,
    pub content: String,
    /// Content that precedes the first heading (or a document with no
    /// headings at all).
    pub headingless: bool,
}

pub fn parse_document(text: &str) -> Vec<ParsedBlock> {
    let text = text.replace("\r\n", "\n");

    let mut blocks: Vec<ParsedBlock> = Vec::new();
    let mut current: Option<(i64, String)> = None;
    let mut lines: Vec<&str> = Vec::new();
    // The character that opened the current fence; a fence only closes on
    // its own marker, so a ~~~ line inside a backtick fence is content.
    let mut fence: Option<char> = None;

    let mut flush = |current: &mut Option<(i64, String)>, lines: &mut Vec<&str>, blocks: &mut Vec<ParsedBlock>| {
        let content = lines.join("\n").trim().to_string();
        lines.clear();
        match current.take() {
            Some((level, title)) => blocks.push(ParsedBlock {
                level,
                title,
                content,
                headingless: false,
            }),
            None if !content.is_empty() => blocks.push(ParsedBlock {
                level: 1,
                title: "Content".to_string(),
                content,
                headingless: true,
            }),
            None => {}
        }
    };

    for line in text.lines() {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with("```") {
            Some('`')
        } else if trimmed.starts_with("~~~") {
            Some('~')
        } else {
            None
        };
        if let Some(marker) = marker {
            match fence {
                None => fence = Some(marker),
                Some(open) if open == marker => fence = None,
                Some(_) => {}
            }
            lines.push(line);
            continue;
        }
        if fence.is_none() {
            if let Some((level, title)) = parse_heading(line) {
                flush(&mut current, &mut lines, &mut blocks);
                current = Some((level, title));
                continue;
            }
        }
        lines.push(line);
    }
    flush(&mut current, &mut lines, &mut blocks);

    blocks
}

/// ATX heading: one to six `#` followed by a space. Trailing closing
/// hashes are stripped, as common markdown renderers do.
fn parse_heading(line: &str) -> Option<(i64, String)> {
    let hashes = line.len() - line.trim_start_matches('#').len();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim().to_string();
    Some((hashes as i64, title))
}

/// Render the whole tree back to markdown: iterative pre-order walk,
/// children in stored document order. Missing child ids and cycles are
/// broken trees and reported as errors, not silently skipped or looped.
pub fn export_document(nodes: &[NodeRecord]) -> Result<String, String> {
    let by_id: HashMap<&str, &NodeRecord> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut out = String::new();
    let mut stack: Vec<&NodeRecord> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();

    let mut root_nodes: Vec<&NodeRecord> = roots(nodes).collect();
    root_nodes.reverse();
    stack.extend(root_nodes);

    while let Some(node) = stack.pop() {
        if !visited.insert(node.id.as_str()) {
            return Err(format!("cycle detected at node {}", node.id));
        }

        if node.kind != NodeKind::Content {
            let level = node.level.clamp(1, 6) as usize;
            out.push_str(&"#".repeat(level));
            out.push(' ');
            out.push_str(&node.title);
            out.push('\n');
        }
        if !node.content.is_empty() {
            out.push('\n');
            out.push_str(&node.content);
            out.push('\n');
        }
        out.push('\n');

        for child_id in node.children.iter().rev() {
            let child = by_id
                .get(child_id.as_str())
                .ok_or_else(|| format!("node {} references missing child {child_id}", node.id))?;
            stack.push(child);
        }
    }
    Ok(out)
}

pub fn render_tree(nodes: &[NodeRecord]) -> String {
    let by_id: HashMap<&str, &NodeRecord> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut out = String::new();
    let mut stack: Vec<(&NodeRecord, usize)> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();

    let mut root_nodes: Vec<&NodeRecord> = roots(nodes).collect();
    root_nodes.reverse();
    stack.extend(root_nodes.into_iter().map(|n| (n, 0)));

    while let Some((node, depth)) = stack.pop() {
        if !visited.insert(node.id.as_str()) {
            continue;
        }
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!(
            "[{}] v{} \"{}\" (by {})\n",
            node.id, node.version, node.title, node.last_editor
        ));
        for child_id in node.children.iter().rev() {
            if let Some(child) = by_id.get(child_id.as_str()) {
                stack.push((child, depth + 1));
            }
        }
    }
    out
}

/// Top-level nodes: no parent, or a parent that no longer exists.
fn roots(nodes: &[NodeRecord]) -> impl Iterator<Item = &NodeRecord> {
    let known: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    nodes.iter().filter(move |node| {
        node.parent_id
            .as_deref()
            .is_none_or(|parent| !known.contains(&parent))
    })
}
