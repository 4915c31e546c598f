//! Markup for the search result tree.
//!
//! Rows carry `data-action` attributes the host page wires to clicks:
//! `toggle` with the folder id, or `open` with a `path:line` link.

use crate::tools::repo_search_tool::{FileMatch, FolderMatch, SearchMatch};
use std::collections::HashSet;

const INDENT_PX: usize = 10;

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// `path:line` link understood by the open-file action.
pub fn file_link(file: &FileMatch, line_number: usize) -> String {
    format!("{}:{}", file.absolute_path.display(), line_number)
}

enum RowAction<'a> {
    Toggle(&'a str),
    Open(&'a str),
}

fn row(depth: usize, id: &str, text: &str, count: Option<usize>, action: RowAction<'_>, expanded: bool) -> Vec<String> {
    let (class, attrs) = match action {
        RowAction::Toggle(target) => (
            if expanded { "explorer-item expanded" } else { "explorer-item collapsed" },
            format!(r#"data-action="toggle" data-target="{}""#, escape_html(target)),
        ),
        RowAction::Open(link) => ("explorer-item", format!(r#"data-action="open" data-link="{}""#, escape_html(link))),
    };
    let mut lines = vec![
        format!(
            r#"<div item-id="{}" class="{}" style="padding-left:{}px;" {}>"#,
            escape_html(id),
            class,
            depth * INDENT_PX,
            attrs
        ),
        format!("  <span>{}</span>", escape_html(text)),
    ];
    if let Some(count) = count {
        lines.push(format!(r#"  <div class="item-count"><span>{}</span></div>"#, count));
    }
    lines.push("</div>".to_string());
    lines
}

fn container(id: &str, hidden: bool, children: Vec<String>) -> Vec<String> {
    let class = if hidden { r#" class="hidden""# } else { "" };
    let mut lines = vec![format!(r#"<div content-id="{}"{}>"#, escape_html(id), class)];
    lines.extend(children.into_iter().map(|c| format!("  {}", c)));
    lines.push("</div>".to_string());
    lines
}

fn render_folder(folder: &FolderMatch, count: usize, depth: usize, id: &str, collapsed: &HashSet<String>) -> Vec<String> {
    let expanded = !collapsed.contains(id);
    let mut lines = row(depth, id, &folder.name, Some(count), RowAction::Toggle(id), expanded);
    let children = folder
        .children
        .iter()
        .enumerate()
        .flat_map(|(idx, child)| render_node(child, depth + 1, &format!("{}.{}", id, idx), collapsed))
        .collect();
    lines.extend(container(id, !expanded, children));
    lines
}

fn render_file(file: &FileMatch, depth: usize, id: &str) -> Vec<String> {
    let first_line = file.lines.first().map_or(1, |l| l.line_number);
    let mut lines = row(
        depth,
        id,
        file.file_name(),
        Some(file.lines.len()),
        RowAction::Open(&file_link(file, first_line)),
        true,
    );
    let line_rows = file
        .lines
        .iter()
        .flat_map(|line| {
            let line_id = format!("{}:{}", id, line.line_number);
            row(depth + 2, &line_id, line.text.trim(), None, RowAction::Open(&file_link(file, line.line_number)), true)
        })
        .collect();
    lines.extend(container(id, false, line_rows));
    lines
}

/// Renders one node and its subtree. `id` is the node's index path and
/// doubles as its toggle identity.
pub fn render_node(node: &SearchMatch, depth: usize, id: &str, collapsed: &HashSet<String>) -> Vec<String> {
    match node {
        SearchMatch::Folder(folder) => render_folder(folder, node.count(), depth, id, collapsed),
        SearchMatch::File(file) => render_file(file, depth, id),
    }
}

pub fn total_count(results: &[SearchMatch]) -> usize {
    results.iter().map(SearchMatch::count).sum()
}

/// Whole result block: a total header and the tree. Empty results render
/// an empty results container.
pub fn render_results(results: &[SearchMatch], collapsed: &HashSet<String>) -> String {
    let mut lines = Vec::new();
    let total = total_count(results);
    if total > 0 {
        lines.push(format!(r#"<div class="results-total"><span>{} results</span></div>"#, total));
    }
    lines.push(r#"<div id="results">"#.to_string());
    for (idx, node) in results.iter().enumerate() {
        lines.extend(render_node(node, 0, &idx.to_string(), collapsed).into_iter().map(|l| format!("  {}", l)));
    }
    lines.push("</div>".to_string());
    lines.join("\n")
}

/// Ids of every folder in the tree, in render order.
pub fn folder_ids(results: &[SearchMatch]) -> Vec<String> {
    fn walk(node: &SearchMatch, id: String, out: &mut Vec<String>) {
        if let SearchMatch::Folder(folder) = node {
            out.push(id.clone());
            for (idx, child) in folder.children.iter().enumerate() {
                walk(child, format!("{}.{}", id, idx), out);
            }
        }
    }
    let mut ids = Vec::new();
    for (idx, node) in results.iter().enumerate() {
        walk(node, idx.to_string(), &mut ids);
    }
    ids
}
