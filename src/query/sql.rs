//! Backend query text
//!
//! The index service speaks a SQL-like dialect. Every value embedded in a
//! string literal goes through [`escape_sql`]; the dialect has no parameter
//! binding, so doubling single quotes is the only thing keeping a path like
//! `/music/Guns N' Roses` from breaking the query.

use crate::query::{MediaType, SearchQuery};
use std::path::Path;

/// Columns every row must carry
pub const REQUIRED_COLUMNS: &[&str] = &[
    "System.ItemPathDisplay",
    "System.ItemType",
    "System.DateAccessed",
    "System.DateModified",
    "System.DateCreated",
    "System.FileAttributes",
    "System.Size",
];

/// Columns that may be empty
pub const OPTIONAL_COLUMNS: &[&str] = &[
    "System.Rating",
    "System.Image.HorizontalSize",
    "System.Image.VerticalSize",
    "System.Keywords",
    "System.ItemAuthors",
    "System.Title",
    "System.Comment",
    "System.MIMEType",
];

/// Escape a value for a single-quoted literal by doubling each quote
pub fn escape_sql(value: &str) -> String {
    value.replace('\'', "''")
}

fn quoted(value: &str) -> String {
    format!("'{}'", escape_sql(value))
}

fn path_literal(path: &Path) -> String {
    quoted(&path.to_string_lossy())
}

/// Render the full query for a search call.
///
/// All roots go into one query as OR-combined scope clauses. Recursive
/// searches use `scope`, flat ones match the parent `directory`.
pub fn render_query(query: &SearchQuery) -> String {
    let mut clauses: Vec<String> = Vec::new();

    if !query.roots().is_empty() {
        let column = if query.recurse() { "scope" } else { "directory" };
        let parts: Vec<String> = query
            .roots()
            .iter()
            .map(|root| format!("{} = {}", column, path_literal(root)))
            .collect();
        clauses.push(format!("({})", parts.join(" OR ")));
    }

    if let Some(path) = query.exact_path() {
        clauses.push(format!("System.ItemPathDisplay = {}", path_literal(path)));
    }

    if let Some(text) = query.content_text() {
        clauses.push(format!(
            "CONTAINS(System.Search.Contents, '\"{}\"')",
            escape_sql(text)
        ));
    }

    if let Some(name) = query.filename() {
        clauses.push(format!("System.FileName = {}", quoted(name)));
    }

    for token in query.substring_tokens() {
        // The inner double quotes make the wildcards act as infix matches
        clauses.push(format!(
            "CONTAINS(System.FileName, '\"*{}*\"')",
            escape_sql(token)
        ));
    }

    if !query.include_files() {
        clauses.push("System.ItemType = 'Directory'".to_string());
    }
    if !query.include_dirs() {
        clauses.push("System.ItemType != 'Directory'".to_string());
    }

    match query.media_type() {
        Some(MediaType::Images) => clauses.push("System.Kind = 'picture'".to_string()),
        // GIFs can't be told apart from animations here, so let them through
        Some(MediaType::Videos) => {
            clauses.push("(System.Kind = 'video' OR System.ItemType = '.gif')".to_string())
        }
        None => {}
    }

    let columns: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .chain(OPTIONAL_COLUMNS.iter())
        .copied()
        .collect();

    let mut sql = format!(
        "SELECT {} FROM SystemIndex WHERE {}",
        columns.join(", "),
        clauses.join(" AND ")
    );
    if let Some(order) = query.order() {
        sql.push(' ');
        sql.push_str(order.order_clause());
    }
    sql
}

/// Render the coverage probe: one row, scoped to the root, no filters
pub fn render_probe(root: &Path) -> String {
    format!(
        "SELECT TOP 1 System.ItemPathDisplay FROM SystemIndex WHERE scope = {}",
        path_literal(root)
    )
}
