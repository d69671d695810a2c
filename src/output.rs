//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every entity (page, block, link) is shown by its identity first: a
//! positional index and a title. Storage details such as sort keys and
//! ETags follow as secondary context, either in brackets on the same line
//! or on indented lines below.
//!
//! # Output Format
//!
//! ## Draft
//!
//! ```text
//! Page 1 "Ana's links" (draft, revision 3)
//!     Locale: en
//!     Theme: theme_a (light)
//!
//! Blocks
//! 001 text [U] hello
//! 002 link_group [k] Links (2 links)
//!     001 Blog [U] https://example.com/1
//!     002 Shop [k] https://example.com/2 (inactive)
//! 003 link_group [m] (missing group 99)
//! ```
//!
//! ## Publish
//!
//! ```text
//! 001 page 1 → 3f2a…e1 (revision 3)
//! 002 page 2 → 9bc0…44 (unchanged)
//! 003 page 404 failed: draft '404' not found
//!
//! Published: 1 changed, 1 unchanged (3 total), 1 failed
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::cache::PublishCacheEntry;
use crate::compile::CompiledPage;
use crate::publish::{PublishError, PublishOutcome, summarize};
use crate::types::{BlockBody, Draft, JsonMap, PageId, PageStatus};
use serde_json::Value;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    }
}

/// One-line preview of a text block's content.
fn text_preview(content: &JsonMap) -> String {
    match content.get("text") {
        Some(Value::String(s)) => truncate(s, 40),
        _ => format!("({} fields)", content.len()),
    }
}

fn status_name(status: PageStatus) -> &'static str {
    match status {
        PageStatus::Draft => "draft",
        PageStatus::Published => "published",
    }
}

// ============================================================================
// Draft inventory
// ============================================================================

pub fn format_draft(draft: &Draft) -> Vec<String> {
    let page = &draft.page;
    let mut lines = Vec::new();

    let title = page
        .title
        .as_deref()
        .map(|t| format!(" \"{}\"", t))
        .unwrap_or_default();
    lines.push(format!(
        "Page {}{} ({}, revision {})",
        page.id,
        title,
        status_name(page.status),
        draft.revision
    ));
    lines.push(format!("{}Locale: {}", indent(1), page.locale));
    let theme = match page.theme.custom_id {
        Some(id) => format!("custom {} on {}", id, page.theme.preset_key),
        None => page.theme.preset_key.clone(),
    };
    lines.push(format!("{}Theme: {} ({})", indent(1), theme, page.theme.mode));

    lines.push(String::new());
    lines.push("Blocks".to_string());
    if draft.blocks.is_empty() {
        lines.push(format!("{}(none)", indent(1)));
    }

    let index = draft.index();
    for (pos, block) in draft.ordered_blocks().into_iter().enumerate() {
        let hidden = if block.is_visible { "" } else { " (hidden)" };
        let head = format!(
            "{} {} [{}]",
            format_index(pos + 1),
            block.type_name(),
            block.sort_key
        );
        match &block.body {
            BlockBody::Text { content } => {
                lines.push(format!("{} {}{}", head, text_preview(content), hidden));
            }
            BlockBody::LinkGroup { ref_id, .. } => {
                let Some(group) = ref_id.and_then(|id| index.group(id)) else {
                    let missing = match ref_id {
                        Some(id) => format!("(missing group {})", id),
                        None => "(no group)".to_string(),
                    };
                    lines.push(format!("{} {}{}", head, missing, hidden));
                    continue;
                };
                let title = group.title.as_deref().unwrap_or("(untitled)");
                lines.push(format!(
                    "{} {} ({} links){}",
                    head,
                    title,
                    group.links.len(),
                    hidden
                ));
                for (link_pos, link) in group.ordered_links().into_iter().enumerate() {
                    let inactive = if link.is_active { "" } else { " (inactive)" };
                    lines.push(format!(
                        "{}{} {} [{}] {}{}",
                        indent(1),
                        format_index(link_pos + 1),
                        link.title,
                        link.sort_key,
                        link.url,
                        inactive
                    ));
                }
            }
        }
    }
    lines
}

pub fn print_draft(draft: &Draft) {
    for line in format_draft(draft) {
        println!("{}", line);
    }
}

// ============================================================================
// Publish
// ============================================================================

pub fn format_publish_results(
    results: &[(PageId, Result<PublishOutcome, PublishError>)],
) -> Vec<String> {
    let mut lines = Vec::new();
    for (pos, (page_id, result)) in results.iter().enumerate() {
        let head = format!("{} page {}", format_index(pos + 1), page_id);
        match result {
            Ok(outcome) if outcome.changed => lines.push(format!(
                "{} → {} (revision {})",
                head, outcome.entry.etag, outcome.entry.revision
            )),
            Ok(outcome) => lines.push(format!("{} → {} (unchanged)", head, outcome.entry.etag)),
            Err(e) => lines.push(format!("{} failed: {}", head, e)),
        }
    }
    lines.push(String::new());
    lines.push(format!("Published: {}", summarize(results)));
    lines
}

pub fn print_publish_results(results: &[(PageId, Result<PublishOutcome, PublishError>)]) {
    for line in format_publish_results(results) {
        println!("{}", line);
    }
}

/// Header lines describing a published entry.
pub fn format_published(entry: &PublishCacheEntry) -> Vec<String> {
    vec![
        format!("Page {}", entry.page_id),
        format!("{}ETag: \"{}\"", indent(1), entry.etag),
        format!("{}Published: {}", indent(1), entry.published_at.to_rfc3339()),
        format!("{}Revision: {}", indent(1), entry.revision),
        format!("{}Size: {} bytes", indent(1), entry.compiled.len()),
    ]
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check(results: &[(PageId, Result<CompiledPage, PublishError>)]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut failed = 0;
    for (pos, (page_id, result)) in results.iter().enumerate() {
        match result {
            Ok(compiled) => lines.push(format!(
                "{} page {}: ok ({} blocks)",
                format_index(pos + 1),
                page_id,
                compiled.blocks.len()
            )),
            Err(e) => {
                failed += 1;
                lines.push(format!("{} page {}: {}", format_index(pos + 1), page_id, e));
            }
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "{} pages checked, {} failed",
        results.len(),
        failed
    ));
    lines
}

pub fn print_check(results: &[(PageId, Result<CompiledPage, PublishError>)]) {
    for line in format_check(results) {
        println!("{}", line);
    }
}
