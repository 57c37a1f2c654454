// src/acquire/search.rs
//! Search responses arrive as numbered plain-text entries:
//!
//! ```text
//! [1] Title: Black Trans Joy Workshop - London
//! [1] URL Source: https://example.com/event1
//! [1] Description: Join us for an empowering workshop...
//! ```
//!
//! They are rewritten as heading sections so extraction is format-agnostic.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d+)\]\s*([A-Za-z][A-Za-z ]*?)\s*:\s*(.*)$").unwrap());

#[derive(Debug, Default, Clone, PartialEq)]
struct Entry {
    index: u32,
    title: String,
    url: String,
    description: String,
}

/// Convert numbered search results into markdown. Bodies without any
/// numbered entry are returned unchanged.
pub fn search_results_to_markdown(body: &str) -> String {
    let entries = parse_entries(body);
    if entries.is_empty() {
        return body.to_string();
    }

    let mut out = String::new();
    for e in entries.iter().filter(|e| !e.title.is_empty()) {
        out.push_str(&format!("### {}\n", e.title));
        if !e.url.is_empty() {
            out.push_str(&format!("URL: {}\n", e.url));
        }
        if !e.description.is_empty() {
            out.push('\n');
            out.push_str(&e.description);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

fn parse_entries(body: &str) -> Vec<Entry> {
    let mut out: Vec<Entry> = Vec::new();
    // last field seen, so unnumbered continuation lines extend it
    let mut last_field: Option<&'static str> = None;

    for line in body.lines() {
        let line = line.trim_end();
        if let Some(c) = RE_ENTRY.captures(line) {
            let index: u32 = c[1].parse().unwrap_or(0);
            if out.last().map(|e| e.index) != Some(index) {
                out.push(Entry {
                    index,
                    ..Entry::default()
                });
            }
            let value = c[3].trim().to_string();
            let Some(cur) = out.last_mut() else { continue };
            last_field = match c[2].to_ascii_lowercase().as_str() {
                "title" => {
                    cur.title = value;
                    Some("title")
                }
                "url source" | "url" => {
                    cur.url = value;
                    Some("url")
                }
                "description" | "content" if cur.description.is_empty() => {
                    cur.description = value;
                    Some("description")
                }
                _ => None,
            };
        } else if last_field == Some("description") && !line.trim().is_empty() {
            if let Some(cur) = out.last_mut() {
                cur.description.push(' ');
                cur.description.push_str(line.trim());
            }
        }
    }
    out
}
