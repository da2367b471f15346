//! Document parser.
//!
//! Splits raw text into titled sections on markdown-style headings. The
//! parser is pure: no I/O, no state, deterministic for the same input.
//!
//! Non-markdown inputs degrade to a single section: JSON documents are
//! detected by parsing, plain text by the absence of headings. YAML front
//! matter is consulted for a title but never becomes a section of its own.

use serde::{Deserialize, Serialize};

/// A section produced by the parser, before it is assigned ids and
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSection {
    /// Heading text without the `#` markers, or a derived title for
    /// preamble/degraded sections.
    pub header: String,
    /// Heading level on [1..6]. Derived sections use 1.
    pub level: u8,
    /// Body text with the heading line removed, trimmed.
    pub content: String,
    /// Byte range within the raw input (start inclusive, end exclusive).
    pub byte_range: (usize, usize),
}

/// The result of parsing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    /// Title from front matter, a JSON `title` key, or the first heading.
    pub title: Option<String>,
    /// Sections in document order.
    pub sections: Vec<ParsedSection>,
}

/// Parses raw text into sections.
///
/// `fallback_title` names the single degraded section (and the preamble
/// section) when the text itself offers no title; callers typically pass
/// the file name or URL tail.
#[must_use]
pub fn parse_document(raw: &str, fallback_title: &str) -> ParsedDocument {
    // JSON documents degrade to a single section.
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
            let title = value
                .get("title")
                .and_then(serde_json::Value::as_str)
                .map(String::from);
            let header = title.clone().unwrap_or_else(|| fallback_title.to_string());
            return ParsedDocument {
                title,
                sections: vec![ParsedSection {
                    header,
                    level: 1,
                    content: raw.trim().to_string(),
                    byte_range: (0, raw.len()),
                }],
            };
        }
    }

    let (front_title, body_start) = parse_front_matter(raw);
    let headings = find_headings(raw, body_start);

    if headings.is_empty() {
        let header = front_title
            .clone()
            .unwrap_or_else(|| fallback_title.to_string());
        let content = raw[body_start..].trim().to_string();
        return ParsedDocument {
            title: front_title,
            sections: vec![ParsedSection {
                header,
                level: 1,
                content,
                byte_range: (body_start, raw.len()),
            }],
        };
    }

    let title = front_title
        .clone()
        .or_else(|| headings.first().map(|h| h.text.clone()));
    let mut sections = Vec::with_capacity(headings.len() + 1);

    // Preamble between front matter and the first heading becomes its own
    // section when non-empty.
    let preamble = &raw[body_start..headings[0].line_start];
    if !preamble.trim().is_empty() {
        sections.push(ParsedSection {
            header: front_title.unwrap_or_else(|| fallback_title.to_string()),
            level: 1,
            content: preamble.trim().to_string(),
            byte_range: (body_start, headings[0].line_start),
        });
    }

    for (i, heading) in headings.iter().enumerate() {
        let end = headings
            .get(i + 1)
            .map_or(raw.len(), |next| next.line_start);
        let content = raw[heading.line_end..end].trim().to_string();
        sections.push(ParsedSection {
            header: heading.text.clone(),
            level: heading.level,
            content,
            byte_range: (heading.line_start, end),
        });
    }

    ParsedDocument { title, sections }
}

/// A markdown heading located in the raw input.
struct Heading {
    level: u8,
    text: String,
    /// Byte offset of the start of the heading line.
    line_start: usize,
    /// Byte offset just past the heading line (including its newline).
    line_end: usize,
}

/// Parses a leading YAML front matter block, returning its title (if any)
/// and the byte offset where the body begins.
fn parse_front_matter(raw: &str) -> (Option<String>, usize) {
    let mut lines = line_offsets(raw, 0);
    let Some((first_start, first_end)) = lines.next() else {
        return (None, 0);
    };
    if raw[first_start..first_end].trim_end() != "---" || first_start != 0 {
        return (None, 0);
    }

    for (start, end) in lines {
        if raw[start..end].trim_end() == "---" {
            let yaml = &raw[first_end..start];
            let title = serde_yaml_ng::from_str::<serde_yaml_ng::Value>(yaml)
                .ok()
                .and_then(|v| {
                    v.get("title")
                        .and_then(serde_yaml_ng::Value::as_str)
                        .map(String::from)
                });
            return (title, end);
        }
    }
    // Unterminated front matter: treat the whole input as body.
    (None, 0)
}

/// Finds markdown headings outside fenced code blocks, starting at
/// `from` bytes into the input.
fn find_headings(raw: &str, from: usize) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut in_fence = false;

    for (start, end) in line_offsets(raw, from) {
        let line = &raw[start..end];
        let stripped = line.trim_end();

        if stripped.trim_start().starts_with("```") || stripped.trim_start().starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let hashes = stripped.bytes().take_while(|&b| b == b'#').count();
        if (1..=6).contains(&hashes) {
            let rest = &stripped[hashes..];
            if let Some(text) = rest.strip_prefix(' ') {
                let text = text.trim().trim_end_matches('#').trim();
                if !text.is_empty() {
                    let level = u8::try_from(hashes).unwrap_or(6);
                    headings.push(Heading {
                        level,
                        text: text.to_string(),
                        line_start: start,
                        line_end: end,
                    });
                }
            }
        }
    }

    headings
}

/// Iterates over (start, end) byte offsets of lines, where `end` includes
/// the trailing newline when present.
fn line_offsets(raw: &str, from: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut pos = from;
    std::iter::from_fn(move || {
        if pos >= raw.len() {
            return None;
        }
        let start = pos;
        let end = raw[pos..]
            .find('\n')
            .map_or(raw.len(), |offset| pos + offset + 1);
        pos = end;
        Some((start, end))
    })
}
