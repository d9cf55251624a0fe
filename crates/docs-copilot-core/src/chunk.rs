//! Heading-aware markdown chunker.
//!
//! Splits a cleaned document into [`Chunk`]s that never span an H2 or H3
//! boundary. Each chunk carries the heading path leading to it, so a
//! retrieved chunk can be located in its document without the rest of
//! the text.
//!
//! # Algorithm
//!
//! 1. Walk the lines, ignoring anything inside fenced code blocks.
//! 2. An H1 sets the title context and resets H2/H3. Its own line is not
//!    chunk text.
//! 3. Every H2 and H3 starts a new section whose text begins with the
//!    heading line. H4–H6 are ordinary body text.
//! 4. Text before the first H2 forms a section under the title only when
//!    it is non-empty.
//! 5. A section longer than `max_tokens × 4` characters is split into
//!    blocks (paragraphs, with fenced code kept whole) and the blocks are
//!    packed greedily. A plain paragraph longer than the limit is
//!    hard-split at the last newline or space before it.
//! 6. A trailing piece shorter than `min_tokens × 4` characters is merged
//!    into the piece before it.
//!
//! # Example
//!
//! ```rust
//! use docs_copilot_core::chunk::{chunk_markdown, ChunkingOptions};
//! use docs_copilot_core::models::SourceRef;
//!
//! let source = SourceRef {
//!     path: "/docs/guide.md".into(),
//!     title: "Guide".into(),
//!     category: "general".into(),
//!     tags: vec![],
//! };
//! let text = "# Guide\n\n## Install\n\nRun the installer.\n\n## Upgrade\n\nRun it again.\n";
//! let chunks = chunk_markdown(&source, text, &ChunkingOptions::default());
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].breadcrumb(), "Guide > Upgrade");
//! ```

use serde::Deserialize;

use crate::markdown::{is_fence_line, parse_heading, FenceTracker};
use crate::models::{chunk_id, sha256_hex, Chunk, SourceRef};

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Size limits for the chunker, in approximate tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingOptions {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
}

fn default_max_tokens() -> usize {
    1000
}

fn default_min_tokens() -> usize {
    100
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            min_tokens: default_min_tokens(),
        }
    }
}

impl ChunkingOptions {
    fn max_chars(&self) -> usize {
        (self.max_tokens * CHARS_PER_TOKEN).max(1)
    }

    fn min_chars(&self) -> usize {
        self.min_tokens * CHARS_PER_TOKEN
    }
}

/// A run of lines sharing one heading path.
struct Section {
    heading_path: Vec<String>,
    lines: Vec<String>,
    /// Preamble sections are dropped when they hold no text.
    preamble: bool,
}

impl Section {
    fn text(&self) -> String {
        self.lines.join("\n").trim().to_string()
    }
}

/// Split a cleaned markdown document into heading-scoped chunks.
///
/// Ordinals are contiguous from 0 and ids are derived from
/// `source.path` and the ordinal, so the same input and options always
/// produce identical chunks. A document with no text yields no chunks.
pub fn chunk_markdown(source: &SourceRef, cleaned: &str, opts: &ChunkingOptions) -> Vec<Chunk> {
    let sections = split_sections(&source.title, cleaned);

    let mut chunks = Vec::new();
    for section in sections {
        let text = section.text();
        if text.is_empty() {
            continue;
        }
        for piece in split_section(&text, opts) {
            let ordinal = chunks.len();
            chunks.push(Chunk {
                id: chunk_id(&source.path, ordinal),
                document_path: source.path.clone(),
                ordinal,
                heading_path: section.heading_path.clone(),
                hash: sha256_hex(&piece),
                text: piece,
            });
        }
    }
    chunks
}

fn split_sections(doc_title: &str, text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut h1: Option<String> = None;
    let mut h2: Option<String> = None;
    let mut current = Section {
        heading_path: vec![doc_title.to_string()],
        lines: Vec::new(),
        preamble: true,
    };
    let mut fences = FenceTracker::new();

    for line in text.lines() {
        if fences.observe(line) {
            current.lines.push(line.to_string());
            continue;
        }
        let heading = parse_heading(line).filter(|(level, _)| *level <= 3);
        let Some((level, title)) = heading else {
            current.lines.push(line.to_string());
            continue;
        };

        let title_ctx = h1.clone().unwrap_or_else(|| doc_title.to_string());
        let next = match level {
            1 => {
                h1 = Some(title.to_string());
                h2 = None;
                Section {
                    heading_path: vec![title.to_string()],
                    lines: Vec::new(),
                    preamble: true,
                }
            }
            2 => {
                h2 = Some(title.to_string());
                Section {
                    heading_path: vec![title_ctx, title.to_string()],
                    lines: vec![line.to_string()],
                    preamble: false,
                }
            }
            _ => {
                let mut path = vec![title_ctx];
                path.extend(h2.clone());
                path.push(title.to_string());
                Section {
                    heading_path: path,
                    lines: vec![line.to_string()],
                    preamble: false,
                }
            }
        };
        push_section(&mut sections, std::mem::replace(&mut current, next));
    }
    push_section(&mut sections, current);
    sections
}

fn push_section(sections: &mut Vec<Section>, section: Section) {
    if section.preamble && section.text().is_empty() {
        return;
    }
    sections.push(section);
}

/// Split one section's text into pieces that respect the size limits.
fn split_section(text: &str, opts: &ChunkingOptions) -> Vec<String> {
    let max_chars = opts.max_chars();
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for block in blocks(text) {
        let would_be = if buf.is_empty() {
            block.len()
        } else {
            buf.len() + 2 + block.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if block.len() > max_chars {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            if is_fence_line(block.lines().next().unwrap_or_default()) {
                pieces.push(block);
            } else {
                pieces.extend(hard_split(&block, max_chars));
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(&block);
        }
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    if pieces.len() > 1 {
        let last_len = pieces.last().map(|p| p.len()).unwrap_or_default();
        if last_len < opts.min_chars() {
            if let Some(tail) = pieces.pop() {
                if let Some(prev) = pieces.last_mut() {
                    prev.push_str("\n\n");
                    prev.push_str(&tail);
                }
            }
        }
    }

    pieces
}

/// Paragraph blocks separated by blank lines. A fenced code block is a
/// single block even when it contains blank lines.
fn blocks(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut fences = FenceTracker::new();

    for line in text.lines() {
        let was_open = fences.is_open();
        let in_code = fences.observe(line);
        let opens_fence = in_code && !was_open;

        if opens_fence && !current.is_empty() {
            out.push(current.join("\n"));
            current.clear();
        }
        if !in_code && line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        current.push(line);
        if in_code && was_open && !fences.is_open() {
            out.push(current.join("\n"));
            current.clear();
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }

    out.into_iter()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .collect()
}

/// Hard-split an oversized paragraph at newline or space boundaries.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let split_at = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if split_at == 0 {
            next_char_boundary(remaining)
        } else {
            split_at
        };
        let actual_split = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(split_at)
        } else {
            split_at
        };
        let actual_split = snap_to_char_boundary(remaining, actual_split);
        let actual_split = if actual_split == 0 {
            next_char_boundary(remaining)
        } else {
            actual_split
        };

        let piece = remaining[..actual_split].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[actual_split..];
    }
    pieces
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_char_boundary(s: &str) -> usize {
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}
