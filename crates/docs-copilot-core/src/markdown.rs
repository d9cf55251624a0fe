//! Line-level markdown helpers shared by the cleaner and the chunker.
//!
//! Only ATX headings (`#`-prefixed) and fenced code blocks are recognized.
//! Anything inside a fence is opaque: a `# comment` in a shell snippet is
//! not a heading.

/// The marker run of a fence line: three or more backticks or tildes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence {
    pub marker: char,
    pub len: usize,
}

impl Fence {
    /// Parse the fence run at the start of `line`, if any.
    pub fn parse(line: &str) -> Option<Self> {
        let t = line.trim_start();
        let marker = t.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = t.chars().take_while(|&c| c == marker).count();
        if len < 3 {
            return None;
        }
        // A backtick fence's info string cannot contain backticks.
        if marker == '`' && t[len..].contains('`') {
            return None;
        }
        Some(Self { marker, len })
    }

    /// True when `line` closes a block opened by this fence: same marker,
    /// a run at least as long, and nothing after it.
    pub fn closed_by(&self, line: &str) -> bool {
        let t = line.trim();
        match Self::parse(t) {
            Some(close) => {
                close.marker == self.marker
                    && close.len >= self.len
                    && t[close.len..].trim().is_empty()
            }
            None => false,
        }
    }
}

/// True when the line could open or close a fenced code block.
pub fn is_fence_line(line: &str) -> bool {
    Fence::parse(line).is_some()
}

/// Parse an ATX heading line into `(level, title)`.
///
/// Requires 1–6 `#` followed by whitespace and a non-empty title. An
/// optional closing run of `#` separated by whitespace is dropped.
pub fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_end();
    if trimmed.starts_with(char::is_whitespace) {
        return None;
    }
    let level = trimmed.bytes().take_while(|&b| b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut title = rest.trim();
    let without_closing = title.trim_end_matches('#');
    if without_closing.len() < title.len() && without_closing.ends_with(char::is_whitespace) {
        title = without_closing.trim_end();
    }
    if title.is_empty() {
        return None;
    }
    Some((level, title))
}

/// Render a heading line.
pub fn heading_line(level: usize, title: &str) -> String {
    format!("{} {}", "#".repeat(level), title)
}

/// Tracks whether the current line sits inside a fenced code block.
///
/// A block closes only on a fence of the same marker that is at least as
/// long as the opening one, so a three-backtick line inside a
/// four-backtick block is code.
#[derive(Debug, Default)]
pub struct FenceTracker {
    open: Option<Fence>,
}

impl FenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a line; returns true if the line is part of a code block
    /// (fence lines included).
    pub fn observe(&mut self, line: &str) -> bool {
        match self.open {
            Some(fence) => {
                if fence.closed_by(line) {
                    self.open = None;
                }
                true
            }
            None => {
                self.open = Fence::parse(line);
                self.open.is_some()
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}
