//! Rule-based markdown cleanup.
//!
//! [`clean_markdown`] is a pure, total function: every pass is a
//! `&str -> String` transformation applied in sequence, and none of them
//! can fail. Fenced code blocks are left untouched apart from receiving an
//! inferred language label.
//!
//! # Passes
//!
//! 1. `<br>` variants become newlines.
//! 2. Admonition `<div>`s become `> **Note**: …` blockquotes.
//! 3. `<a href>` links become markdown links.
//! 4. Leftover layout tags (`div`, `span`, `p`, table tags) are stripped,
//!    their content kept.
//! 5. Heading hierarchy is normalized (see [`normalize_headings`]).
//! 6. Unlabelled code fences get an inferred language.
//! 7. Whitespace is normalized.
//!
//! Artifacts the rules cannot fix (unknown tags, ragged tables, garbled
//! list bullets) are counted by [`artifact_count`] so the caller can decide
//! whether to hand the text to a text-generation capability.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::markdown::{heading_line, parse_heading, Fence, FenceTracker};

/// Counts of each kind of change made by [`clean_markdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningStats {
    pub html_tags_removed: usize,
    pub admonitions_converted: usize,
    pub links_converted: usize,
    pub headings_normalized: usize,
    pub code_blocks_labeled: usize,
}

/// Output of the rule-based cleaner.
#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub text: String,
    pub stats: CleaningStats,
}

/// System prompt for delegated cleanup.
pub const CLEANUP_SYSTEM_PROMPT: &str = "You are a documentation formatting assistant. \
Your task is to clean up badly formatted markdown while preserving all information. \
Only output the cleaned markdown, nothing else.";

/// Build the delegated-cleanup prompt for a document.
pub fn cleanup_prompt(text: &str) -> String {
    format!(
        "Clean up this markdown document. Fix formatting issues like:\n\
         - Broken tables\n\
         - Malformed lists\n\
         - Inconsistent heading levels\n\
         - Garbled text from HTML conversion\n\n\
         Document to clean:\n\
         ````markdown\n{}\n````\n\n\
         Output only the cleaned markdown:",
        text.trim_end()
    )
}

static BR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));

static ADMONITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]*class=["']?[^"'>]*\badmonition\b[^>]*>(.*?)</div>"#)
        .expect("valid regex")
});

static ADMONITION_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)class=["'][^"']*\b(note|warning|tip|important|caution|danger)\b"#)
        .expect("valid regex")
});

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s+href=["']([^"']+)["'][^>]*>(.*?)</a>"#).expect("valid regex")
});

static LAYOUT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:div|span|p|table|tr|td|th|thead|tbody)\b[^>]*>").expect("valid regex")
});

static ANY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]*)?/?>").expect("valid regex")
});

/// Run the full rule-based pipeline.
///
/// `declared_title` is the front-matter title, if any; when present the
/// document is guaranteed a single top-level heading.
pub fn clean_markdown(raw: &str, declared_title: Option<&str>) -> CleanOutput {
    let mut stats = CleaningStats::default();

    let normalized_newlines = raw.replace("\r\n", "\n");
    let mut text = map_prose(&normalized_newlines, |prose| {
        let s = remove_br_tags(prose, &mut stats);
        let s = convert_admonitions(&s, &mut stats);
        let s = convert_links(&s, &mut stats);
        remove_layout_tags(&s, &mut stats)
    });
    text = normalize_headings(&text, declared_title, &mut stats);
    text = label_code_blocks(&text, &mut stats);
    text = normalize_whitespace(&text);

    tracing::debug!(
        html_removed = stats.html_tags_removed,
        admonitions = stats.admonitions_converted,
        links = stats.links_converted,
        headings = stats.headings_normalized,
        code_blocks = stats.code_blocks_labeled,
        "cleaned document"
    );

    CleanOutput { text, stats }
}

/// Apply `f` to every run of lines outside fenced code blocks.
fn map_prose<F>(text: &str, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut pieces: Vec<String> = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut code: Vec<&str> = Vec::new();
    let mut fences = FenceTracker::new();

    for line in text.split('\n') {
        if fences.observe(line) {
            if !prose.is_empty() {
                pieces.push(f(&prose.join("\n")));
                prose.clear();
            }
            code.push(line);
            if !fences.is_open() {
                pieces.push(code.join("\n"));
                code.clear();
            }
        } else {
            prose.push(line);
        }
    }
    if !code.is_empty() {
        pieces.push(code.join("\n"));
    }
    if !prose.is_empty() {
        pieces.push(f(&prose.join("\n")));
    }

    pieces.join("\n")
}

fn remove_br_tags(text: &str, stats: &mut CleaningStats) -> String {
    stats.html_tags_removed += BR_RE.find_iter(text).count();
    BR_RE.replace_all(text, "\n").into_owned()
}

fn convert_admonitions(text: &str, stats: &mut CleaningStats) -> String {
    ADMONITION_RE
        .replace_all(text, |caps: &Captures| {
            stats.admonitions_converted += 1;
            let kind = ADMONITION_TYPE_RE
                .captures(&caps[0])
                .map(|c| capitalize(&c[1]))
                .unwrap_or_else(|| "Note".to_string());
            let inner = caps[1].trim();
            let mut lines = inner.lines();
            let first = lines.next().unwrap_or_default().trim();
            let mut out = format!("> **{}**: {}", kind, first);
            for line in lines {
                out.push_str("\n> ");
                out.push_str(line.trim());
            }
            out
        })
        .into_owned()
}

fn convert_links(text: &str, stats: &mut CleaningStats) -> String {
    LINK_RE
        .replace_all(text, |caps: &Captures| {
            stats.links_converted += 1;
            format!("[{}]({})", caps[2].trim(), &caps[1])
        })
        .into_owned()
}

fn remove_layout_tags(text: &str, stats: &mut CleaningStats) -> String {
    stats.html_tags_removed += LAYOUT_TAG_RE.find_iter(text).count();
    LAYOUT_TAG_RE.replace_all(text, "").into_owned()
}

/// Normalize the heading hierarchy.
///
/// - With a declared title the document has exactly one H1: `# title` is
///   inserted when no H1 exists, and every H1 after the first is demoted
///   to H2.
/// - A heading never sits more than one level below the previous heading
///   (an H4 directly under an H2 becomes an H3). Levels are tracked on the
///   normalized values, so a run of skipped levels is compressed.
pub fn normalize_headings(
    text: &str,
    declared_title: Option<&str>,
    stats: &mut CleaningStats,
) -> String {
    let has_h1 = {
        let mut fences = FenceTracker::new();
        text.split('\n')
            .any(|line| !fences.observe(line) && matches!(parse_heading(line), Some((1, _))))
    };

    let insert_title = declared_title
        .map(str::trim)
        .filter(|t| !t.is_empty() && !has_h1);

    let mut out: Vec<String> = Vec::new();
    let mut last_level = 0usize;
    let mut seen_h1 = false;

    if let Some(title) = insert_title {
        out.push(heading_line(1, title));
        out.push(String::new());
        last_level = 1;
        seen_h1 = true;
        stats.headings_normalized += 1;
    }

    let mut fences = FenceTracker::new();
    for line in text.split('\n') {
        if fences.observe(line) {
            out.push(line.to_string());
            continue;
        }
        let Some((level, title)) = parse_heading(line) else {
            out.push(line.to_string());
            continue;
        };

        let mut new_level = level;
        if declared_title.is_some() && new_level == 1 {
            if seen_h1 {
                new_level = 2;
            }
            seen_h1 = true;
        }
        if last_level > 0 && new_level > last_level + 1 {
            new_level = last_level + 1;
        }
        last_level = new_level;

        if new_level != level {
            stats.headings_normalized += 1;
            out.push(heading_line(new_level, title));
        } else {
            out.push(line.to_string());
        }
    }

    out.join("\n")
}

/// Add an inferred language to code fences that have none.
fn label_code_blocks(text: &str, stats: &mut CleaningStats) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let Some(fence) = Fence::parse(line) else {
            out.push(line.to_string());
            i += 1;
            continue;
        };

        let close = (i + 1..lines.len()).find(|&j| fence.closed_by(lines[j]));
        let end = close.unwrap_or(lines.len());
        let trimmed = line.trim();
        let bare = trimmed.trim_start_matches(fence.marker).is_empty();

        let opening = if bare {
            let code = lines[i + 1..end].join("\n");
            match infer_code_language(&code) {
                Some(lang) => {
                    stats.code_blocks_labeled += 1;
                    format!("{}{}", line.trim_end(), lang)
                }
                None => line.to_string(),
            }
        } else {
            line.to_string()
        };

        out.push(opening);
        out.extend(lines[i + 1..end].iter().map(|l| l.to_string()));
        if let Some(c) = close {
            out.push(lines[c].to_string());
        }
        i = end + 1;
    }

    out.join("\n")
}

/// Infer a code block's language from its content.
pub fn infer_code_language(code: &str) -> Option<&'static str> {
    let lower = code.to_lowercase();
    let command_lines = lower
        .lines()
        .map(|l| l.trim_start().trim_start_matches("$ ").trim_start());

    let mut kube = lower.contains("kubectl") || lower.contains("openshift");
    if !kube {
        kube = command_lines.clone().any(|l| l.starts_with("oc "));
    }
    if kube {
        return Some("bash");
    }

    const YAML_KEYS: [&str; 4] = ["apiVersion:", "kind:", "metadata:", "spec:"];
    if YAML_KEYS.iter().any(|k| code.contains(k)) {
        return Some("yaml");
    }

    let trimmed = code.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some("json");
    }

    const SHELL_PREFIXES: [&str; 6] = ["sudo ", "apt ", "apt-get ", "yum ", "dnf ", "brew "];
    if lower.contains("#!/")
        || lower.lines().any(|l| l.trim_start().starts_with("$ "))
        || command_lines.clone().any(|l| SHELL_PREFIXES.iter().any(|p| l.starts_with(p)))
    {
        return Some("bash");
    }

    None
}

/// Trim trailing whitespace, collapse blank-line runs outside code to at
/// most two, and end with exactly one newline.
fn normalize_whitespace(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;
    let mut fences = FenceTracker::new();

    for line in text.split('\n') {
        let line = line.trim_end();
        let in_code = fences.observe(line);
        if line.is_empty() && !in_code {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }

    let joined = out.join("\n");
    let trimmed = joined.trim_matches('\n');
    if trimmed.trim().is_empty() {
        return String::new();
    }
    format!("{}\n", trimmed)
}

/// Count residual formatting artifacts outside code blocks: HTML tags,
/// table rows whose cell count disagrees with the table header, and
/// garbled list bullets.
pub fn artifact_count(text: &str) -> usize {
    let mut count = 0usize;
    let mut fences = FenceTracker::new();
    let mut table_width: Option<usize> = None;

    for line in text.split('\n') {
        if fences.observe(line) {
            table_width = None;
            continue;
        }

        count += ANY_TAG_RE.find_iter(line).count();

        let t = line.trim();
        if t.starts_with('|') {
            let cells = t.trim_matches('|').split('|').count();
            match table_width {
                None => table_width = Some(cells),
                Some(w) if w != cells => count += 1,
                Some(_) => {}
            }
        } else {
            table_width = None;
        }

        if t.starts_with('•') || t.starts_with('·') || t.starts_with('▪') {
            count += 1;
        } else if let Some(rest) = t.strip_prefix('-') {
            if rest.starts_with(|c: char| c.is_alphabetic()) {
                count += 1;
            }
        }
    }

    count
}

/// True when the artifact count reaches `threshold` (a zero threshold
/// disables delegation).
pub fn needs_delegated_cleanup(text: &str, threshold: usize) -> bool {
    threshold > 0 && artifact_count(text) >= threshold
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(raw: &str) -> String {
        clean_markdown(raw, None).text
    }

    #[test]
    fn br_tags_become_newlines() {
        let out = clean_markdown("line one<br>line two<BR />line three", None);
        assert_eq!(out.text, "line one\nline two\nline three\n");
        assert_eq!(out.stats.html_tags_removed, 2);
    }

    #[test]
    fn admonition_becomes_blockquote() {
        let raw = "<div class=\"admonition warning\">\nDo not restart etcd.\nWait first.\n</div>";
        let out = clean_markdown(raw, None);
        assert!(out.text.contains("> **Warning**: Do not restart etcd."));
        assert!(out.text.contains("> Wait first."));
        assert_eq!(out.stats.admonitions_converted, 1);
    }

    #[test]
    fn html_links_become_markdown() {
        let out = clean_markdown(r#"See <a href="https://example.com/x">the guide</a>."#, None);
        assert_eq!(out.text, "See [the guide](https://example.com/x).\n");
        assert_eq!(out.stats.links_converted, 1);
    }

    #[test]
    fn layout_tags_are_stripped_but_pre_is_not_mistaken_for_p() {
        let out = clean("<div><span>kept</span></div> <pre>x</pre>");
        assert!(out.contains("kept"));
        assert!(!out.contains("<div>"));
        assert!(out.contains("<pre>x</pre>"));
    }

    #[test]
    fn code_blocks_are_not_touched() {
        let raw = "```html\n<div>raw</div>\n# not a heading\n```\n";
        let out = clean(raw);
        assert!(out.contains("<div>raw</div>"));
        assert!(out.contains("# not a heading"));
    }

    #[test]
    fn skipped_heading_level_is_pulled_up_one() {
        let out = clean("# Guide\n\n## Setup\n\n#### Details\n\ntext");
        assert!(out.contains("\n### Details\n"));
    }

    #[test]
    fn skip_run_is_compressed_on_normalized_levels() {
        let out = clean("# A\n\n#### B\n\n###### C");
        assert!(out.contains("## B"));
        assert!(out.contains("### C"));
    }

    #[test]
    fn declared_title_inserts_single_h1() {
        let out = clean_markdown("## Intro\n\nbody", Some("Runbook"));
        assert!(out.text.starts_with("# Runbook\n\n## Intro"));
    }

    #[test]
    fn declared_title_demotes_extra_h1() {
        let out = clean_markdown("# One\n\ntext\n\n# Two\n\nmore", Some("One"));
        assert!(out.text.contains("# One"));
        assert!(out.text.contains("## Two"));
        assert_eq!(out.text.matches("\n# ").count() + out.text.starts_with("# ") as usize, 1);
    }

    #[test]
    fn without_declared_title_multiple_h1_are_kept() {
        let out = clean("# One\n\n# Two");
        assert!(out.contains("# Two"));
        assert!(!out.contains("## Two"));
    }

    #[test]
    fn unlabelled_fences_get_languages() {
        let out = clean("```\nkubectl get pods\n```\n\n```\napiVersion: v1\nkind: Pod\n```\n\n```\n{\"a\": 1}\n```");
        assert!(out.contains("```bash\nkubectl get pods"));
        assert!(out.contains("```yaml\napiVersion"));
        assert!(out.contains("```json\n{"));
    }

    #[test]
    fn labelled_fences_are_kept() {
        let out = clean("```python\nprint('x')\n```");
        assert!(out.starts_with("```python\n"));
    }

    #[test]
    fn whitespace_is_normalized() {
        let out = clean("a   \n\n\n\n\nb\t\n");
        assert_eq!(out, "a\n\n\nb\n");
    }

    #[test]
    fn cleaning_is_deterministic_and_idempotent() {
        let raw = "# T\n\n<div>x</div><br>\n\n#### deep\n\n```\nsudo reboot\n```\n";
        let once = clean(raw);
        assert_eq!(once, clean(raw));
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn empty_input_cleans_to_empty() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("\n\n   \n"), "");
    }

    #[test]
    fn artifacts_are_counted() {
        assert_eq!(artifact_count("clean text\n\n- item\n"), 0);
        let messy = "<font>x</font>\n• bullet\n-broken\n| a | b |\n|---|---|\n| 1 | 2 | 3 |\n";
        assert_eq!(artifact_count(messy), 5);
        assert!(needs_delegated_cleanup(messy, 3));
        assert!(!needs_delegated_cleanup(messy, 0));
    }

    #[test]
    fn artifacts_inside_code_are_ignored() {
        assert_eq!(artifact_count("```\n<b>x</b>\n```\n"), 0);
    }
}
