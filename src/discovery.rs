//! Markdown discovery and parsing.
//!
//! [`discover`] walks a documentation root and lazily yields markdown file
//! paths in a deterministic (file-name sorted) order. [`parse_file`] reads
//! one file and hands it to the pure [`parse_markdown`], which splits off
//! YAML front-matter and derives title, tags and category.
//!
//! # Exclusions
//!
//! `.git`, `node_modules` and `target` directories are always skipped, in
//! addition to the configured `exclude_globs`. Globs match paths relative
//! to the root.

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use docs_copilot_core::markdown::{parse_heading, FenceTracker};
use docs_copilot_core::models::Document;
use docs_copilot_core::{Error, Result};

use crate::config::DocsConfig;

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/node_modules/**", "**/target/**"];

/// Path components that imply a category, checked in order.
const CATEGORY_PATTERNS: [(&str, &[&str]); 6] = [
    ("runbook", &["runbook", "runbooks", "playbook", "playbooks"]),
    ("architecture", &["architecture", "design", "arch"]),
    ("troubleshooting", &["troubleshoot", "troubleshooting", "debug"]),
    ("howto", &["howto", "how-to", "guide", "guides", "tutorial"]),
    ("reference", &["reference", "ref", "api"]),
    ("onboarding", &["onboarding", "onboard", "getting-started"]),
];

pub const DEFAULT_CATEGORY: &str = "general";

/// Lazy iterator over the markdown files under a root.
///
/// Walk errors (unreadable directories, broken links) are yielded as
/// `Err` items; iteration continues past them.
pub struct Discovery {
    root: PathBuf,
    walker: walkdir::IntoIter,
    include: GlobSet,
    exclude: GlobSet,
}

impl Discovery {
    /// The canonical root being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Iterator for Discovery {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    return Some(Err(Error::io(path, std::io::Error::from(e))));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            // Apply exclude patterns
            if self.exclude.is_match(&rel_str) {
                continue;
            }

            // Apply include patterns
            if !self.include.is_match(&rel_str) {
                continue;
            }

            return Some(Ok(path.to_path_buf()));
        }
    }
}

/// Start discovering markdown files under `root`.
///
/// A missing root is a configuration error. Discovery restarts from
/// scratch on every call and yields the same sequence for an unchanged
/// tree.
pub fn discover(root: &Path, config: &DocsConfig) -> Result<Discovery> {
    if !root.exists() {
        return Err(Error::config(format!(
            "docs root does not exist: {}",
            root.display()
        )));
    }
    let root = std::fs::canonicalize(root).map_err(|e| Error::io(root, e))?;

    let include = build_globset(&config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude = build_globset(&excludes)?;

    let walker = WalkDir::new(&root)
        .follow_links(config.follow_symlinks)
        .sort_by_file_name()
        .into_iter();

    Ok(Discovery {
        root,
        walker,
        include,
        exclude,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("invalid glob set: {}", e)))
}

/// Read and parse one markdown file.
///
/// Any read failure, including invalid UTF-8, is reported as
/// [`Error::Parse`] for this path.
pub async fn parse_file(path: &Path) -> Result<Document> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::parse(path, e.to_string()))?;
    let raw = String::from_utf8(bytes).map_err(|_| Error::parse(path, "file is not valid UTF-8"))?;

    let modified = tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(parse_markdown(path, &raw, modified))
}

/// Parse markdown text into a [`Document`]. Never fails: malformed
/// front-matter degrades to empty metadata.
pub fn parse_markdown(path: &Path, raw: &str, modified: DateTime<Utc>) -> Document {
    let (front_matter, body) = split_front_matter(raw);

    let metadata = match front_matter {
        Some(block) => match parse_front_matter(block) {
            Ok(value) => value,
            Err(message) => {
                tracing::warn!(path = %path.display(), error = %message, "ignoring malformed front-matter");
                serde_json::json!({})
            }
        },
        None => serde_json::json!({}),
    };

    let declared_title = metadata
        .get("title")
        .and_then(scalar_string)
        .filter(|t| !t.is_empty());
    let title_declared = declared_title.is_some();
    let title = declared_title
        .or_else(|| first_h1(body))
        .unwrap_or_else(|| title_from_file_name(path));

    let tags = metadata.get("tags").map(parse_tags).unwrap_or_default();

    let category = metadata
        .get("category")
        .and_then(scalar_string)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| infer_category(path));

    Document {
        path: path.to_path_buf(),
        title,
        category,
        tags,
        title_declared,
        metadata,
        body: body.to_string(),
        modified_at: modified,
    }
}

/// Split a leading `---` front-matter block from the body.
///
/// Returns `(None, raw)` when the text does not open with `---` or the
/// block is never closed.
pub fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let Some(first_newline) = text.find('\n') else {
        return (None, raw);
    };
    if text[..first_newline].trim_end() != "---" {
        return (None, raw);
    }

    let block_start = first_newline + 1;
    let mut offset = block_start;
    for line in text[block_start..].split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let block = &text[block_start..offset];
            let body = &text[offset + line.len()..];
            return (Some(block), body);
        }
        offset += line.len();
    }
    (None, raw)
}

fn parse_front_matter(block: &str) -> std::result::Result<serde_json::Value, String> {
    if block.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(block).map_err(|e| e.to_string())?;
    let json = serde_json::to_value(yaml).map_err(|e| e.to_string())?;
    match json {
        serde_json::Value::Object(_) => Ok(json),
        serde_json::Value::Null => Ok(serde_json::json!({})),
        _ => Err("front-matter is not a mapping".to_string()),
    }
}

fn scalar_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tags from a YAML list or a comma-separated string.
fn parse_tags(value: &serde_json::Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        serde_json::Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        serde_json::Value::String(s) => s.split(',').map(|t| t.trim().to_string()).collect(),
        other => scalar_string(other).into_iter().collect(),
    };
    raw.into_iter().filter(|t| !t.is_empty()).collect()
}

fn first_h1(body: &str) -> Option<String> {
    let mut fences = FenceTracker::new();
    body.lines()
        .filter(|line| !fences.observe(line))
        .find_map(|line| match parse_heading(line) {
            Some((1, title)) => Some(title.to_string()),
            _ => None,
        })
}

/// `pod-restart_guide.md` becomes `Pod Restart Guide`.
fn title_from_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.replace(['-', '_'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Infer a category from the path's directory names and file stem.
pub fn infer_category(path: &Path) -> String {
    let mut words: Vec<String> = Vec::new();
    let components = path.parent().into_iter().flat_map(|p| p.components());
    for component in components {
        words.push(component.as_os_str().to_string_lossy().to_lowercase());
    }
    if let Some(stem) = path.file_stem() {
        words.push(stem.to_string_lossy().to_lowercase());
    }
    let split: Vec<String> = words
        .iter()
        .flat_map(|w| w.split(['-', '_', ' ', '.']).map(str::to_string).collect::<Vec<_>>())
        .collect();

    for (category, patterns) in CATEGORY_PATTERNS {
        let hit = patterns
            .iter()
            .any(|p| words.iter().any(|w| w == p) || split.iter().any(|w| w == p));
        if hit {
            return category.to_string();
        }
    }
    DEFAULT_CATEGORY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn front_matter_drives_metadata() {
        let raw = "---\ntitle: Restart Pods\ncategory: runbook\ntags: [k8s, pods]\n---\n# Other\n\nBody.\n";
        let doc = parse_markdown(Path::new("/docs/x.md"), raw, now());
        assert_eq!(doc.title, "Restart Pods");
        assert!(doc.title_declared);
        assert_eq!(doc.category, "runbook");
        assert_eq!(doc.tags, vec!["k8s", "pods"]);
        assert_eq!(doc.body, "# Other\n\nBody.\n");
        assert_eq!(doc.metadata["title"], "Restart Pods");
    }

    #[test]
    fn comma_separated_tags() {
        let raw = "---\ntags: \"etcd, backup ,\"\n---\nbody";
        let doc = parse_markdown(Path::new("/docs/x.md"), raw, now());
        assert_eq!(doc.tags, vec!["etcd", "backup"]);
    }

    #[test]
    fn title_falls_back_to_h1_then_file_name() {
        let doc = parse_markdown(Path::new("/d/a.md"), "```\n# not this\n```\n# Real Title\n", now());
        assert_eq!(doc.title, "Real Title");
        assert!(!doc.title_declared);

        let doc = parse_markdown(Path::new("/d/pod-restart_guide.md"), "no headings", now());
        assert_eq!(doc.title, "Pod Restart Guide");
    }

    #[test]
    fn malformed_front_matter_is_stripped_and_ignored() {
        let raw = "---\ntitle: [unclosed\n---\n# Heading\n\ntext\n";
        let doc = parse_markdown(Path::new("/d/a.md"), raw, now());
        assert_eq!(doc.metadata, serde_json::json!({}));
        assert_eq!(doc.title, "Heading");
        assert!(doc.body.starts_with("# Heading"));
    }

    #[test]
    fn unclosed_front_matter_is_body() {
        let raw = "---\ntitle: x\n\n# Heading\n";
        let (fm, body) = split_front_matter(raw);
        assert!(fm.is_none());
        assert_eq!(body, raw);
    }

    #[test]
    fn category_inference() {
        assert_eq!(infer_category(Path::new("/srv/docs/runbooks/restart.md")), "runbook");
        assert_eq!(infer_category(Path::new("/srv/docs/getting-started/intro.md")), "onboarding");
        assert_eq!(infer_category(Path::new("/srv/docs/how-to/backup.md")), "howto");
        assert_eq!(infer_category(Path::new("/srv/docs/etcd-troubleshooting.md")), "troubleshooting");
        assert_eq!(infer_category(Path::new("/srv/docs/prefs/notes.md")), "general");
    }

    #[test]
    fn discovery_is_sorted_filtered_and_restartable() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join("drafts")).unwrap();
        fs::write(root.join("z.md"), "z").unwrap();
        fs::write(root.join("a.markdown"), "a").unwrap();
        fs::write(root.join("b/c.md"), "c").unwrap();
        fs::write(root.join("b/notes.txt"), "txt").unwrap();
        fs::write(root.join("node_modules/pkg/readme.md"), "x").unwrap();
        fs::write(root.join("drafts/wip.md"), "x").unwrap();

        let config = DocsConfig {
            exclude_globs: vec!["drafts/**".into()],
            ..DocsConfig::default()
        };
        let collect = || -> Vec<String> {
            let discovery = discover(root, &config).unwrap();
            let base = discovery.root().to_path_buf();
            discovery
                .map(|p| {
                    p.unwrap()
                        .strip_prefix(&base)
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/")
                })
                .collect()
        };
        let first = collect();
        assert_eq!(first, vec!["a.markdown", "b/c.md", "z.md"]);
        assert_eq!(first, collect());
    }

    #[test]
    fn missing_root_is_config_error() {
        let err = discover(Path::new("/definitely/not/here"), &DocsConfig::default()).err();
        assert!(matches!(err, Some(Error::Config(_))));
    }

    #[tokio::test]
    async fn parse_file_reports_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.md");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let err = parse_file(&path).await.unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
