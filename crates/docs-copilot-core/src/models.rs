//! Core data models used throughout Docs Copilot.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and query pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for deterministic chunk identifiers.
const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d1c_4f0e_93a2_4b57_8e0d_2f61_c0a4_b9e3);

/// A markdown document as produced by discovery and parsing.
///
/// The body has its front-matter block removed but is otherwise raw;
/// cleaning happens later in the pipeline.
#[derive(Debug, Clone)]
pub struct Document {
    /// Absolute path, the document's identity.
    pub path: PathBuf,
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    /// Whether `title` came from front-matter (drives heading normalization).
    pub title_declared: bool,
    /// Front-matter as a JSON object (`{}` when absent or malformed).
    pub metadata: serde_json::Value,
    pub body: String,
    pub modified_at: DateTime<Utc>,
}

impl Document {
    /// Path as the string key used by the store and chunk identifiers.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            path: self.key(),
            title: self.title.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Denormalized reference to a chunk's source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub path: String,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A retrievable unit of document text with its heading context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id derived from document path and ordinal.
    pub id: String,
    pub document_path: String,
    /// 0-based position within the document.
    pub ordinal: usize,
    /// Ancestor headings from H1 down to the chunk's own heading.
    pub heading_path: Vec<String>,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Chunk {
    /// Heading path rendered as `A > B > C`.
    pub fn breadcrumb(&self) -> String {
        self.heading_path.join(" > ")
    }

    /// Text handed to the embedding capability: the heading context is
    /// rendered before the body so position in the document is part of
    /// the vector.
    pub fn embedding_text(&self) -> String {
        let crumb = self.breadcrumb();
        if crumb.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", crumb, self.text)
        }
    }
}

/// A chunk paired with its vector and source, ready to be stored.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub source: SourceRef,
    pub vector: Vec<f32>,
}

/// What the store remembers about an ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentState {
    pub path: String,
    pub title: String,
    pub category: String,
    pub fingerprint: String,
    pub chunk_count: usize,
    pub modified_at: i64,
}

/// Document-level record written alongside its chunks.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub source: SourceRef,
    pub fingerprint: String,
    pub metadata: serde_json::Value,
    pub modified_at: i64,
}

/// A retrieved chunk (or run of adjacent chunks) with its ranking score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    /// Id of the best-ranked chunk in this entry.
    pub chunk_id: String,
    pub source: SourceRef,
    pub heading_path: Vec<String>,
    pub text: String,
    /// Ordinals covered, ascending. More than one after an adjacent merge.
    pub ordinals: Vec<usize>,
    /// Cosine distance (`1 - similarity`), lower is better.
    pub distance: f32,
}

impl RetrievedChunk {
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }

    pub fn breadcrumb(&self) -> String {
        self.heading_path.join(" > ")
    }
}

/// A source cited by an [`Answer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub path: String,
    pub title: String,
    /// Chunk ordinals from this document that were placed in the prompt.
    pub ordinals: Vec<usize>,
}

/// A generated answer with its citations.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub text: String,
    pub citations: Vec<Citation>,
    /// Generation model, or `None` when no generation call was made.
    pub model: Option<String>,
}

impl Answer {
    /// True when the answer is the fixed "nothing found" response.
    pub fn is_not_found(&self) -> bool {
        self.citations.is_empty() && self.model.is_none()
    }
}

/// Entry returned by `list_sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    pub path: String,
    pub title: String,
    pub category: String,
    pub chunk_count: usize,
}

/// The (model, dims) pair a store's vectors were produced with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddingSpace {
    pub model: String,
    pub dims: usize,
}

/// Summary of a store's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub documents: usize,
    pub chunks: usize,
    pub space: Option<EmbeddingSpace>,
}

/// Deterministic chunk id: UUIDv5 over `path` and `ordinal`.
///
/// Re-ingesting an unchanged document yields identical ids.
pub fn chunk_id(document_path: &str, ordinal: usize) -> String {
    let name = format!("{}\u{0}{}", document_path, ordinal);
    Uuid::new_v5(&CHUNK_ID_NAMESPACE, name.as_bytes()).to_string()
}

/// SHA-256 hex digest of a text.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content fingerprint of a document's cleaned body.
pub fn fingerprint(cleaned_body: &str) -> String {
    sha256_hex(cleaned_body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_deterministic() {
        assert_eq!(chunk_id("/docs/a.md", 0), chunk_id("/docs/a.md", 0));
        assert_ne!(chunk_id("/docs/a.md", 0), chunk_id("/docs/a.md", 1));
        assert_ne!(chunk_id("/docs/a.md", 1), chunk_id("/docs/b.md", 1));
    }

    #[test]
    fn chunk_id_does_not_collide_on_concatenation() {
        assert_ne!(chunk_id("/docs/a1", 1), chunk_id("/docs/a", 11));
    }

    #[test]
    fn fingerprint_changes_with_any_character() {
        let a = fingerprint("# Title\n\nBody text.\n");
        let b = fingerprint("# Title\n\nBody text!\n");
        assert_ne!(a, b);
        assert_eq!(a, fingerprint("# Title\n\nBody text.\n"));
    }

    #[test]
    fn embedding_text_renders_breadcrumb_first() {
        let chunk = Chunk {
            id: chunk_id("/d.md", 0),
            document_path: "/d.md".into(),
            ordinal: 0,
            heading_path: vec!["Guide".into(), "Install".into()],
            text: "## Install\n\nRun it.".into(),
            hash: sha256_hex("## Install\n\nRun it."),
        };
        assert_eq!(chunk.breadcrumb(), "Guide > Install");
        assert!(chunk.embedding_text().starts_with("Guide > Install\n\n"));
    }
}
