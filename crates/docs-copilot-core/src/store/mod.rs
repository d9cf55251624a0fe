//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only persistent state in the
//! pipeline: ingestion writes through it and retrieval reads through it.
//! Two backends exist: [`memory::InMemoryStore`] here, and the SQLite
//! store in the `docs-copilot` crate.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`document_states`](VectorStore::document_states) | Fingerprints of every stored document |
//! | [`replace_document`](VectorStore::replace_document) | Atomically swap a document's chunks |
//! | [`delete_document`](VectorStore::delete_document) | Remove a document and its chunks |
//! | [`search`](VectorStore::search) | Cosine-distance nearest neighbours |
//! | [`document_chunks`](VectorStore::document_chunks) | Every chunk of one document |
//! | [`categories`](VectorStore::categories) | Distinct categories in the index |
//! | [`list_sources`](VectorStore::list_sources) | Indexed documents with chunk counts |
//! | [`info`](VectorStore::info) | Counts and embedding space |
//! | [`clear`](VectorStore::clear) | Drop everything, including the space |

pub mod memory;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{
    CollectionInfo, DocumentRecord, DocumentState, EmbeddingRecord, EmbeddingSpace,
    RetrievedChunk, SourceEntry,
};

/// Filters applied by [`VectorStore::search`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Only chunks whose document has this category.
    pub category: Option<String>,
    /// Drop results whose cosine similarity is below this value.
    pub min_similarity: Option<f32>,
}

impl SearchFilter {
    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    /// True when a candidate passes both filters.
    pub fn accepts(&self, category: &str, similarity: f32) -> bool {
        if let Some(want) = &self.category {
            if want != category {
                return false;
            }
        }
        match self.min_similarity {
            Some(min) => similarity >= min,
            None => true,
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// State of every stored document, ordered by path.
    async fn document_states(&self) -> Result<Vec<DocumentState>>;

    async fn document_state(&self, path: &str) -> Result<Option<DocumentState>>;

    /// Replace a document and all of its chunks in one atomic step.
    ///
    /// Every vector is validated against `space` and against the space
    /// already recorded by the store; nothing is written on mismatch.
    /// Returns the number of chunks the document had before.
    async fn replace_document(
        &self,
        doc: &DocumentRecord,
        records: &[EmbeddingRecord],
        space: &EmbeddingSpace,
    ) -> Result<usize>;

    /// Remove a document and its chunks. Returns the number of chunks
    /// removed (0 if the document was not stored).
    async fn delete_document(&self, path: &str) -> Result<usize>;

    /// Up to `limit` chunks by ascending cosine distance, ties broken by
    /// chunk id.
    async fn search(
        &self,
        query_vec: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Every chunk of the document at `path`, in ordinal order, with a
    /// distance of 0. Empty when the document is not stored.
    async fn document_chunks(&self, path: &str) -> Result<Vec<RetrievedChunk>>;

    /// Distinct categories of documents that have at least one chunk,
    /// sorted.
    async fn categories(&self) -> Result<Vec<String>>;

    /// Indexed documents ordered by path.
    async fn list_sources(&self) -> Result<Vec<SourceEntry>>;

    async fn info(&self) -> Result<CollectionInfo>;

    /// Remove all documents, chunks and the recorded embedding space.
    async fn clear(&self) -> Result<()>;

    /// Release resources. Further calls may fail.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Validate a write against the store's recorded space.
///
/// Dimensionality is checked before the model name so that a vector of
/// the wrong size is always reported as such.
pub fn check_space(
    stored: Option<&EmbeddingSpace>,
    incoming: &EmbeddingSpace,
    records: &[EmbeddingRecord],
) -> Result<()> {
    if let Some(stored) = stored {
        if stored.dims != incoming.dims {
            return Err(Error::DimensionMismatch {
                expected: stored.dims,
                actual: incoming.dims,
            });
        }
        if stored.model != incoming.model {
            return Err(Error::ModelMismatch {
                stored: stored.model.clone(),
                current: incoming.model.clone(),
            });
        }
    }
    for record in records {
        if record.vector.len() != incoming.dims {
            return Err(Error::DimensionMismatch {
                expected: incoming.dims,
                actual: record.vector.len(),
            });
        }
    }
    Ok(())
}

/// Check a query vector against the recorded space.
pub fn check_query_dims(stored: Option<&EmbeddingSpace>, query_vec: &[f32]) -> Result<()> {
    match stored {
        Some(space) if space.dims != query_vec.len() => Err(Error::DimensionMismatch {
            expected: space.dims,
            actual: query_vec.len(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(model: &str, dims: usize) -> EmbeddingSpace {
        EmbeddingSpace {
            model: model.into(),
            dims,
        }
    }

    #[test]
    fn first_write_is_always_accepted() {
        assert!(check_space(None, &space("m", 3), &[]).is_ok());
    }

    #[test]
    fn dims_mismatch_wins_over_model_mismatch() {
        let err = check_space(Some(&space("a", 3)), &space("b", 4), &[]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 4 }));
        let err = check_space(Some(&space("a", 3)), &space("b", 3), &[]).unwrap_err();
        assert!(matches!(err, Error::ModelMismatch { .. }));
    }

    #[test]
    fn filter_accepts() {
        let f = SearchFilter {
            category: Some("runbook".into()),
            min_similarity: Some(0.5),
        };
        assert!(f.accepts("runbook", 0.6));
        assert!(!f.accepts("runbook", 0.4));
        assert!(!f.accepts("general", 0.9));
        assert!(SearchFilter::default().accepts("any", -1.0));
    }

    #[test]
    fn query_dims_checked_only_when_space_recorded() {
        assert!(check_query_dims(None, &[1.0]).is_ok());
        assert!(check_query_dims(Some(&space("m", 2)), &[1.0]).is_err());
    }
}
