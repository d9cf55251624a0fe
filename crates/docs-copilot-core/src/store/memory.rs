//! In-memory [`VectorStore`] for tests and embedded use.
//!
//! All state sits behind one `std::sync::RwLock`, so a document replace is
//! atomic with respect to concurrent searches. Vector search is brute-force
//! cosine distance over every stored vector.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{Error, Result};
use crate::models::{
    CollectionInfo, DocumentRecord, DocumentState, EmbeddingRecord, EmbeddingSpace,
    RetrievedChunk, SourceEntry,
};
use crate::retrieve::rank;

use super::{check_query_dims, check_space, SearchFilter, VectorStore};

struct StoredDoc {
    record: DocumentRecord,
    chunks: Vec<EmbeddingRecord>,
}

#[derive(Default)]
struct State {
    docs: BTreeMap<String, StoredDoc>,
    space: Option<EmbeddingSpace>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::store("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::store("in-memory store lock poisoned"))
    }
}

fn state_of(stored: &StoredDoc) -> DocumentState {
    DocumentState {
        path: stored.record.source.path.clone(),
        title: stored.record.source.title.clone(),
        category: stored.record.source.category.clone(),
        fingerprint: stored.record.fingerprint.clone(),
        chunk_count: stored.chunks.len(),
        modified_at: stored.record.modified_at,
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn document_states(&self) -> Result<Vec<DocumentState>> {
        let state = self.read()?;
        Ok(state.docs.values().map(state_of).collect())
    }

    async fn document_state(&self, path: &str) -> Result<Option<DocumentState>> {
        let state = self.read()?;
        Ok(state.docs.get(path).map(state_of))
    }

    async fn replace_document(
        &self,
        doc: &DocumentRecord,
        records: &[EmbeddingRecord],
        space: &EmbeddingSpace,
    ) -> Result<usize> {
        let mut state = self.write()?;
        check_space(state.space.as_ref(), space, records)?;
        if state.space.is_none() {
            state.space = Some(space.clone());
        }
        let previous = state.docs.insert(
            doc.source.path.clone(),
            StoredDoc {
                record: doc.clone(),
                chunks: records.to_vec(),
            },
        );
        Ok(previous.map(|p| p.chunks.len()).unwrap_or(0))
    }

    async fn delete_document(&self, path: &str) -> Result<usize> {
        let mut state = self.write()?;
        Ok(state.docs.remove(path).map(|d| d.chunks.len()).unwrap_or(0))
    }

    async fn search(
        &self,
        query_vec: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedChunk>> {
        let state = self.read()?;
        check_query_dims(state.space.as_ref(), query_vec)?;

        let candidates: Vec<RetrievedChunk> = state
            .docs
            .values()
            .flat_map(|d| d.chunks.iter())
            .filter_map(|r| {
                let distance = cosine_distance(query_vec, &r.vector);
                if !filter.accepts(&r.source.category, 1.0 - distance) {
                    return None;
                }
                Some(RetrievedChunk {
                    chunk_id: r.chunk.id.clone(),
                    source: r.source.clone(),
                    heading_path: r.chunk.heading_path.clone(),
                    text: r.chunk.text.clone(),
                    ordinals: vec![r.chunk.ordinal],
                    distance,
                })
            })
            .collect();

        Ok(rank(candidates, limit))
    }

    async fn document_chunks(&self, path: &str) -> Result<Vec<RetrievedChunk>> {
        let state = self.read()?;
        let Some(doc) = state.docs.get(path) else {
            return Ok(Vec::new());
        };
        let mut chunks: Vec<RetrievedChunk> = doc
            .chunks
            .iter()
            .map(|r| RetrievedChunk {
                chunk_id: r.chunk.id.clone(),
                source: r.source.clone(),
                heading_path: r.chunk.heading_path.clone(),
                text: r.chunk.text.clone(),
                ordinals: vec![r.chunk.ordinal],
                distance: 0.0,
            })
            .collect();
        chunks.sort_by_key(|c| c.ordinals.first().copied().unwrap_or_default());
        Ok(chunks)
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let state = self.read()?;
        let categories: BTreeSet<&str> = state
            .docs
            .values()
            .filter(|d| !d.chunks.is_empty())
            .map(|d| d.record.source.category.as_str())
            .collect();
        Ok(categories.into_iter().map(str::to_string).collect())
    }

    async fn list_sources(&self) -> Result<Vec<SourceEntry>> {
        let state = self.read()?;
        Ok(state
            .docs
            .values()
            .map(|d| SourceEntry {
                path: d.record.source.path.clone(),
                title: d.record.source.title.clone(),
                category: d.record.source.category.clone(),
                chunk_count: d.chunks.len(),
            })
            .collect())
    }

    async fn info(&self) -> Result<CollectionInfo> {
        let state = self.read()?;
        Ok(CollectionInfo {
            documents: state.docs.len(),
            chunks: state.docs.values().map(|d| d.chunks.len()).sum(),
            space: state.space.clone(),
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.write()?;
        *state = State::default();
        Ok(())
    }
}
