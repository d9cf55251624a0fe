//! Query-time retrieval: embed the question, search the store, rank.

use std::sync::Arc;
use std::time::Duration;

use docs_copilot_core::embedding::EmbeddingProvider;
use docs_copilot_core::models::RetrievedChunk;
use docs_copilot_core::retrieve::{search, validate_top_k, SearchRequest};
use docs_copilot_core::store::{SearchFilter, VectorStore};
use docs_copilot_core::{Error, Result};

use crate::config::Config;

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
    min_similarity: Option<f32>,
    merge_adjacent: bool,
}

impl Retriever {
    pub fn new(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            embedder,
            timeout: Duration::from_secs(config.embedding.timeout_secs),
            min_similarity: config.retrieval.min_similarity,
            merge_adjacent: config.retrieval.merge_adjacent,
        }
    }

    /// Return up to `top_k` chunks most similar to `query`.
    ///
    /// A blank query or an empty store yields an empty result without
    /// calling the embedder. The configured `min_similarity` applies when
    /// `filter` sets none.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedChunk>> {
        validate_top_k(top_k)?;

        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        if self.store.info().await?.chunks == 0 {
            tracing::debug!("store is empty, skipping query embedding");
            return Ok(Vec::new());
        }

        let query_vec = self.embed_query(query).await?;

        let mut filter = filter.clone();
        if filter.min_similarity.is_none() {
            filter.min_similarity = self.min_similarity;
        }
        let request = SearchRequest {
            query_vec: &query_vec,
            top_k,
            filter,
            merge_adjacent: self.merge_adjacent,
        };
        let results = search(self.store.as_ref(), &request).await?;

        tracing::debug!(top_k, results = results.len(), "retrieved");
        Ok(results)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let texts = vec![query.to_string()];
        let vectors = tokio::time::timeout(self.timeout, self.embedder.embed(&texts))
            .await
            .map_err(|_| Error::CapabilityTimeout {
                operation: "embed",
                after: self.timeout,
            })??;

        vectors.into_iter().next().ok_or_else(|| {
            Error::CapabilityUnavailable("embedder returned no vector for the query".into())
        })
    }
}
