//! The [`Copilot`] facade: one handle over the store, the capabilities and
//! both pipelines.
//!
//! ```rust,no_run
//! # async fn demo() -> docs_copilot::Result<()> {
//! use docs_copilot::{Copilot, IngestMode};
//! use std::path::Path;
//!
//! let copilot = Copilot::open_path(Path::new("config/docs-copilot.toml")).await?;
//! let report = copilot.ingest(Path::new("./docs"), IngestMode::Incremental, false).await?;
//! println!("{}", report);
//!
//! let answer = copilot.query("How do I restart a stuck pod?", None).await?;
//! println!("{}", answer.text);
//! copilot.close().await?;
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use docs_copilot_core::embedding::EmbeddingProvider;
use docs_copilot_core::generation::TextGenerator;
use docs_copilot_core::models::{Answer, CollectionInfo, RetrievedChunk, SourceEntry};
use docs_copilot_core::store::{SearchFilter, VectorStore};
use docs_copilot_core::{Error, Result};

use crate::clean::Cleaner;
use crate::config::{self, Config};
use crate::generate::Generator;
use crate::ingest::{IngestMode, IngestOptions, IngestReport, Ingestor};
use crate::logging;
use crate::providers::{create_embedder, create_generator};
use crate::retrieve::Retriever;
use crate::sqlite_store::SqliteStore;

/// Store and capability summary returned by [`Copilot::status`].
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub db_path: PathBuf,
    pub collection: CollectionInfo,
    pub embedding_model: String,
    pub embedding_dims: usize,
    pub generation_model: String,
}

pub struct Copilot {
    config: Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
    ingestor: Ingestor,
    retriever: Retriever,
    answerer: Generator,
}

impl Copilot {
    /// Load a TOML config file, install its logging filter and open
    /// everything it describes.
    pub async fn open_path(config_path: &Path) -> Result<Self> {
        let config =
            config::load_config(config_path).map_err(|e| Error::config(format!("{:#}", e)))?;
        logging::init_with_config(&config.logging);
        Self::open(config).await
    }

    /// Open the SQLite store at `db.path` and build the configured backends.
    pub async fn open(config: Config) -> Result<Self> {
        config::validate(&config).map_err(|e| Error::config(format!("{:#}", e)))?;
        let store = SqliteStore::open(&config.db.path).await?;
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        tracing::info!(
            db = %config.db.path.display(),
            embedding = embedder.model_name(),
            generation = generator.model_name(),
            "copilot opened"
        );
        Ok(Self::from_parts(config, Arc::new(store), embedder, generator))
    }

    /// Assemble a copilot from explicit parts.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let cleaner = Arc::new(Cleaner::new(&config.cleaning, Some(generator.clone())));
        let ingestor = Ingestor::new(&config, store.clone(), embedder.clone(), cleaner);
        let retriever = Retriever::new(&config, store.clone(), embedder.clone());
        let answerer = Generator::new(&config, generator.clone());
        Self {
            config,
            store,
            embedder,
            generator,
            ingestor,
            retriever,
            answerer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub async fn ingest(&self, root: &Path, mode: IngestMode, dry_run: bool) -> Result<IngestReport> {
        self.ingest_with_cancel(root, mode, dry_run, CancellationToken::new())
            .await
    }

    pub async fn ingest_with_cancel(
        &self,
        root: &Path,
        mode: IngestMode,
        dry_run: bool,
        cancel: CancellationToken,
    ) -> Result<IngestReport> {
        self.ingestor
            .run(root, IngestOptions { mode, dry_run }, cancel)
            .await
    }

    /// Retrieve chunks for `question`. `top_k` defaults to `retrieval.top_k`.
    pub async fn search(&self, question: &str, top_k: Option<usize>) -> Result<Vec<RetrievedChunk>> {
        self.search_filtered(question, top_k, &SearchFilter::default())
            .await
    }

    pub async fn search_filtered(
        &self,
        question: &str,
        top_k: Option<usize>,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedChunk>> {
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);
        self.retriever.search(question, top_k, filter).await
    }

    /// Retrieve and answer `question` with citations.
    pub async fn query(&self, question: &str, top_k: Option<usize>) -> Result<Answer> {
        let retrieved = self.search(question, top_k).await?;
        self.answerer.answer(question, &retrieved).await
    }

    /// [`query`](Self::query) with a caller-supplied system prompt.
    pub async fn query_with_system_prompt(
        &self,
        question: &str,
        system_prompt: &str,
        top_k: Option<usize>,
    ) -> Result<Answer> {
        let retrieved = self.search(question, top_k).await?;
        self.answerer
            .answer_with_system_prompt(question, &retrieved, system_prompt)
            .await
    }

    /// Every stored chunk of one document, in ordinal order. `path` is the
    /// stored key as reported by [`list_sources`](Self::list_sources).
    pub async fn document_chunks(&self, path: &str) -> Result<Vec<RetrievedChunk>> {
        self.store.document_chunks(path).await
    }

    /// Distinct document categories in the index, sorted.
    pub async fn categories(&self) -> Result<Vec<String>> {
        self.store.categories().await
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceEntry>> {
        self.store.list_sources().await
    }

    pub async fn status(&self) -> Result<Status> {
        Ok(Status {
            db_path: self.config.db.path.clone(),
            collection: self.store.info().await?,
            embedding_model: self.embedder.model_name().to_string(),
            embedding_dims: self.embedder.dims(),
            generation_model: self.generator.model_name().to_string(),
        })
    }

    /// Remove every document, chunk and the recorded embedding space.
    pub async fn clear_store(&self) -> Result<()> {
        self.store.clear().await
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}
