//! Ingestion pipeline orchestration.
//!
//! Coordinates the write path: discovery → parse → clean → fingerprint →
//! chunk → embed → store. Documents run concurrently, bounded by
//! `ingest.concurrency`; the steps for one document are sequential and end
//! in a single [`VectorStore::replace_document`] call, so a failure before
//! that call leaves the document's stored chunks untouched.
//!
//! # Modes
//!
//! - **Incremental** skips documents whose fingerprint matches the stored
//!   one and refuses to run against a store built with another embedding
//!   model or dimensionality.
//! - **Full** re-embeds every discovered document through the same
//!   per-document replace, so a failed document keeps its previous chunks.
//!   When the embedder's model or dimensionality differs from the store's,
//!   the store is cleared first: old vectors cannot be compared with new
//!   ones. This is the only way to switch embedding models.
//!
//! A dry run discovers, cleans, fingerprints and chunks, but never calls a
//! capability and never writes.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use docs_copilot_core::chunk::{chunk_markdown, ChunkingOptions};
use docs_copilot_core::embedding::EmbeddingProvider;
use docs_copilot_core::models::{
    fingerprint, Chunk, DocumentRecord, DocumentState, EmbeddingRecord, EmbeddingSpace,
};
use docs_copilot_core::store::{check_space, VectorStore};
use docs_copilot_core::{Error, Result};

use crate::clean::Cleaner;
use crate::config::{Config, DocsConfig};
use crate::discovery::{discover, parse_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    Incremental,
    Full,
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => write!(f, "incremental"),
            Self::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub mode: IngestMode,
    pub dry_run: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            mode: IngestMode::Incremental,
            dry_run: false,
        }
    }
}

/// Why a single document was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Parse,
    Io,
    CapabilityUnavailable,
    CapabilityTimeout,
    RateLimited,
    Other,
}

impl From<&Error> for FailureKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::Parse { .. } => Self::Parse,
            Error::Io { .. } => Self::Io,
            Error::CapabilityUnavailable(_) => Self::CapabilityUnavailable,
            Error::CapabilityTimeout { .. } => Self::CapabilityTimeout,
            Error::RateLimited(_) => Self::RateLimited,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub path: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Summary of one ingestion run.
///
/// Chunk counts are per chunk id: a changed document with `k` stored and
/// `n` new chunks contributes `min(k, n)` updated, `n - k` created and
/// `k - n` deleted.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub root: String,
    pub mode: IngestMode,
    pub dry_run: bool,
    pub discovered: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
    pub chunks_created: usize,
    pub chunks_updated: usize,
    pub chunks_deleted: usize,
    pub failures: Vec<IngestFailure>,
    pub cancelled: bool,
}

impl IngestReport {
    fn new(root: &Path, options: IngestOptions) -> Self {
        Self {
            root: root.to_string_lossy().into_owned(),
            mode: options.mode,
            dry_run: options.dry_run,
            discovered: 0,
            new: 0,
            updated: 0,
            unchanged: 0,
            removed: 0,
            failed: 0,
            chunks_created: 0,
            chunks_updated: 0,
            chunks_deleted: 0,
            failures: Vec::new(),
            cancelled: false,
        }
    }

    fn record_failure(&mut self, path: String, err: &Error) {
        tracing::warn!(path = %path, error = %err, "document skipped");
        self.push_failure(path, FailureKind::from(err), err.to_string());
    }

    fn push_failure(&mut self, path: String, kind: FailureKind, reason: String) {
        self.failed += 1;
        self.failures.push(IngestFailure { path, kind, reason });
    }

    fn record_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Written {
                previous: None,
                chunks,
            } => {
                self.new += 1;
                self.chunks_created += chunks;
            }
            Outcome::Written {
                previous: Some(old),
                chunks,
            } => {
                self.updated += 1;
                self.chunks_updated += old.min(chunks);
                self.chunks_created += chunks.saturating_sub(old);
                self.chunks_deleted += old.saturating_sub(chunks);
            }
        }
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if self.dry_run { " (dry-run)" } else { "" };
        writeln!(f, "ingest {} [{}]{}", self.root, self.mode, suffix)?;
        writeln!(f, "  discovered: {}", self.discovered)?;
        writeln!(
            f,
            "  documents: {} new, {} updated, {} unchanged, {} removed, {} failed",
            self.new, self.updated, self.unchanged, self.removed, self.failed
        )?;
        writeln!(
            f,
            "  chunks: {} created, {} updated, {} deleted",
            self.chunks_created, self.chunks_updated, self.chunks_deleted
        )?;
        for failure in &self.failures {
            writeln!(f, "  failed {}: {}", failure.path, failure.reason)?;
        }
        if self.cancelled {
            writeln!(f, "  cancelled")?;
        }
        Ok(())
    }
}

/// What happened to one document.
#[derive(Debug)]
enum Outcome {
    Unchanged,
    /// `previous` is the stored chunk count, `None` for a new document.
    Written {
        previous: Option<usize>,
        chunks: usize,
    },
}

/// Per-document work, cloned into each spawned task.
#[derive(Clone)]
struct Worker {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    cleaner: Arc<Cleaner>,
    chunking: ChunkingOptions,
    batch_size: usize,
    embed_timeout: Duration,
    options: IngestOptions,
}

impl Worker {
    fn space(&self) -> EmbeddingSpace {
        EmbeddingSpace {
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
        }
    }

    async fn process(&self, path: PathBuf, previous: Option<DocumentState>) -> Result<Outcome> {
        let doc = parse_file(&path).await?;
        let rules = self.cleaner.clean_rules(&doc);
        let fp = fingerprint(&rules.text);

        if self.options.mode == IngestMode::Incremental
            && previous.as_ref().is_some_and(|p| p.fingerprint == fp)
        {
            tracing::debug!(path = %path.display(), "unchanged");
            return Ok(Outcome::Unchanged);
        }
        let previous = previous.map(|p| p.chunk_count);
        let source = doc.source_ref();

        if self.options.dry_run {
            let chunks = chunk_markdown(&source, &rules.text, &self.chunking);
            return Ok(Outcome::Written {
                previous,
                chunks: chunks.len(),
            });
        }

        let cleaned = self.cleaner.refine(&doc, rules).await;
        let chunks = chunk_markdown(&source, &cleaned.text, &self.chunking);
        let vectors = self.embed_chunks(&chunks).await?;

        let count = chunks.len();
        let records: Vec<EmbeddingRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord {
                chunk,
                source: source.clone(),
                vector,
            })
            .collect();
        let record = DocumentRecord {
            source,
            fingerprint: fp,
            metadata: doc.metadata.clone(),
            modified_at: doc.modified_at.timestamp(),
        };
        self.store
            .replace_document(&record, &records, &self.space())
            .await?;

        tracing::debug!(
            path = %path.display(),
            chunks = count,
            delegated = cleaned.delegated,
            "stored"
        );
        Ok(Outcome::Written {
            previous,
            chunks: count,
        })
    }

    /// Embed all chunks of one document, batch by batch.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let dims = self.embedder.dims();
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(Chunk::embedding_text).collect();
            let embedded = tokio::time::timeout(self.embed_timeout, self.embedder.embed(&texts))
                .await
                .map_err(|_| Error::CapabilityTimeout {
                    operation: "embed",
                    after: self.embed_timeout,
                })??;

            if embedded.len() != texts.len() {
                return Err(Error::CapabilityUnavailable(format!(
                    "embedder returned {} vectors for {} inputs",
                    embedded.len(),
                    texts.len()
                )));
            }
            if let Some(bad) = embedded.iter().find(|v| v.len() != dims) {
                return Err(Error::DimensionMismatch {
                    expected: dims,
                    actual: bad.len(),
                });
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

pub struct Ingestor {
    worker: Worker,
    docs: DocsConfig,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        cleaner: Arc<Cleaner>,
    ) -> Self {
        Self {
            worker: Worker {
                store,
                embedder,
                cleaner,
                chunking: config.chunking.clone(),
                batch_size: config.embedding.batch_size,
                embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
                options: IngestOptions::default(),
            },
            docs: config.docs.clone(),
            concurrency: config.ingest.concurrency.max(1),
        }
    }

    /// Ingest every markdown file under `root`.
    ///
    /// Per-document failures are recorded in the report. Embedding-space
    /// mismatches and store failures stop the run and are returned as the
    /// error. Cancelling `cancel` lets in-flight documents finish, starts
    /// no new ones and skips orphan removal.
    ///
    /// Only documents under `root` are touched, except when a full run
    /// switches the embedding space and the whole store is reset.
    pub async fn run(
        &self,
        root: &Path,
        options: IngestOptions,
        cancel: CancellationToken,
    ) -> Result<IngestReport> {
        let discovery = discover(root, &self.docs)?;
        let root = discovery.root().to_path_buf();
        let mut report = IngestReport::new(&root, options);
        let worker = Worker {
            options,
            ..self.worker.clone()
        };

        tracing::info!(
            root = %root.display(),
            mode = %options.mode,
            dry_run = options.dry_run,
            "ingest started"
        );

        if options.mode == IngestMode::Incremental && !options.dry_run {
            let info = worker.store.info().await?;
            check_space(info.space.as_ref(), &worker.space(), &[])?;
        }

        let snapshot: HashMap<String, DocumentState> = worker
            .store
            .document_states()
            .await?
            .into_iter()
            .map(|state| (state.path.clone(), state))
            .collect();

        let mut space_reset = false;
        if options.mode == IngestMode::Full && !options.dry_run {
            let stored = worker.store.info().await?.space;
            let current = worker.space();
            if stored.as_ref().is_some_and(|stored| *stored != current) {
                worker.store.clear().await?;
                space_reset = true;
                tracing::warn!(
                    from = ?stored,
                    to = ?current,
                    documents = snapshot.len(),
                    "embedding space changed, store reset for full ingest"
                );
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut failed_paths: Vec<PathBuf> = Vec::new();
        let mut fatal: Option<Error> = None;

        let run_token = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(String, Result<Outcome>)> = JoinSet::new();
        let mut task_paths: HashMap<Id, String> = HashMap::new();

        for item in discovery {
            let path = match item {
                Ok(path) => path,
                Err(err) => {
                    let path = match &err {
                        Error::Io { path, .. } => path.clone(),
                        _ => root.clone(),
                    };
                    report.record_failure(path.to_string_lossy().into_owned(), &err);
                    failed_paths.push(path);
                    continue;
                }
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            while let Some(joined) = tasks.try_join_next() {
                handle_joined(
                    joined,
                    &task_paths,
                    &mut report,
                    &mut fatal,
                    &mut failed_paths,
                    &run_token,
                );
            }
            if run_token.is_cancelled() {
                break;
            }

            let key = path.to_string_lossy().into_owned();
            report.discovered += 1;
            seen.insert(key.clone());
            let previous = snapshot.get(&key).cloned();
            let worker = worker.clone();

            let task_key = key.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                let result = worker.process(path, previous).await;
                (task_key, result)
            });
            task_paths.insert(handle.id(), key);
        }

        while let Some(joined) = tasks.join_next().await {
            handle_joined(
                joined,
                &task_paths,
                &mut report,
                &mut fatal,
                &mut failed_paths,
                &run_token,
            );
        }

        if let Some(err) = fatal {
            tracing::error!(error = %err, "ingest halted");
            return Err(err);
        }

        report.cancelled = cancel.is_cancelled();
        if report.cancelled {
            tracing::warn!("ingest cancelled, orphan removal skipped");
        } else {
            let scope = OrphanScope {
                root: &root,
                seen: &seen,
                failed_paths: &failed_paths,
                space_reset,
            };
            remove_orphans(&worker, &snapshot, scope, &mut report).await?;
        }

        tracing::info!(
            discovered = report.discovered,
            new = report.new,
            updated = report.updated,
            unchanged = report.unchanged,
            removed = report.removed,
            failed = report.failed,
            "ingest finished"
        );
        Ok(report)
    }
}

fn handle_joined(
    joined: std::result::Result<(String, Result<Outcome>), JoinError>,
    task_paths: &HashMap<Id, String>,
    report: &mut IngestReport,
    fatal: &mut Option<Error>,
    failed_paths: &mut Vec<PathBuf>,
    run_token: &CancellationToken,
) {
    match joined {
        Ok((_, Ok(outcome))) => report.record_outcome(outcome),
        Ok((path, Err(err))) if err.is_fatal_to_ingest() => {
            tracing::error!(path = %path, error = %err, "fatal ingest error");
            run_token.cancel();
            if fatal.is_none() {
                *fatal = Some(err);
            }
        }
        Ok((path, Err(err))) => {
            failed_paths.push(PathBuf::from(&path));
            report.record_failure(path, &err);
        }
        Err(e) => {
            let path = task_paths.get(&e.id()).cloned().unwrap_or_default();
            tracing::error!(path = %path, error = %e, "ingest task panicked");
            failed_paths.push(PathBuf::from(&path));
            report.push_failure(path, FailureKind::Other, e.to_string());
        }
    }
}

/// What one run saw, for deciding which stored documents are orphans.
struct OrphanScope<'a> {
    root: &'a Path,
    seen: &'a HashSet<String>,
    failed_paths: &'a [PathBuf],
    /// The store was reset for a new embedding space; every unseen
    /// document is already gone.
    space_reset: bool,
}

/// Delete stored documents under the root that discovery no longer
/// reports. Documents under a path that failed this run are kept.
async fn remove_orphans(
    worker: &Worker,
    snapshot: &HashMap<String, DocumentState>,
    scope: OrphanScope<'_>,
    report: &mut IngestReport,
) -> Result<()> {
    let mut orphans: Vec<&DocumentState> = snapshot
        .values()
        .filter(|state| !scope.seen.contains(&state.path))
        .filter(|state| scope.space_reset || Path::new(&state.path).starts_with(scope.root))
        .filter(|state| {
            !scope
                .failed_paths
                .iter()
                .any(|failed| Path::new(&state.path).starts_with(failed))
        })
        .collect();
    orphans.sort_by(|a, b| a.path.cmp(&b.path));

    for state in orphans {
        let deleted = if worker.options.dry_run || scope.space_reset {
            state.chunk_count
        } else {
            worker.store.delete_document(&state.path).await?
        };
        tracing::debug!(path = %state.path, chunks = deleted, "orphan removed");
        report.removed += 1;
        report.chunks_deleted += deleted;
    }
    Ok(())
}
