//! Error types for Docs Copilot.
//!
//! Every fallible operation in the pipeline returns [`Error`]. The variants
//! map onto the failure kinds callers need to tell apart: a malformed
//! document is skipped and reported, an unreachable capability fails the
//! current unit of work, and an embedding-space inconsistency halts an
//! ingestion run before the index is corrupted.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all Docs Copilot operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A document could not be read or parsed. Non-fatal during ingestion.
    #[error("parse error in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The embedding or generation backend is unreachable or refused the call.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// The embedding or generation backend did not answer in time.
    #[error("{operation} timed out after {after:?}")]
    CapabilityTimeout {
        operation: &'static str,
        after: Duration,
    },

    /// The backend rejected the call because of rate limiting.
    #[error("capability rate limited: {0}")]
    RateLimited(String),

    /// A vector's dimensionality differs from the store's embedding space.
    #[error("embedding dimension mismatch: store holds {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding model differs from the one the store was built with.
    #[error("embedding model mismatch: store was built with '{stored}', current model is '{current}' (run a full ingest)")]
    ModelMismatch { stored: String, current: String },

    /// Persistence failure in the vector store.
    #[error("store error: {0}")]
    Store(String),

    /// Invalid configuration or arguments (e.g. `top_k = 0`).
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a parse error for a document path.
    pub fn parse(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a store error from any displayable cause.
    pub fn store(cause: impl std::fmt::Display) -> Self {
        Self::Store(cause.to_string())
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that must stop an ingestion run instead of being recorded
    /// against a single document.
    pub fn is_fatal_to_ingest(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::ModelMismatch { .. } | Self::Store(_)
        )
    }

    /// Short, stable name of the error kind, used in ingestion reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::CapabilityUnavailable(_) => "capability_unavailable",
            Self::CapabilityTimeout { .. } => "capability_timeout",
            Self::RateLimited(_) => "rate_limited",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::ModelMismatch { .. } => "model_mismatch",
            Self::Store(_) => "store",
            Self::Config(_) => "config",
            Self::Io { .. } => "io",
        }
    }
}
