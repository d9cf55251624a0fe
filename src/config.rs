//! TOML configuration.
//!
//! Every section is optional and falls back to defaults, so an empty file
//! is a valid configuration with embedding and generation disabled.
//!
//! ```toml
//! [db]
//! path = "./data/docs-copilot.sqlite"
//!
//! [docs]
//! root = "./docs"
//! exclude_globs = ["drafts/**"]
//!
//! [chunking]
//! max_tokens = 1000
//! min_tokens = 100
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [generation]
//! provider = "ollama"
//! model = "llama3.1"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use docs_copilot_core::chunk::ChunkingOptions;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub chunking: ChunkingOptions,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/docs-copilot.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    /// Default root for `ingest` when none is given.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.markdown".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CleaningConfig {
    /// Send documents with many artifacts to the generation backend.
    #[serde(default)]
    pub delegate: bool,
    #[serde(default = "default_artifact_threshold")]
    pub artifact_threshold: usize,
    #[serde(default = "default_cleanup_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            delegate: false,
            artifact_threshold: default_artifact_threshold(),
            timeout_secs: default_cleanup_timeout_secs(),
        }
    }
}

fn default_artifact_threshold() -> usize {
    3
}
fn default_cleanup_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Documents processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_similarity: Option<f32>,
    #[serde(default)]
    pub merge_adjacent: bool,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: None,
            merge_adjacent: false,
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_context_tokens() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama or OpenAI-compatible endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            max_tokens: default_generation_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_generation_max_tokens() -> usize {
    2048
}
fn default_temperature() -> f32 {
    0.3
}
fn default_generation_timeout_secs() -> u64 {
    120
}

/// Log filtering, in `tracing_subscriber::EnvFilter` syntax.
///
/// ```toml
/// [logging]
/// default = "info"
///
/// [logging.modules]
/// docs_copilot::ingest = "debug"
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

const PROVIDERS: [&str; 3] = ["disabled", "ollama", "openai"];

/// Parse and validate a configuration string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Read, parse and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.min_tokens >= config.chunking.max_tokens {
        bail!("chunking.min_tokens must be < chunking.max_tokens");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_context_tokens == 0 {
        bail!("retrieval.max_context_tokens must be > 0");
    }
    if let Some(min) = config.retrieval.min_similarity {
        if !(-1.0..=1.0).contains(&min) {
            bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
        }
    }

    // Validate ingest
    if config.ingest.concurrency < 1 {
        bail!("ingest.concurrency must be >= 1");
    }

    // Validate embedding
    let embedding = &config.embedding;
    if !PROVIDERS.contains(&embedding.provider.as_str()) {
        bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            embedding.provider
        );
    }
    if embedding.is_enabled() {
        if embedding.dims.is_none() || embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                embedding.provider
            );
        }
        if embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                embedding.provider
            );
        }
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    let generation = &config.generation;
    if !PROVIDERS.contains(&generation.provider.as_str()) {
        bail!(
            "Unknown generation provider: '{}'. Must be disabled, ollama, or openai.",
            generation.provider
        );
    }
    if generation.is_enabled() && generation.model.is_none() {
        bail!(
            "generation.model must be specified when provider is '{}'",
            generation.provider
        );
    }
    if config.cleaning.delegate && !generation.is_enabled() {
        bail!("cleaning.delegate requires a generation provider");
    }

    Ok(())
}
