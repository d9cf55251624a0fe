//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docs_copilot::config::Config;
use docs_copilot::docs_copilot_core::embedding::EmbeddingProvider;
use docs_copilot::docs_copilot_core::generation::{GenerationOptions, TextGenerator};
use docs_copilot::docs_copilot_core::store::memory::InMemoryStore;
use docs_copilot::docs_copilot_core::store::VectorStore;
use docs_copilot::{Copilot, Error, Result};

pub const DIMS: usize = 256;

// ─── Embedders ──────────────────────────────────────────────────────

/// Bag-of-words embedder: each lowercase word is hashed into one of
/// `dims` buckets and the vector is L2-normalized. Texts sharing words
/// land close together.
pub struct HashEmbedder {
    model: String,
    dims: usize,
    pub calls: AtomicUsize,
    /// Any batch containing this marker fails.
    fail_marker: Option<String>,
    /// Any batch containing this marker panics.
    panic_marker: Option<String>,
    delay: Option<Duration>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_space("hash-bow", DIMS)
    }

    pub fn with_space(model: &str, dims: usize) -> Self {
        Self {
            model: model.to_string(),
            dims,
            calls: AtomicUsize::new(0),
            fail_marker: None,
            panic_marker: None,
            delay: None,
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::new()
        }
    }

    pub fn panicking_on(marker: &str) -> Self {
        Self {
            panic_marker: Some(marker.to_string()),
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn embed_words(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        v[(hash % dims as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(Error::CapabilityUnavailable("embedder is down".into()));
            }
        }
        if let Some(marker) = &self.panic_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                panic!("embedder crashed on {}", marker);
            }
        }
        Ok(texts.iter().map(|t| embed_words(t, self.dims)).collect())
    }
}

// ─── Generator ──────────────────────────────────────────────────────

/// Replies with a fixed answer and remembers the last prompt and system
/// prompt. Can be made to fail or to stall.
pub struct ScriptedGenerator {
    reply: String,
    fail: bool,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
    pub last_system: Mutex<Option<String>>,
}

impl ScriptedGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            last_system: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new("too late")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    pub fn last_system(&self) -> Option<String> {
        self.last_system.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        *self.last_system.lock().unwrap() = options.system_prompt.clone();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::CapabilityUnavailable("generator is down".into()));
        }
        Ok(self.reply.clone())
    }
}

// ─── Harness ────────────────────────────────────────────────────────

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.ingest.concurrency = 2;
    config.embedding.batch_size = 4;
    config.embedding.timeout_secs = 5;
    config.generation.timeout_secs = 5;
    config
}

pub struct Harness {
    pub copilot: Copilot,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<HashEmbedder>,
    pub generator: Arc<ScriptedGenerator>,
}

pub fn harness(embedder: HashEmbedder) -> Harness {
    harness_with(test_config(), Arc::new(InMemoryStore::new()), embedder)
}

pub fn harness_with(config: Config, store: Arc<dyn VectorStore>, embedder: HashEmbedder) -> Harness {
    let generator = ScriptedGenerator::new("Use the rollback command [Source 1].");
    harness_with_generator(config, store, embedder, generator)
}

pub fn harness_with_generator(
    config: Config,
    store: Arc<dyn VectorStore>,
    embedder: HashEmbedder,
    generator: ScriptedGenerator,
) -> Harness {
    let embedder = Arc::new(embedder);
    let generator = Arc::new(generator);
    let copilot = Copilot::from_parts(config, store.clone(), embedder.clone(), generator.clone());
    Harness {
        copilot,
        store,
        embedder,
        generator,
    }
}

pub fn write_doc(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Canonical string key of a file, as stored.
pub fn key(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap()
        .to_string_lossy()
        .into_owned()
}
