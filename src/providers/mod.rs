//! HTTP backends for the embedding and text-generation capabilities.
//!
//! | Config value | Embedding | Generation |
//! |--------------|-----------|------------|
//! | `"disabled"` | [`DisabledProvider`] | [`DisabledProvider`] |
//! | `"ollama"` | [`ollama::OllamaEmbedder`] | [`ollama::OllamaGenerator`] |
//! | `"openai"` | [`openai::OpenAIEmbedder`] | [`openai::OpenAIGenerator`] |
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Exhausted retries map to [`Error::RateLimited`] when the last failure
//! was a 429, [`Error::CapabilityTimeout`] when it was a request timeout,
//! and [`Error::CapabilityUnavailable`] otherwise.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use docs_copilot_core::embedding::EmbeddingProvider;
use docs_copilot_core::generation::{GenerationOptions, TextGenerator};
use docs_copilot_core::{Error, Result};

use crate::config::{EmbeddingConfig, GenerationConfig};

/// Placeholder used when a capability is not configured. Every call fails
/// with [`Error::CapabilityUnavailable`].
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::CapabilityUnavailable(
            "embedding provider is disabled".into(),
        ))
    }
}

#[async_trait]
impl TextGenerator for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Err(Error::CapabilityUnavailable(
            "generation provider is disabled".into(),
        ))
    }
}

/// Create the embedding backend named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "ollama" => Ok(Arc::new(ollama::OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(openai::OpenAIEmbedder::new(config)?)),
        other => Err(Error::config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Create the generation backend named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "ollama" => Ok(Arc::new(ollama::OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(openai::OpenAIGenerator::new(config)?)),
        other => Err(Error::config(format!(
            "Unknown generation provider: {}",
            other
        ))),
    }
}

/// A JSON-over-HTTP client with retry and backoff.
pub(crate) struct HttpBackend {
    client: reqwest::Client,
    label: &'static str,
    timeout: Duration,
    max_retries: u32,
}

enum Failure {
    RateLimited(String),
    TimedOut,
    Other(String),
}

impl HttpBackend {
    pub(crate) fn new(label: &'static str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("{} client: {}", label, e)))?;
        Ok(Self {
            client,
            label,
            timeout,
            max_retries,
        })
    }

    /// POST `body` to `url` and return the parsed JSON response.
    pub(crate) async fn post_json(
        &self,
        operation: &'static str,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last = Failure::Other(format!("{} {} failed after retries", self.label, operation));

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(backend = self.label, attempt, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(url).json(body);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            Error::CapabilityUnavailable(format!(
                                "{} returned invalid JSON: {}",
                                self.label, e
                            ))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let message = format!("{} API error {}: {}", self.label, status, body_text);

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 {
                        last = Failure::RateLimited(message);
                        continue;
                    }
                    if status.is_server_error() {
                        last = Failure::Other(message);
                        continue;
                    }

                    // Client error (not 429): fail now
                    return Err(Error::CapabilityUnavailable(message));
                }
                Err(e) if e.is_timeout() => {
                    last = Failure::TimedOut;
                }
                Err(e) => {
                    last = Failure::Other(format!(
                        "{} connection error (is it running at {}?): {}",
                        self.label, url, e
                    ));
                }
            }
        }

        Err(match last {
            Failure::RateLimited(message) => Error::RateLimited(message),
            Failure::TimedOut => Error::CapabilityTimeout {
                operation,
                after: self.timeout,
            },
            Failure::Other(message) => Error::CapabilityUnavailable(message),
        })
    }
}

/// Parse a JSON array of numbers into a vector.
pub(crate) fn json_to_vector(value: &serde_json::Value, label: &str) -> Result<Vec<f32>> {
    let items = value.as_array().ok_or_else(|| {
        Error::CapabilityUnavailable(format!("Invalid {} response: embedding is not an array", label))
    })?;
    Ok(items
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}
