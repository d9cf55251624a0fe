//! Ollama backends.
//!
//! Embeddings use `POST /api/embed`, generation uses `POST /api/generate`
//! with streaming disabled. Both talk to the configured URL (default
//! `http://localhost:11434`).

use async_trait::async_trait;

use docs_copilot_core::embedding::EmbeddingProvider;
use docs_copilot_core::generation::{GenerationOptions, TextGenerator};
use docs_copilot_core::{Error, Result};

use super::{json_to_vector, HttpBackend};
use crate::config::{EmbeddingConfig, GenerationConfig};

const DEFAULT_URL: &str = "http://localhost:11434";

pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    http: HttpBackend,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::config("embedding.dims required for Ollama provider"))?;
        let url = config.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());
        let http = HttpBackend::new("Ollama", config.timeout_secs, config.max_retries)?;

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self
            .http
            .post_json("embed", &format!("{}/api/embed", self.url), None, &body)
            .await?;
        parse_embed_response(&json)
    }
}

fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            Error::CapabilityUnavailable("Invalid Ollama response: missing embeddings array".into())
        })?;

    embeddings
        .iter()
        .map(|embedding| json_to_vector(embedding, "Ollama"))
        .collect()
}

pub struct OllamaGenerator {
    model: String,
    url: String,
    http: HttpBackend,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("generation.model required for Ollama provider"))?;
        let url = config.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());
        let http = HttpBackend::new("Ollama", config.timeout_secs, config.max_retries)?;

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        });
        if let Some(system) = &options.system_prompt {
            body["system"] = serde_json::Value::String(system.clone());
        }

        let json = self
            .http
            .post_json("generate", &format!("{}/api/generate", self.url), None, &body)
            .await?;
        parse_generate_response(&json)
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|r| r.trim().to_string())
        .ok_or_else(|| {
            Error::CapabilityUnavailable("Invalid Ollama response: missing response field".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_embeddings() {
        let json = serde_json::json!({ "embeddings": [[0.5, -1.0], [0.0, 2.0]] });
        let vectors = parse_embed_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![0.5, -1.0], vec![0.0, 2.0]]);
    }

    #[test]
    fn rejects_malformed_embeddings() {
        assert!(parse_embed_response(&serde_json::json!({})).is_err());
        assert!(parse_embed_response(&serde_json::json!({ "embeddings": ["x"] })).is_err());
    }

    #[test]
    fn parses_generation() {
        let json = serde_json::json!({ "response": "  Restart the pod.\n" });
        assert_eq!(parse_generate_response(&json).unwrap(), "Restart the pod.");
    }

    #[test]
    fn requires_model_and_dims() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            model: Some("nomic-embed-text".into()),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(OllamaEmbedder::new(&config), Err(Error::Config(_))));
    }
}
