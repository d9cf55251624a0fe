//! OpenAI backends.
//!
//! Requires the `OPENAI_API_KEY` environment variable. The base URL
//! defaults to `https://api.openai.com` and may point at any
//! OpenAI-compatible server via `url`.

use async_trait::async_trait;

use docs_copilot_core::embedding::EmbeddingProvider;
use docs_copilot_core::generation::{GenerationOptions, TextGenerator};
use docs_copilot_core::{Error, Result};

use super::{json_to_vector, HttpBackend};
use crate::config::{EmbeddingConfig, GenerationConfig};

const DEFAULT_URL: &str = "https://api.openai.com";

fn api_key() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .map_err(|_| Error::config("OPENAI_API_KEY environment variable not set"))
}

pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    http: HttpBackend,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::config("embedding.dims required for OpenAI provider"))?;
        let api_key = api_key()?;
        let url = config.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());
        let http = HttpBackend::new("OpenAI", config.timeout_secs, config.max_retries)?;

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
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
            .post_json(
                "embed",
                &format!("{}/v1/embeddings", self.url),
                Some(&self.api_key),
                &body,
            )
            .await?;
        parse_embed_response(&json)
    }
}

/// Vectors come back tagged with their input index; restore input order.
fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        Error::CapabilityUnavailable("Invalid OpenAI response: missing data array".into())
    })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item.get("embedding").ok_or_else(|| {
            Error::CapabilityUnavailable("Invalid OpenAI response: missing embedding".into())
        })?;
        indexed.push((index, json_to_vector(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    http: HttpBackend,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("generation.model required for OpenAI provider"))?;
        let api_key = api_key()?;
        let url = config.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());
        let http = HttpBackend::new("OpenAI", config.timeout_secs, config.max_retries)?;

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        let json = self
            .http
            .post_json(
                "generate",
                &format!("{}/v1/chat/completions", self.url),
                Some(&self.api_key),
                &body,
            )
            .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| {
            Error::CapabilityUnavailable("Invalid OpenAI response: missing message content".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_follow_input_order() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });
        let vectors = parse_embed_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn chat_content_is_extracted() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Scale the deployment [1]." } }]
        });
        assert_eq!(
            parse_chat_response(&json).unwrap(),
            "Scale the deployment [1]."
        );
        assert!(parse_chat_response(&serde_json::json!({ "choices": [] })).is_err());
    }
}
