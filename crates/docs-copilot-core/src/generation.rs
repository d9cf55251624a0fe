//! Text-generation capability contract.

use async_trait::async_trait;

use crate::error::Result;

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub system_prompt: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tokens: 1024,
            temperature: 0.1,
        }
    }
}

/// A text-generation backend, used both for answers and for delegated
/// document cleanup.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}
