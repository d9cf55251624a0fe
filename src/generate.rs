//! Answer generation over retrieved chunks.

use std::sync::Arc;
use std::time::Duration;

use docs_copilot_core::generation::{GenerationOptions, TextGenerator};
use docs_copilot_core::models::{Answer, RetrievedChunk};
use docs_copilot_core::prompt::{build_prompt, context_budget_chars, NOT_FOUND_ANSWER, SYSTEM_PROMPT};
use docs_copilot_core::{Error, Result};

use crate::config::Config;

pub struct Generator {
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
    budget_chars: usize,
    timeout: Duration,
}

impl Generator {
    pub fn new(config: &Config, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            options: GenerationOptions {
                system_prompt: Some(SYSTEM_PROMPT.to_string()),
                max_tokens: config.generation.max_tokens,
                temperature: config.generation.temperature,
            },
            budget_chars: context_budget_chars(config.retrieval.max_context_tokens),
            timeout: Duration::from_secs(config.generation.timeout_secs),
        }
    }

    /// Answer `query` from `retrieved`, citing only the chunks that fit in
    /// the context budget.
    ///
    /// With nothing retrieved the fixed not-found answer comes back and the
    /// generator is never called. Generation failures are returned as-is.
    pub async fn answer(&self, query: &str, retrieved: &[RetrievedChunk]) -> Result<Answer> {
        self.answer_with(query, retrieved, &self.options).await
    }

    /// Like [`answer`](Self::answer), with `system_prompt` in place of the
    /// grounded default.
    pub async fn answer_with_system_prompt(
        &self,
        query: &str,
        retrieved: &[RetrievedChunk],
        system_prompt: &str,
    ) -> Result<Answer> {
        let options = GenerationOptions {
            system_prompt: Some(system_prompt.to_string()),
            ..self.options.clone()
        };
        self.answer_with(query, retrieved, &options).await
    }

    async fn answer_with(
        &self,
        query: &str,
        retrieved: &[RetrievedChunk],
        options: &GenerationOptions,
    ) -> Result<Answer> {
        if retrieved.is_empty() {
            return Ok(Answer {
                query: query.to_string(),
                text: NOT_FOUND_ANSWER.to_string(),
                citations: Vec::new(),
                model: None,
            });
        }

        let plan = build_prompt(query, retrieved, self.budget_chars);
        tracing::debug!(
            retrieved = retrieved.len(),
            included = plan.included,
            prompt_chars = plan.prompt.len(),
            "generating answer"
        );

        let text = tokio::time::timeout(
            self.timeout,
            self.generator.generate(&plan.prompt, options),
        )
        .await
        .map_err(|_| Error::CapabilityTimeout {
            operation: "generate",
            after: self.timeout,
        })??;

        Ok(Answer {
            query: query.to_string(),
            text: text.trim().to_string(),
            citations: plan.citations,
            model: Some(self.generator.model_name().to_string()),
        })
    }
}
