//! Document cleaning with optional delegation to a text generator.
//!
//! The rule-based pass from [`docs_copilot_core::clean`] always runs and
//! its output is what the document fingerprint is computed over. When
//! delegation is enabled and the rule output still carries at least
//! `cleaning.artifact_threshold` artifacts, the text is sent to the
//! generation backend. Any failure there (error, timeout, empty reply)
//! falls back to the rule output with a warning.

use std::sync::Arc;
use std::time::Duration;

use docs_copilot_core::clean::{
    artifact_count, clean_markdown, cleanup_prompt, CleanOutput, CleaningStats,
    CLEANUP_SYSTEM_PROMPT,
};
use docs_copilot_core::generation::{GenerationOptions, TextGenerator};
use docs_copilot_core::models::Document;
use docs_copilot_core::Error;

use crate::config::CleaningConfig;

/// Final cleaned text for a document.
#[derive(Debug, Clone)]
pub struct CleanedDocument {
    pub text: String,
    pub stats: CleaningStats,
    /// True when the text came back from the generation backend.
    pub delegated: bool,
}

pub struct Cleaner {
    generator: Option<Arc<dyn TextGenerator>>,
    threshold: usize,
    timeout: Duration,
}

impl Cleaner {
    /// A cleaner that never delegates.
    pub fn rules_only() -> Self {
        Self {
            generator: None,
            threshold: 0,
            timeout: Duration::ZERO,
        }
    }

    pub fn new(config: &CleaningConfig, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        let generator = if config.delegate { generator } else { None };
        Self {
            generator,
            threshold: config.artifact_threshold,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn delegates(&self) -> bool {
        self.generator.is_some() && self.threshold > 0
    }

    /// The deterministic rule-based pass.
    pub fn clean_rules(&self, doc: &Document) -> CleanOutput {
        let declared = doc.title_declared.then_some(doc.title.as_str());
        clean_markdown(&doc.body, declared)
    }

    /// Optionally refine the rule output through the generation backend.
    pub async fn refine(&self, doc: &Document, rules: CleanOutput) -> CleanedDocument {
        let Some(generator) = self.generator.as_ref().filter(|_| self.threshold > 0) else {
            return CleanedDocument {
                text: rules.text,
                stats: rules.stats,
                delegated: false,
            };
        };

        let artifacts = artifact_count(&rules.text);
        if artifacts < self.threshold {
            return CleanedDocument {
                text: rules.text,
                stats: rules.stats,
                delegated: false,
            };
        }

        tracing::debug!(path = %doc.path.display(), artifacts, "delegating cleanup");
        let options = GenerationOptions {
            system_prompt: Some(CLEANUP_SYSTEM_PROMPT.to_string()),
            max_tokens: (rules.text.len() / 2).max(1024),
            temperature: 0.1,
        };
        let prompt = cleanup_prompt(&rules.text);
        let reply = tokio::time::timeout(self.timeout, generator.generate(&prompt, &options)).await;

        let failure = match reply {
            Ok(Ok(text)) => {
                let unwrapped = strip_markdown_fence(&text);
                if !unwrapped.trim().is_empty() {
                    let declared = doc.title_declared.then_some(doc.title.as_str());
                    let normalized = clean_markdown(unwrapped, declared);
                    return CleanedDocument {
                        text: normalized.text,
                        stats: rules.stats,
                        delegated: true,
                    };
                }
                "empty reply".to_string()
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => Error::CapabilityTimeout {
                operation: "cleanup",
                after: self.timeout,
            }
            .to_string(),
        };

        tracing::warn!(
            path = %doc.path.display(),
            reason = %failure,
            "delegated cleanup failed, using rule-based output"
        );
        CleanedDocument {
            text: rules.text,
            stats: rules.stats,
            delegated: false,
        }
    }
}

/// Remove a ```` ```markdown ```` wrapper the model may add around its reply.
fn strip_markdown_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(first_newline) = trimmed.find('\n') else {
        return trimmed;
    };
    let opener = trimmed[..first_newline].trim();
    let fence = if opener.starts_with("```") {
        "```"
    } else if opener.starts_with("~~~") {
        "~~~"
    } else {
        return trimmed;
    };
    let rest = trimmed[first_newline + 1..].trim_end();
    match rest.strip_suffix(fence) {
        Some(inner) => inner.trim_end_matches(['`', '~']).trim_end(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use docs_copilot_core::Result;

    struct Scripted(std::result::Result<String, ()>);

    #[async_trait]
    impl TextGenerator for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
            self.0
                .clone()
                .map_err(|_| Error::CapabilityUnavailable("down".into()))
        }
    }

    fn messy_doc() -> Document {
        Document {
            path: "/docs/messy.md".into(),
            title: "Messy".into(),
            category: "general".into(),
            tags: vec![],
            title_declared: false,
            metadata: serde_json::json!({}),
            body: "# Messy\n\n• one\n• two\n<font>x</font>\n".into(),
            modified_at: Utc::now(),
        }
    }

    fn config() -> CleaningConfig {
        CleaningConfig {
            delegate: true,
            artifact_threshold: 2,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn delegated_output_is_used() {
        let cleaner = Cleaner::new(
            &config(),
            Some(Arc::new(Scripted(Ok("```markdown\n# Messy\n\n- one\n- two\n```".into())))),
        );
        let doc = messy_doc();
        let rules = cleaner.clean_rules(&doc);
        let out = cleaner.refine(&doc, rules).await;
        assert!(out.delegated);
        assert_eq!(out.text, "# Messy\n\n- one\n- two\n");
    }

    #[tokio::test]
    async fn failure_falls_back_to_rules() {
        let cleaner = Cleaner::new(&config(), Some(Arc::new(Scripted(Err(())))));
        let doc = messy_doc();
        let rules = cleaner.clean_rules(&doc);
        let expected = rules.text.clone();
        let out = cleaner.refine(&doc, rules).await;
        assert!(!out.delegated);
        assert_eq!(out.text, expected);
    }

    #[tokio::test]
    async fn clean_documents_are_not_delegated() {
        let cleaner = Cleaner::new(&config(), Some(Arc::new(Scripted(Ok("replaced".into())))));
        let mut doc = messy_doc();
        doc.body = "# Tidy\n\n- fine\n".into();
        let rules = cleaner.clean_rules(&doc);
        let out = cleaner.refine(&doc, rules).await;
        assert!(!out.delegated);
        assert_eq!(out.text, "# Tidy\n\n- fine\n");
    }

    #[test]
    fn fence_wrapper_is_stripped() {
        assert_eq!(strip_markdown_fence("```markdown\n# A\n```"), "# A");
        assert_eq!(strip_markdown_fence("# A\n\ntext"), "# A\n\ntext");
    }
}
