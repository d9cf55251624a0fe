//! Grounded prompt construction and citation bookkeeping.
//!
//! Retrieved chunks are rendered in rank order into a context block, each
//! under a `### Source i: <breadcrumb> [category]` header, until the
//! character budget is used up. Citations are derived from exactly the
//! chunks that made it into the prompt.

use crate::chunk::CHARS_PER_TOKEN;
use crate::models::{Citation, RetrievedChunk};

/// System prompt for answer generation.
pub const SYSTEM_PROMPT: &str = "You are a documentation assistant for platform and \
infrastructure engineers. You answer questions about runbooks, architecture notes, \
troubleshooting guides and operational procedures.

Rules:
1. Answer only from the documentation excerpts you are given.
2. Cite the excerpts you use by their source path, for example \
\"According to [Runbook > Pod Restarts]...\".
3. If the excerpts do not contain the answer, say so plainly instead of guessing.
4. Reproduce commands with their exact syntax.
5. Call out warnings and caveats the documentation mentions.";

/// Answer returned when retrieval finds nothing.
pub const NOT_FOUND_ANSWER: &str = "I couldn't find any relevant documentation to answer \
your question. Try rephrasing it, or check whether the topic is covered in the indexed \
documentation.";

const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

/// A rendered prompt plus what went into it.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub prompt: String,
    /// Number of leading retrieved chunks included in the context.
    pub included: usize,
    pub citations: Vec<Citation>,
}

/// Character budget for a token budget.
pub fn context_budget_chars(max_context_tokens: usize) -> usize {
    max_context_tokens * CHARS_PER_TOKEN
}

/// Render one retrieved chunk as a context block.
pub fn render_source(index: usize, chunk: &RetrievedChunk) -> String {
    let crumb = chunk.breadcrumb();
    let label = if crumb.is_empty() {
        chunk.source.path.as_str()
    } else {
        crumb.as_str()
    };
    let header = if chunk.source.category.is_empty() {
        format!("### Source {}: {}", index, label)
    } else {
        format!("### Source {}: {} [{}]", index, label, chunk.source.category)
    };
    format!("{}\n\n{}", header, chunk.text)
}

/// Build the grounded prompt for `question`.
///
/// Chunks are taken in order until adding the next would exceed
/// `budget_chars`; the first chunk is always included.
pub fn build_prompt(question: &str, retrieved: &[RetrievedChunk], budget_chars: usize) -> PromptPlan {
    let mut blocks: Vec<String> = Vec::new();
    let mut used = 0usize;

    for (i, chunk) in retrieved.iter().enumerate() {
        let block = render_source(i + 1, chunk);
        let cost = if blocks.is_empty() {
            block.len()
        } else {
            block.len() + SOURCE_SEPARATOR.len()
        };
        if !blocks.is_empty() && used + cost > budget_chars {
            break;
        }
        used += cost;
        blocks.push(block);
    }

    let included = blocks.len();
    let prompt = format!(
        "Answer the question using the documentation excerpts below.\n\n\
         ## Documentation Context\n\n{}\n\n\
         ## Question\n\n{}\n\n\
         ## Instructions\n\n\
         1. Use only the excerpts above.\n\
         2. Cite sources by their breadcrumb path.\n\
         3. If the excerpts do not fully answer the question, say what is missing.\n\
         4. Give actionable steps where they apply.\n\n\
         Answer:",
        blocks.join(SOURCE_SEPARATOR),
        question.trim()
    );

    PromptPlan {
        prompt,
        included,
        citations: citations(&retrieved[..included]),
    }
}

/// Group included chunks by document, in order of first appearance, with
/// ordinals ascending and deduplicated.
pub fn citations(included: &[RetrievedChunk]) -> Vec<Citation> {
    let mut out: Vec<Citation> = Vec::new();
    for chunk in included {
        match out.iter_mut().find(|c| c.path == chunk.source.path) {
            Some(existing) => existing.ordinals.extend(chunk.ordinals.iter().copied()),
            None => out.push(Citation {
                path: chunk.source.path.clone(),
                title: chunk.source.title.clone(),
                ordinals: chunk.ordinals.clone(),
            }),
        }
    }
    for citation in &mut out {
        citation.ordinals.sort_unstable();
        citation.ordinals.dedup();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceRef;

    fn hit(path: &str, ordinal: usize, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("{}-{}", path, ordinal),
            source: SourceRef {
                path: path.into(),
                title: format!("Title of {}", path),
                category: "runbook".into(),
                tags: vec![],
            },
            heading_path: vec!["Guide".into(), format!("Step {}", ordinal)],
            text: text.into(),
            ordinals: vec![ordinal],
            distance: 0.1,
        }
    }

    #[test]
    fn renders_source_header() {
        let block = render_source(2, &hit("/a.md", 1, "body"));
        assert_eq!(block, "### Source 2: Guide > Step 1 [runbook]\n\nbody");
    }

    #[test]
    fn prompt_contains_question_and_sources_in_order() {
        let plan = build_prompt(
            "How do I restart?",
            &[hit("/a.md", 0, "first"), hit("/b.md", 2, "second")],
            10_000,
        );
        assert_eq!(plan.included, 2);
        let first = plan.prompt.find("### Source 1").unwrap();
        let second = plan.prompt.find("### Source 2").unwrap();
        assert!(first < second);
        assert!(plan.prompt.contains("How do I restart?"));
    }

    #[test]
    fn budget_limits_sources_but_keeps_first() {
        let big = "x".repeat(500);
        let hits = vec![hit("/a.md", 0, &big), hit("/b.md", 0, &big)];
        let plan = build_prompt("q", &hits, 100);
        assert_eq!(plan.included, 1);
        assert_eq!(plan.citations.len(), 1);
        assert_eq!(plan.citations[0].path, "/a.md");
        assert!(!plan.prompt.contains("### Source 2"));
    }

    #[test]
    fn citations_group_by_document_in_first_appearance_order() {
        let hits = vec![
            hit("/b.md", 3, "x"),
            hit("/a.md", 0, "y"),
            hit("/b.md", 1, "z"),
        ];
        let cites = citations(&hits);
        assert_eq!(cites.len(), 2);
        assert_eq!(cites[0].path, "/b.md");
        assert_eq!(cites[0].ordinals, vec![1, 3]);
        assert_eq!(cites[1].path, "/a.md");
    }
}
