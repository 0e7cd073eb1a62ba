//! Prompt templates for RAG generation

use crate::config::ComposerConfig;
use crate::providers::GenerationRequest;
use crate::types::QueryResult;

/// A prompt plus how many retrieved passages made it into the context
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub request: GenerationRequest,
    /// Passages `1..=passages` of the query result are in the prompt
    pub passages: usize,
}

/// Prompt builder for RAG queries
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    /// Characters of passage text allowed in the context
    context_char_budget: usize,
    /// A passage is cut to fit only if this many characters remain
    min_passage_chars: usize,
}

impl PromptBuilder {
    pub fn new(config: &ComposerConfig) -> Self {
        Self {
            context_char_budget: config.context_char_budget,
            min_passage_chars: config.min_passage_chars,
        }
    }

    /// Numbered passages in score order, within the character budget.
    /// Returns the context and the number of passages it holds.
    pub fn build_context(&self, result: &QueryResult) -> (String, usize) {
        let mut context = String::new();
        let mut used = 0usize;
        let mut passages = 0usize;

        for hit in result.iter() {
            let len = hit.chunk.text.chars().count();
            let remaining = self.context_char_budget.saturating_sub(used);

            let text = if len <= remaining {
                hit.chunk.text.clone()
            } else if remaining > self.min_passage_chars || (passages == 0 && remaining > 0) {
                let cut: String = hit.chunk.text.chars().take(remaining).collect();
                format!("{}...", cut.trim_end())
            } else {
                break;
            };

            passages += 1;
            used += len.min(remaining);
            context.push_str(&format!(
                "[{}] {}\n{}\n\n---\n\n",
                passages,
                hit.chunk.format_source(),
                text.trim()
            ));

            if len > remaining {
                break;
            }
        }

        (context, passages)
    }

    /// Build the full RAG prompt with strict grounding
    pub fn build(&self, question: &str, result: &QueryResult) -> BuiltPrompt {
        let (context, passages) = self.build_context(result);

        let system = format!(
            r#"You are a document-grounded financial analysis assistant that ONLY uses information from the provided documents.

CRITICAL GROUNDING RULES - YOU MUST FOLLOW THESE EXACTLY:
1. ONLY use information that is EXPLICITLY stated in the CONTEXT below
2. If the answer is not in the context: respond with "This information is not available in the provided documents."
3. NEVER use external knowledge, general knowledge, or training data
4. Every fact MUST cite the passage it comes from by its number, e.g. [1] or [2][3]
5. Be precise and professional, and quote the figures the documents give

CONTEXT FROM DOCUMENTS:
{context}"#,
            context = context.trim_end()
        );

        BuiltPrompt {
            request: GenerationRequest {
                system,
                prompt: question.trim().to_string(),
            },
            passages,
        }
    }
}
