//! Grounded answer composition

use std::sync::Arc;

use crate::config::ComposerConfig;
use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::types::{Answer, QueryResult};

use super::citation::CitationExtractor;
use super::prompt::PromptBuilder;

/// Turns retrieved passages and a question into a cited answer
pub struct AnswerComposer {
    llm: Arc<dyn LlmProvider>,
    prompts: PromptBuilder,
    citations: CitationExtractor,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &ComposerConfig) -> Result<Self> {
        Ok(Self {
            llm,
            prompts: PromptBuilder::new(config),
            citations: CitationExtractor::new(config)?,
        })
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Compose an answer from the retrieved passages.
    ///
    /// With nothing retrieved, or no passage fitting the context budget, the fixed
    /// "insufficient information" answer is returned and the generation backend is
    /// not called.
    pub async fn compose(&self, question: &str, result: &QueryResult) -> Result<Answer> {
        if result.is_empty() {
            tracing::debug!("No passages retrieved, answering without generation");
            return Ok(Answer::insufficient_information());
        }

        let built = self.prompts.build(question, result);
        if built.passages == 0 {
            tracing::warn!(
                "None of {} retrieved passages fit the context budget, answering without generation",
                result.len()
            );
            return Ok(Answer::insufficient_information());
        }
        tracing::debug!(
            "Prompting {} ({}) with {} of {} passages",
            self.llm.name(),
            self.llm.model(),
            built.passages,
            result.len()
        );

        let completion = self.llm.complete(&built.request).await.map_err(|e| match e {
            Error::GenerationBackend(_) | Error::Timeout { .. } | Error::Config(_) => e,
            other => Error::generation(other.to_string()),
        })?;

        let text = completion.trim().to_string();
        if text.is_empty() {
            return Err(Error::generation("backend returned an empty completion"));
        }

        let cited_chunk_ids = self.citations.extract(&text, result, built.passages);
        let confidence = confidence(result, &cited_chunk_ids);

        Ok(Answer {
            text,
            cited_chunk_ids,
            confidence,
        })
    }
}

/// Mean retrieval score of the cited passages, within 0.0..=1.0
fn confidence(result: &QueryResult, cited: &[uuid::Uuid]) -> f32 {
    let scores: Vec<f32> = result
        .iter()
        .filter(|hit| cited.contains(&hit.chunk.id))
        .map(|hit| hit.score)
        .collect();

    if scores.is_empty() {
        return 0.0;
    }
    (scores.iter().sum::<f32>() / scores.len() as f32).clamp(0.0, 1.0)
}
