//! Provider abstractions for embeddings and LLM generation
//!
//! Backends are selected once, from configuration, and handed to the pipeline as
//! trait objects.

pub mod embedding;
pub mod hashing;
pub mod llm;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use crate::config::{EmbeddingBackend, EmbeddingConfig, GenerationBackend, LlmConfig};
use crate::error::Result;

pub use embedding::EmbeddingProvider;
pub use hashing::HashingEmbedder;
pub use llm::{GenerationRequest, LlmProvider};
pub use ollama::{OllamaEmbedder, OllamaLlm};
pub use openai::OpenAiCompatibleLlm;

/// Build the configured embedding backend
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.backend {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.dimensions)?),
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(config)?),
    };

    tracing::info!(
        "Embedding provider: {} ({} dimensions)",
        embedder.name(),
        embedder.dimensions()
    );
    Ok(embedder)
}

/// Build the configured generation backend
pub fn build_llm(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let llm: Arc<dyn LlmProvider> = match config.backend {
        GenerationBackend::OpenAiCompatible => Arc::new(OpenAiCompatibleLlm::new(config)?),
        GenerationBackend::Ollama => Arc::new(OllamaLlm::new(config)?),
    };

    tracing::info!("LLM provider: {} ({})", llm.name(), llm.model());
    Ok(llm)
}
