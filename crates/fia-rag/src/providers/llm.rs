//! LLM provider trait for generating answers

use async_trait::async_trait;
use crate::error::Result;

/// A fully built prompt for a generation backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Instructions and grounding context
    pub system: String,
    /// The user's question
    pub prompt: String,
}

/// Trait for LLM-based answer generation
///
/// Implementations:
/// - `OpenAiCompatibleLlm`: any `/chat/completions` API (DeepSeek by default)
/// - `OllamaLlm`: Local Ollama server (phi3, llama3, etc.)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Return the backend's completion for the request. Failures surface as
    /// `Error::GenerationBackend`.
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
