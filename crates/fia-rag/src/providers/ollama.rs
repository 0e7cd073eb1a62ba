//! Provider trait implementations over a local Ollama server

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::generation::OllamaClient;

use super::embedding::EmbeddingProvider;
use super::llm::{GenerationRequest, LlmProvider};

fn client_for(base_url: &str, timeout_secs: u64) -> Result<Arc<OllamaClient>> {
    Ok(Arc::new(OllamaClient::new(base_url, Duration::from_secs(timeout_secs))?))
}

/// Embeddings from `/api/embeddings` (nomic-embed-text by default).
///
/// A vector whose length differs from the configured dimension is rejected, so a
/// model swap never reaches the index.
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    dimensions: usize,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = client_for(&config.base_url, config.request_timeout_secs)?;
        Ok(Self::from_client(client, config))
    }

    /// Share one connection pool with an [`OllamaLlm`]
    pub fn from_client(client: Arc<OllamaClient>, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            dimensions: config.dimensions,
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.client.embed(&self.model, text).await?;
        if embedding.len() != self.dimensions {
            return Err(Error::embedding(format!(
                "model '{}' returned {} dimensions, configured for {}",
                self.model,
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Completions from `/api/generate`, system prompt and question sent separately
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaLlm {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = client_for(&config.base_url, config.request_timeout_secs)?;
        Ok(Self::from_client(client, config))
    }

    pub fn from_client(client: Arc<OllamaClient>, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        self.client
            .generate(
                &self.model,
                &request.system,
                &request.prompt,
                self.temperature,
                self.max_tokens,
            )
            .await
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // nothing listens on the discard port
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    /// Address of a server that accepts connections and never answers
    async fn stalled_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unhealthy() {
        let config = EmbeddingConfig {
            base_url: UNREACHABLE.to_string(),
            request_timeout_secs: 2,
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        assert!(!embedder.health_check().await.unwrap());
        assert_eq!(embedder.dimensions(), config.dimensions);
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_with_transient_errors() {
        let client = client_for(UNREACHABLE, 2).unwrap();
        let embedder = OllamaEmbedder::from_client(client.clone(), &EmbeddingConfig::default());
        let llm = OllamaLlm::from_client(client, &LlmConfig::default());

        let err = embedder.embed("revenue").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert!(err.is_transient());

        let request = GenerationRequest {
            system: "Answer briefly.".to_string(),
            prompt: "What was revenue?".to_string(),
        };
        let err = llm.complete(&request).await.unwrap_err();
        assert!(matches!(err, Error::GenerationBackend(_)));
    }

    #[tokio::test]
    async fn test_client_timeout_is_reported_as_timeout() {
        let client = client_for(&stalled_server().await, 1).unwrap();
        let embedder = OllamaEmbedder::from_client(client.clone(), &EmbeddingConfig::default());
        let llm = OllamaLlm::from_client(client, &LlmConfig::default());

        let err = embedder.embed("revenue").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout { operation: "embedding", after } if after == Duration::from_secs(1)
        ));

        let request = GenerationRequest {
            system: String::new(),
            prompt: "What was revenue?".to_string(),
        };
        let err = llm.complete(&request).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { operation: "generation", .. }));
    }
}
