//! Embedding backend contract

use async_trait::async_trait;
use crate::error::Result;

/// Maps text to a fixed-length vector.
///
/// Chunks at ingest time and questions at query time go through the same
/// provider, so both land in one embedding space. Identical input must yield an
/// identical vector, and every vector has exactly [`dimensions`] entries.
///
/// Backends: [`HashingEmbedder`] (offline, no model) and [`OllamaEmbedder`].
///
/// [`dimensions`]: EmbeddingProvider::dimensions
/// [`HashingEmbedder`]: super::HashingEmbedder
/// [`OllamaEmbedder`]: super::OllamaEmbedder
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Backend failures surface as `Error::Embedding`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Vector length; the index is sized from this
    fn dimensions(&self) -> usize;

    async fn health_check(&self) -> Result<bool>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}
