//! Ingest-time indexing and query-time retrieval

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::ingestion::TextChunker;
use crate::providers::EmbeddingProvider;
use crate::types::{Chunk, Document, QueryResult};

/// Couples the chunker, the embedding backend and the vector index
pub struct Retriever {
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    /// Deadline for a single embedding call
    embedding_timeout: Duration,
}

impl Retriever {
    /// Create a retriever. The embedder and the index must agree on the dimension.
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        embedding_timeout: Duration,
    ) -> Result<Self> {
        if embedder.dimensions() != index.dimension() {
            return Err(Error::Config(format!(
                "embedding provider '{}' produces {} dimensions but the index holds {}",
                embedder.name(),
                embedder.dimensions(),
                index.dimension()
            )));
        }

        Ok(Self {
            chunker,
            embedder,
            index,
            embedding_timeout,
        })
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Chunk, embed and index a document. Returns the number of chunks inserted.
    ///
    /// Chunks are embedded in order and published together once all embeddings
    /// succeeded, so a failure at any point leaves the index exactly as it was.
    pub async fn ingest(&self, document: &Document) -> Result<usize> {
        let entries = self.embed_document(document).await?;
        self.publish(document, entries)
    }

    /// Chunk and embed a document without touching the index
    pub async fn embed_document(&self, document: &Document) -> Result<Vec<(Chunk, Vec<f32>)>> {
        let chunks = self.chunker.chunk(document)?;

        if let Some(first) = chunks.first() {
            if self.index.contains_chunk(&first.id) {
                return Err(Error::DuplicateChunk {
                    chunk_id: first.id,
                    document_id: document.id,
                });
            }
        }

        let total = chunks.len();
        let mut entries = Vec::with_capacity(total);
        for chunk in chunks {
            let embedding = match self.embed(&chunk.text).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    tracing::warn!(
                        "Ingestion of {} aborted at chunk {}/{}; nothing was indexed: {}",
                        document.source_filename,
                        chunk.sequence_index + 1,
                        total,
                        e
                    );
                    return Err(e);
                }
            };
            tracing::debug!("Embedded chunk {} of {}", chunk.sequence_index, document.id);
            entries.push((chunk, embedding));
        }
        Ok(entries)
    }

    /// Publish embedded chunks of one document in a single index write
    pub fn publish(&self, document: &Document, entries: Vec<(Chunk, Vec<f32>)>) -> Result<usize> {
        let inserted = self.index.insert_document(entries)?;
        tracing::info!(
            "Indexed {} ({} chunks, document {})",
            document.source_filename,
            inserted,
            document.id
        );
        Ok(inserted)
    }

    /// Embed a question into the passage embedding space
    pub async fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        self.embed(question).await
    }

    /// Nearest chunks to an already embedded query
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<QueryResult> {
        self.index.search(query_vector, k)
    }

    /// Embed the question and search the index
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<QueryResult> {
        let query_vector = self.embed_query(question).await?;
        self.search(&query_vector, k)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = timeout(self.embedding_timeout, self.embedder.embed(text))
            .await
            .map_err(|_| Error::timeout("embedding", self.embedding_timeout))??;

        if embedding.len() != self.index.dimension() {
            return Err(Error::embedding(format!(
                "{} returned a {}-dimensional vector, expected {}",
                self.embedder.name(),
                embedding.len(),
                self.index.dimension()
            )));
        }
        Ok(embedding)
    }
}
