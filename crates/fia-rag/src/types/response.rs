//! Response types for RAG queries and corpus maintenance

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Chunk;

/// Text of the answer returned when retrieval finds nothing to ground on
pub const INSUFFICIENT_INFORMATION: &str =
    "Insufficient information: no indexed passage is relevant to this question.";

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Cosine similarity (-1.0..=1.0, higher is more similar)
    pub score: f32,
}

/// Ordered search hits, best first, at most `k` long
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub hits: Vec<ScoredChunk>,
}

impl QueryResult {
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredChunk> {
        self.hits.iter()
    }

    /// Chunk ids in rank order
    pub fn chunk_ids(&self) -> Vec<Uuid> {
        self.hits.iter().map(|h| h.chunk.id).collect()
    }

    /// Drop hits scoring at or below `min_score`
    pub fn above(mut self, min_score: f32) -> Self {
        self.hits.retain(|h| h.score > min_score);
        self
    }
}

/// Synthesized answer with the chunks it draws on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Generated answer text
    pub text: String,
    /// Retrieved chunks referenced by the answer, in retrieval order
    pub cited_chunk_ids: Vec<Uuid>,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
}

impl Answer {
    /// Deterministic answer for questions with nothing to ground on
    pub fn insufficient_information() -> Self {
        Self {
            text: INSUFFICIENT_INFORMATION.to_string(),
            cited_chunk_ids: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn is_insufficient_information(&self) -> bool {
        self.cited_chunk_ids.is_empty() && self.text == INSUFFICIENT_INFORMATION
    }
}

/// Result of ingesting one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub document_id: Uuid,
    pub inserted_chunk_count: usize,
}

/// Result of deleting one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub document_id: Uuid,
    pub removed_count: usize,
}

/// Corpus statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStatus {
    /// Documents registered with the service
    pub document_count: usize,
    /// Chunks belonging to registered documents
    pub chunk_count: usize,
    /// Entries held by the vector index
    pub index_size: usize,
    /// Total characters across registered documents
    pub total_text_chars: usize,
    pub average_chunks_per_document: f32,
}
