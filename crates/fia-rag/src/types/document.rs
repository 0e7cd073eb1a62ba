//! Document and chunk types with source tracking for citations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use uuid::Uuid;

/// A document handed to the pipeline by the extraction layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Original filename as uploaded by user
    pub source_filename: String,
    /// Extracted plain text
    pub raw_text: String,
    /// Upload timestamp
    pub upload_timestamp: DateTime<Utc>,
}

impl Document {
    /// Create a new document with a fresh id, stamped now
    pub fn new(source_filename: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), source_filename, raw_text)
    }

    /// Create a document with a caller-assigned id
    pub fn with_id(
        id: Uuid,
        source_filename: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            source_filename: source_filename.into(),
            raw_text: raw_text.into(),
            upload_timestamp: Utc::now(),
        }
    }

    /// Length of the text in characters
    pub fn char_count(&self) -> usize {
        self.raw_text.chars().count()
    }
}

/// A chunk of text from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk ID, derived from the document id and sequence index
    pub id: Uuid,
    /// Parent document ID (back-reference)
    pub document_id: Uuid,
    /// Position of the chunk within its document
    pub sequence_index: u32,
    /// Source filename, carried for citations
    pub source_filename: String,
    /// Text content, exactly `document.raw_text[char_start..char_end]`
    pub text: String,
    /// Character offsets in the original document
    pub char_start: usize,
    pub char_end: usize,
}

impl Chunk {
    /// Create a new chunk of `document`
    pub fn new(document: &Document, sequence_index: u32, text: String, chars: Range<usize>) -> Self {
        Self {
            id: Self::derive_id(&document.id, sequence_index),
            document_id: document.id,
            sequence_index,
            source_filename: document.source_filename.clone(),
            text,
            char_start: chars.start,
            char_end: chars.end,
        }
    }

    /// Stable chunk id for `(document_id, sequence_index)`.
    ///
    /// Re-chunking the same document yields the same ids, so indexing it twice is
    /// detected as a duplicate instead of silently doubling the corpus.
    pub fn derive_id(document_id: &Uuid, sequence_index: u32) -> Uuid {
        Uuid::new_v5(document_id, &sequence_index.to_be_bytes())
    }

    /// Character range in the original document
    pub fn char_range(&self) -> Range<usize> {
        self.char_start..self.char_end
    }

    /// Format source for display
    pub fn format_source(&self) -> String {
        format!("{}, part {}", self.source_filename, self.sequence_index + 1)
    }
}

/// Registry entry for an ingested document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub source_filename: String,
    pub upload_timestamp: DateTime<Utc>,
    /// Number of chunks indexed for the document
    pub chunk_count: usize,
    /// Length of the raw text in characters
    pub text_chars: usize,
}

impl DocumentRecord {
    pub fn new(document: &Document, chunk_count: usize) -> Self {
        Self {
            id: document.id,
            source_filename: document.source_filename.clone(),
            upload_timestamp: document.upload_timestamp,
            chunk_count,
            text_chars: document.char_count(),
        }
    }
}
