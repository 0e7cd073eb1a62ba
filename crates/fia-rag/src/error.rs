//! Error types for the RAG pipeline

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Document text is empty or whitespace-only
    #[error("Document {0} has no text to index")]
    EmptyDocument(Uuid),

    /// Chunk id is already present in the index
    #[error("Chunk {chunk_id} of document {document_id} is already indexed")]
    DuplicateChunk { chunk_id: Uuid, document_id: Uuid },

    /// Embedding backend failed or returned an unusable vector
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Generation backend failed
    #[error("Generation backend error: {0}")]
    GenerationBackend(String),

    /// Backend call exceeded its configured deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Internal index invariant violated. Indicates a bug, never a transient condition.
    #[error("Index corruption: {0}")]
    IndexCorruption(String),

    /// Vector length does not match the index dimension
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Admission control rejected the call
    #[error("Too many in-flight operations (limit {limit}), try again later")]
    Overloaded { limit: usize },

    /// Caller supplied unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a generation backend error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationBackend(message.into())
    }

    /// Create an index corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::IndexCorruption(message.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Map a failed backend HTTP exchange. The client's own request timeout
    /// becomes [`Error::Timeout`]; everything else goes through `otherwise`.
    pub fn from_request(
        err: reqwest::Error,
        operation: &'static str,
        after: Duration,
        otherwise: impl FnOnce(reqwest::Error) -> Error,
    ) -> Self {
        if err.is_timeout() {
            Self::timeout(operation, after)
        } else {
            otherwise(err)
        }
    }

    /// Whether a caller-side retry policy may reasonably try again.
    ///
    /// The pipeline itself never retries; see [`crate::policy::RetryPolicy`].
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Embedding(_)
                | Error::GenerationBackend(_)
                | Error::Timeout { .. }
                | Error::Overloaded { .. }
                | Error::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::embedding("down").is_transient());
        assert!(Error::generation("502").is_transient());
        assert!(Error::timeout("generation", Duration::from_secs(1)).is_transient());
        assert!(Error::Overloaded { limit: 2 }.is_transient());

        assert!(!Error::EmptyDocument(Uuid::nil()).is_transient());
        assert!(!Error::corruption("slot missing").is_transient());
        assert!(!Error::Config("API key not configured".to_string()).is_transient());
        assert!(!Error::DuplicateChunk {
            chunk_id: Uuid::nil(),
            document_id: Uuid::nil(),
        }
        .is_transient());
    }

    #[test]
    fn test_timeout_message_names_operation() {
        let err = Error::timeout("embedding", Duration::from_millis(250));
        assert_eq!(err.to_string(), "embedding timed out after 250ms");
    }
}
