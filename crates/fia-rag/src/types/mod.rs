//! Core types for the RAG pipeline

pub mod document;
pub mod query;
pub mod response;

pub use document::{Chunk, Document, DocumentRecord};
pub use query::{QueryStage, QueryTrace};
pub use response::{
    Answer, CorpusStatus, DeleteOutcome, IngestOutcome, QueryResult, ScoredChunk,
};
