//! fia-rag: retrieval-augmented question answering with cited sources
//!
//! Documents are split into overlapping chunks, embedded and held in an exact
//! cosine-similarity index. Questions retrieve the closest chunks, which ground a
//! generated answer that cites the passages it used.

pub mod config;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod policy;
pub mod providers;
pub mod reports;
pub mod retrieval;
pub mod service;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use policy::RetryPolicy;
pub use service::RagService;
pub use types::{Answer, Chunk, CorpusStatus, Document, QueryResult};
