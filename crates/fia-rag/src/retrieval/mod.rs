//! Retrieval: indexing documents and finding passages for a question

mod retriever;

pub use retriever::Retriever;
