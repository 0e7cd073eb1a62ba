//! The pipeline as exposed to the surrounding service layer

mod rag;

pub use rag::RagService;
