//! Document ingestion: text extraction and chunking

mod chunker;
mod extract;

pub use chunker::{reassemble, TextChunker};
pub use extract::{ExtractedText, PlainTextExtractor, TextExtractor};
