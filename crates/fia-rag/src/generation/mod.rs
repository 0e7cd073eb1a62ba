//! Answer generation with LLM and citation handling

pub mod citation;
mod composer;
pub mod ollama;
pub mod prompt;

pub use citation::CitationExtractor;
pub use composer::AnswerComposer;
pub use ollama::OllamaClient;
pub use prompt::{BuiltPrompt, PromptBuilder};
