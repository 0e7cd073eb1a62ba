//! Configuration for the RAG pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main RAG configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Generation backend configuration
    pub llm: LlmConfig,
    /// Vector index configuration
    pub index: IndexConfig,
    /// Admission control, timeouts and query defaults
    pub service: ServiceConfig,
    /// Prompt building and citation extraction
    pub composer: ComposerConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file. Missing sections fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: RagConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of file/default values.
    ///
    /// - `FIA_RAG_API_KEY` or `DEEPSEEK_API_KEY`: generation API key
    /// - `FIA_RAG_LLM_BASE_URL`: generation backend base URL
    /// - `FIA_RAG_INDEX_PATH`: corpus snapshot location
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = std::env::var("FIA_RAG_API_KEY")
            .ok()
            .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
        {
            self.llm.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("FIA_RAG_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(path) = std::env::var("FIA_RAG_INDEX_PATH") {
            self.index.storage_path = PathBuf::from(path);
        }
    }

    /// Reject inconsistent settings before any component is built
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be positive".to_string()));
        }
        if self.service.default_top_k == 0 {
            return Err(Error::Config("service.default_top_k must be positive".to_string()));
        }
        if self.service.max_in_flight == Some(0) {
            return Err(Error::Config("service.max_in_flight must be positive".to_string()));
        }
        if self.composer.context_char_budget == 0 {
            return Err(Error::Config(
                "composer.context_char_budget must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.composer.citation_similarity_threshold) {
            return Err(Error::Config(
                "composer.citation_similarity_threshold must be within 0.0..=1.0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::Config("llm.temperature must be within 0.0..=2.0".to_string()));
        }

        Ok(())
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub max_chunk_chars: usize,
    /// Overlap between consecutive chunks in characters
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 1000,
            overlap_chars: 200,
        }
    }
}

impl ChunkingConfig {
    /// Check size/overlap consistency
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_chars == 0 {
            return Err(Error::Config("chunking.max_chunk_chars must be positive".to_string()));
        }
        if self.overlap_chars >= self.max_chunk_chars {
            return Err(Error::Config(format!(
                "chunking.overlap_chars ({}) must be smaller than max_chunk_chars ({})",
                self.overlap_chars, self.max_chunk_chars
            )));
        }
        Ok(())
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Offline feature-hashing embedder
    #[default]
    Hashing,
    /// Ollama embeddings endpoint
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend to use
    pub backend: EmbeddingBackend,
    /// Embedding dimensions (768 matches nomic-embed-text)
    pub dimensions: usize,
    /// Model name (Ollama backend)
    pub model: String,
    /// Ollama base URL (Ollama backend)
    pub base_url: String,
    /// HTTP request timeout in seconds (Ollama backend)
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            dimensions: 768,
            model: "nomic-embed-text".to_string(),
            base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Generation backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationBackend {
    /// OpenAI-compatible `/chat/completions` API (DeepSeek by default)
    #[default]
    OpenAiCompatible,
    /// Local Ollama server
    Ollama,
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend to use
    pub backend: GenerationBackend,
    /// Base URL of the backend API
    pub base_url: String,
    /// Generation model name
    pub model: String,
    /// API key (OpenAI-compatible backend). Never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::OpenAiCompatible,
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: None,
            temperature: 0.3, // Lower for more factual answers
            max_tokens: 1500,
            request_timeout_secs: 30,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Where the corpus snapshot is persisted between runs
    pub storage_path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let storage_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fia-rag")
            .join("corpus.json");

        Self { storage_path }
    }
}

/// Service-level limits and defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Concurrent ingest/ask operations (default: CPU count, max 8)
    pub max_in_flight: Option<usize>,
    /// How long a call waits for an admission permit before failing
    pub admission_wait_ms: u64,
    /// Deadline for a single embedding call
    pub embedding_timeout_secs: u64,
    /// Deadline for composing an answer (generation call included)
    pub generation_timeout_secs: u64,
    /// Passages retrieved per question when the caller does not say
    pub default_top_k: usize,
    /// Hits scoring at or below this are discarded before composing
    pub min_similarity: f32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_in_flight: None,
            admission_wait_ms: 5_000,
            embedding_timeout_secs: 30,
            generation_timeout_secs: 30,
            default_top_k: 5,
            min_similarity: 0.0,
        }
    }
}

impl ServiceConfig {
    /// Effective admission limit
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
            .unwrap_or_else(|| num_cpus::get().min(8))
            .max(1)
    }

    pub fn admission_wait(&self) -> Duration {
        Duration::from_millis(self.admission_wait_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

/// Prompt context budget and citation matching thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Maximum characters of passage text placed in the prompt
    pub context_char_budget: usize,
    /// A passage is truncated into the budget only if at least this many characters remain
    pub min_passage_chars: usize,
    /// Minimum length of a verbatim span for it to count as a quote
    pub min_quote_chars: usize,
    /// Sentence/passage cosine similarity above which a paraphrase counts as a citation
    pub citation_similarity_threshold: f32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            context_char_budget: 2000,
            min_passage_chars: 100,
            min_quote_chars: 20,
            citation_similarity_threshold: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.embeddings.dimensions, 768);
        assert_eq!(config.chunking.max_chunk_chars, 1000);
        assert_eq!(config.llm.backend, GenerationBackend::OpenAiCompatible);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RagConfig::from_toml_str(
            r#"
            [chunking]
            max_chunk_chars = 400
            overlap_chars = 40

            [embeddings]
            backend = "ollama"

            [llm]
            backend = "ollama"
            base_url = "http://localhost:11434"
            model = "phi3"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.max_chunk_chars, 400);
        assert_eq!(config.embeddings.backend, EmbeddingBackend::Ollama);
        assert_eq!(config.embeddings.dimensions, 768);
        assert_eq!(config.llm.model, "phi3");
        assert_eq!(config.service.default_top_k, 5);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let result = RagConfig::from_toml_str(
            r#"
            [chunking]
            max_chunk_chars = 100
            overlap_chars = 100
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_context_budget_is_rejected() {
        let result = RagConfig::from_toml_str(
            r#"
            [composer]
            context_char_budget = 0
            "#,
        );
        assert!(matches!(result, Err(Error::Config(ref m)) if m.contains("context_char_budget")));
    }

    #[test]
    fn test_malformed_toml_is_reported() {
        let result = RagConfig::from_toml_str("[chunking\nmax_chunk_chars = 1");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let mut config = RagConfig::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_max_in_flight_floor() {
        let service = ServiceConfig {
            max_in_flight: Some(3),
            ..Default::default()
        };
        assert_eq!(service.max_in_flight(), 3);
        assert!(ServiceConfig::default().max_in_flight() >= 1);
    }
}
