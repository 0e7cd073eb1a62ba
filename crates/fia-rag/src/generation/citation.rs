//! Citation extraction: which retrieved passages an answer actually draws on

use regex::Regex;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::config::ComposerConfig;
use crate::error::{Error, Result};
use crate::index::distance::dot;
use crate::providers::HashingEmbedder;
use crate::types::QueryResult;

/// Buckets used for sentence/passage similarity. Independent of the index embedder.
const SIMILARITY_DIMENSIONS: usize = 1024;

/// Links an answer back to the passages it references
pub struct CitationExtractor {
    marker: Regex,
    min_quote_chars: usize,
    similarity_threshold: f32,
    embedder: HashingEmbedder,
}

impl CitationExtractor {
    pub fn new(config: &ComposerConfig) -> Result<Self> {
        // [1], [1, 3], [Source 2], [source: 2]
        let marker = Regex::new(r"(?i)\[(?:source:?\s*)?(\d+(?:\s*,\s*\d+)*)\]")
            .map_err(|e| Error::internal(format!("citation pattern: {}", e)))?;

        Ok(Self {
            marker,
            min_quote_chars: config.min_quote_chars.max(1),
            similarity_threshold: config.citation_similarity_threshold,
            embedder: HashingEmbedder::new(SIMILARITY_DIMENSIONS)?,
        })
    }

    /// Ids of the first `passages` hits the answer references, in retrieval order.
    ///
    /// A passage counts as cited when the answer names its number, shares a verbatim
    /// span of at least `min_quote_chars` normalised characters with it, or contains a
    /// sentence whose similarity to it reaches the threshold.
    pub fn extract(&self, answer: &str, result: &QueryResult, passages: usize) -> Vec<Uuid> {
        let passages = passages.min(result.len());
        if passages == 0 || answer.trim().is_empty() {
            return Vec::new();
        }

        let numbered = self.numbered(answer, passages);
        let normalised_answer = normalise(answer);
        let quote_windows = windows(&normalised_answer, self.min_quote_chars);
        let sentences: Vec<Vec<f32>> = answer
            .split_sentence_bounds()
            .filter(|s| !s.trim().is_empty())
            .map(|s| self.embedder.embed_text(s))
            .collect();

        result
            .iter()
            .take(passages)
            .enumerate()
            .filter(|(i, hit)| {
                numbered.contains(&(i + 1))
                    || self.quotes(&quote_windows, &hit.chunk.text)
                    || self.paraphrases(&sentences, &hit.chunk.text)
            })
            .map(|(_, hit)| hit.chunk.id)
            .collect()
    }

    /// Passage numbers referenced by markers, limited to `1..=passages`
    fn numbered(&self, answer: &str, passages: usize) -> HashSet<usize> {
        self.marker
            .captures_iter(answer)
            .filter_map(|cap| cap.get(1))
            .flat_map(|m| m.as_str().split(','))
            .filter_map(|n| n.trim().parse::<usize>().ok())
            .filter(|n| (1..=passages).contains(n))
            .collect()
    }

    fn quotes(&self, answer_windows: &HashSet<String>, passage: &str) -> bool {
        if answer_windows.is_empty() {
            return false;
        }
        let passage = normalise(passage);
        windows(&passage, self.min_quote_chars)
            .iter()
            .any(|w| answer_windows.contains(w))
    }

    fn paraphrases(&self, sentences: &[Vec<f32>], passage: &str) -> bool {
        let passage = self.embedder.embed_text(passage);
        sentences
            .iter()
            .any(|sentence| dot(sentence, &passage) >= self.similarity_threshold)
    }
}

/// Lower-case with whitespace runs collapsed to one space
fn normalise(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Every substring of exactly `len` characters
fn windows(text: &str, len: usize) -> HashSet<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < len {
        return HashSet::new();
    }
    chars.windows(len).map(|w| w.iter().collect()).collect()
}
