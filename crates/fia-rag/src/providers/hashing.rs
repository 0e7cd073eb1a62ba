//! Offline feature-hashing embedder
//!
//! Maps unigram and bigram features into a fixed number of signed buckets and
//! L2-normalises the result. Needs no model download and no network, and is fully
//! deterministic, which makes it the default backend and the one tests run against.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::hash::Hasher;
use twox_hash::XxHash64;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;

const BIGRAM_WEIGHT: f32 = 0.5;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "how",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were",
    "what", "when", "where", "which", "who", "why", "with",
];

/// Deterministic bag-of-features embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Config("embedding dimensions must be positive".to_string()));
        }
        Ok(Self { dimensions })
    }

    /// Embed synchronously. Text without any features yields the zero vector.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for (feature, weight) in features(&tokenize(text)) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(feature.as_bytes());
            let hash = hasher.finish();

            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign * weight;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Lower-cased word tokens. CJK ideographs are one token each, numbers become
/// `NUM_<digits>` and common function words are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tokens = Vec::new();

    for word in lowered.unicode_words() {
        if !word.chars().any(is_cjk) {
            push_token(&mut tokens, word);
            continue;
        }

        let mut run = String::new();
        for c in word.chars() {
            if is_cjk(c) {
                push_token(&mut tokens, &run);
                run.clear();
                tokens.push(c.to_string());
            } else {
                run.push(c);
            }
        }
        push_token(&mut tokens, &run);
    }

    tokens
}

fn push_token(tokens: &mut Vec<String>, word: &str) {
    if word.is_empty() || STOP_WORDS.contains(&word) {
        return;
    }

    let numeric = word.starts_with(|c: char| c.is_ascii_digit())
        && word.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',');
    if numeric {
        tokens.push(format!("NUM_{}", word.replace(',', "")));
    } else {
        tokens.push(word.to_string());
    }
}

/// Weighted unigram and bigram features, ordered for reproducible accumulation
fn features(tokens: &[String]) -> BTreeMap<String, f32> {
    let mut counts: BTreeMap<String, (u32, f32)> = BTreeMap::new();

    for token in tokens {
        counts.entry(format!("u:{}", token)).or_insert((0, 1.0)).0 += 1;
    }
    for pair in tokens.windows(2) {
        counts
            .entry(format!("b:{} {}", pair[0], pair[1]))
            .or_insert((0, BIGRAM_WEIGHT))
            .0 += 1;
    }

    counts
        .into_iter()
        .map(|(feature, (count, base))| (feature, base * (1.0 + (count as f32).ln())))
        .collect()
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF     // Hiragana, Katakana
        | 0x3400..=0x4DBF   // CJK Extension A
        | 0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0xAC00..=0xD7AF   // Hangul syllables
        | 0xF900..=0xFAFF   // CJK Compatibility Ideographs
        | 0x20000..=0x2A6DF)
}
