//! Text chunking on paragraph and sentence boundaries with character overlap

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

/// Sentence terminators not covered by Unicode sentence segmentation in practice
const CJK_TERMINATORS: [char; 3] = ['。', '！', '？'];

/// Text chunker with configurable size and overlap.
///
/// All sizes and offsets are counted in characters. Every chunk's text is exactly
/// `raw_text[char_start..char_end]`, so the corpus can always be traced back to the
/// document it came from.
pub struct TextChunker {
    /// Maximum chunk size in characters
    max_chars: usize,
    /// Overlap between consecutive chunks
    overlap: usize,
    paragraph_break: Regex,
}

impl TextChunker {
    /// Create a new chunker. Fails if `overlap_chars >= max_chunk_chars`.
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;
        let paragraph_break = Regex::new(r"\n[ \t]*\n\s*")
            .map_err(|e| Error::internal(format!("paragraph pattern: {}", e)))?;

        Ok(Self {
            max_chars: config.max_chunk_chars,
            overlap: config.overlap_chars,
            paragraph_break,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split a document into ordered, overlapping chunks
    pub fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let text = document.raw_text.as_str();
        if text.trim().is_empty() {
            return Err(Error::EmptyDocument(document.id));
        }

        let layout = TextLayout::new(text, &self.paragraph_break);
        let total = layout.char_len();

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut sequence_index = 0u32;

        loop {
            let end = self.chunk_end(&layout, start);
            chunks.push(Chunk::new(
                document,
                sequence_index,
                layout.slice(start, end).to_string(),
                start..end,
            ));
            sequence_index += 1;

            if end >= total {
                break;
            }
            start = self.next_start(&layout, start, end);
        }

        tracing::debug!(
            "Chunked document {} ({} chars) into {} chunks",
            document.id,
            total,
            chunks.len()
        );

        Ok(chunks)
    }

    /// End (exclusive) of the chunk beginning at `start`
    fn chunk_end(&self, layout: &TextLayout<'_>, start: usize) -> usize {
        let total = layout.char_len();
        let limit = start + self.max_chars;
        if limit >= total {
            return total;
        }

        let upper_half = start + self.max_chars / 2;
        let end = last_in(&layout.paragraph_breaks, upper_half.max(start + 1), limit)
            .or_else(|| last_in(&layout.sentence_breaks, upper_half.max(start + 1), limit))
            .or_else(|| last_in(&layout.sentence_breaks, start + 1, limit))
            .unwrap_or(limit);

        // A whitespace-only tail is folded into this chunk instead of becoming its own,
        // the only case where a chunk may exceed `max_chars`
        if layout.slice(end, total).trim().is_empty() {
            total
        } else {
            end
        }
    }

    /// Start of the chunk following `start..end`
    fn next_start(&self, layout: &TextLayout<'_>, start: usize, end: usize) -> usize {
        if self.overlap == 0 {
            return end;
        }

        let back = end.saturating_sub(self.overlap);
        let snapped = first_in(&layout.word_starts, back, end.saturating_sub(1)).unwrap_or(back);

        if snapped <= start {
            end
        } else {
            snapped
        }
    }
}

/// Rebuild the original text from a document's chunks in sequence order
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.sequence_index);

    let mut text = String::new();
    let mut covered = 0usize;
    for chunk in ordered {
        if chunk.char_end <= covered {
            continue;
        }
        let skip = covered.saturating_sub(chunk.char_start);
        text.extend(chunk.text.chars().skip(skip));
        covered = chunk.char_end;
    }
    text
}

/// Character-indexed view of a text with its candidate break positions
struct TextLayout<'a> {
    text: &'a str,
    /// Byte offset of every char, plus `text.len()` at the end
    byte_offsets: Vec<usize>,
    paragraph_breaks: Vec<usize>,
    sentence_breaks: Vec<usize>,
    word_starts: Vec<usize>,
}

impl<'a> TextLayout<'a> {
    fn new(text: &'a str, paragraph_break: &Regex) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        byte_offsets.push(text.len());

        let mut layout = Self {
            text,
            byte_offsets,
            paragraph_breaks: Vec::new(),
            sentence_breaks: Vec::new(),
            word_starts: Vec::new(),
        };

        let mut paragraphs: Vec<usize> = paragraph_break
            .find_iter(text)
            .map(|m| layout.char_index(m.end()))
            .collect();
        paragraphs.dedup();

        let mut sentences: Vec<usize> = text
            .split_sentence_bound_indices()
            .map(|(b, _)| layout.char_index(b))
            .filter(|&c| c > 0)
            .collect();
        sentences.extend(
            text.chars()
                .enumerate()
                .filter(|(_, c)| CJK_TERMINATORS.contains(c))
                .map(|(i, _)| i + 1),
        );
        sentences.sort_unstable();
        sentences.dedup();

        let words: Vec<usize> = text
            .split_word_bound_indices()
            .filter(|(_, w)| !w.trim().is_empty())
            .map(|(b, _)| layout.char_index(b))
            .collect();

        layout.paragraph_breaks = paragraphs;
        layout.sentence_breaks = sentences;
        layout.word_starts = words;
        layout
    }

    fn char_len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    fn char_index(&self, byte: usize) -> usize {
        self.byte_offsets
            .binary_search(&byte)
            .unwrap_or_else(|insert_at| insert_at)
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.byte_offsets[start]..self.byte_offsets[end]]
    }
}

/// Largest sorted position within `lo..=hi`
fn last_in(positions: &[usize], lo: usize, hi: usize) -> Option<usize> {
    if lo > hi {
        return None;
    }
    let upto = positions.partition_point(|&p| p <= hi);
    positions[..upto].last().copied().filter(|&p| p >= lo)
}

/// Smallest sorted position within `lo..=hi`
fn first_in(positions: &[usize], lo: usize, hi: usize) -> Option<usize> {
    if lo > hi {
        return None;
    }
    let from = positions.partition_point(|&p| p < lo);
    positions.get(from).copied().filter(|&p| p <= hi)
}
