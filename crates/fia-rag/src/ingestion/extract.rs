//! Plain-text extraction for uploaded files
//!
//! Format-specific parsing (PDF, Word, spreadsheets) happens upstream; this module only
//! handles formats that are already text and defines the contract upstream parsers meet.

use regex::Regex;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Document;

/// Raw text plus source metadata, as delivered by an extraction service
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub raw_text: String,
    pub source_filename: String,
}

impl ExtractedText {
    /// Turn the extracted text into a document ready for ingestion
    pub fn into_document(self) -> Document {
        Document::new(self.source_filename, self.raw_text)
    }
}

/// Text extraction contract
pub trait TextExtractor: Send + Sync {
    /// Extract text from the bytes of an uploaded file
    fn extract(&self, filename: &str, data: &[u8]) -> Result<ExtractedText>;

    /// Whether files with this extension (lower-case, no dot) are handled
    fn supports(&self, extension: &str) -> bool;
}

/// Extractor for `.txt`, `.md` and `.csv` files
pub struct PlainTextExtractor {
    horizontal_space: Regex,
    blank_lines: Regex,
    punctuation_run: Regex,
}

impl PlainTextExtractor {
    pub fn new() -> Result<Self> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| Error::internal(e.to_string()));

        Ok(Self {
            horizontal_space: compile(r"[ \t\u{00A0}\u{3000}]+")?,
            blank_lines: compile(r"\n[ \t]*(?:\n[ \t]*)+")?,
            punctuation_run: compile(r"[.,\-]{4,}")?,
        })
    }

    /// Read and extract a file from disk
    pub fn extract_path(&self, path: impl AsRef<Path>) -> Result<ExtractedText> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("Not a file: {}", path.display())))?;
        let data = std::fs::read(path)?;
        self.extract(&filename, &data)
    }

    /// Normalise whitespace and runs of filler punctuation, keeping paragraph breaks
    pub fn clean_text(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let text = self.horizontal_space.replace_all(&text, " ");
        let text = self.blank_lines.replace_all(&text, "\n\n");
        let text = self.punctuation_run.replace_all(&text, "...");

        text.lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    fn parse_csv(&self, data: &[u8]) -> Result<String> {
        let text = decode(data);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut content = String::new();

        if let Ok(headers) = reader.headers() {
            content.push_str(&headers.iter().collect::<Vec<_>>().join(" | "));
            content.push('\n');
        }

        for record in reader.records() {
            match record {
                Ok(record) => {
                    let row = record.iter().collect::<Vec<_>>().join(" | ");
                    if !row.replace('|', "").trim().is_empty() {
                        content.push_str(&row);
                        content.push('\n');
                    }
                }
                Err(e) => tracing::warn!("Skipping malformed CSV row: {}", e),
            }
        }

        Ok(content)
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<ExtractedText> {
        let extension = extension_of(filename);
        if !self.supports(&extension) {
            return Err(Error::UnsupportedFileType(format!(
                "{} - extract text upstream and ingest it as .txt",
                if extension.is_empty() { filename } else { extension.as_str() }
            )));
        }

        let raw = match extension.as_str() {
            "csv" => self.parse_csv(data)?,
            _ => decode(data),
        };

        Ok(ExtractedText {
            raw_text: self.clean_text(&raw),
            source_filename: filename.to_string(),
        })
    }

    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "txt" | "text" | "md" | "markdown" | "csv")
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// UTF-8 (BOM stripped), falling back to Latin-1 which maps every byte
fn decode(data: &[u8]) -> String {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => data.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_text() {
        let extractor = PlainTextExtractor::new().unwrap();
        let extracted = extractor
            .extract("notes.TXT", b"Revenue   grew.\r\n\r\n\r\n\tCosts fell......")
            .unwrap();

        assert_eq!(extracted.source_filename, "notes.TXT");
        assert_eq!(extracted.raw_text, "Revenue grew.\n\nCosts fell...");
    }

    #[test]
    fn test_latin1_fallback() {
        let extractor = PlainTextExtractor::new().unwrap();
        let extracted = extractor.extract("cafe.txt", b"caf\xe9 cr\xe8me").unwrap();
        assert_eq!(extracted.raw_text, "café crème");
    }

    #[test]
    fn test_csv_rows_are_joined() {
        let extractor = PlainTextExtractor::new().unwrap();
        let extracted = extractor
            .extract("q4.csv", b"metric,value\nrevenue,120\n,\ncash,45\n")
            .unwrap();

        assert_eq!(extracted.raw_text, "metric | value\nrevenue | 120\ncash | 45");
    }

    #[test]
    fn test_unsupported_extension() {
        let extractor = PlainTextExtractor::new().unwrap();
        assert!(matches!(
            extractor.extract("report.pdf", b"%PDF-1.7"),
            Err(Error::UnsupportedFileType(_))
        ));
        assert!(!extractor.supports("docx"));
    }

    #[test]
    fn test_into_document_keeps_filename() {
        let doc = ExtractedText {
            raw_text: "text".to_string(),
            source_filename: "a.md".to_string(),
        }
        .into_document();
        assert_eq!(doc.source_filename, "a.md");
        assert_eq!(doc.raw_text, "text");
    }
}
