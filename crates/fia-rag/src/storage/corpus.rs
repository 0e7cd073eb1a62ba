//! On-disk corpus: document registry plus index snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::index::IndexSnapshot;
use crate::types::DocumentRecord;

/// Current corpus file schema
pub const CORPUS_SCHEMA_VERSION: u32 = 1;

/// Persisted corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusFile {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub documents: Vec<DocumentRecord>,
    pub index: IndexSnapshot,
}

impl CorpusFile {
    pub fn new(documents: Vec<DocumentRecord>, index: IndexSnapshot) -> Self {
        Self {
            schema_version: CORPUS_SCHEMA_VERSION,
            saved_at: Utc::now(),
            documents,
            index,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        super::write_json_atomic(path, self)?;
        tracing::info!(
            "Saved corpus ({} documents, {} chunks) to {}",
            self.documents.len(),
            self.index.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Read and validate a corpus file
    pub fn load(path: &Path) -> Result<Self> {
        let corpus: CorpusFile = super::read_json(path)?;
        corpus.validate()?;
        Ok(corpus)
    }

    /// The registry and the index must describe the same chunks
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != CORPUS_SCHEMA_VERSION {
            return Err(Error::corruption(format!(
                "unsupported corpus schema version {} (expected {})",
                self.schema_version, CORPUS_SCHEMA_VERSION
            )));
        }
        self.index.check_schema()?;

        let mut indexed: HashMap<Uuid, usize> = HashMap::new();
        for entry in &self.index.entries {
            *indexed.entry(entry.chunk.document_id).or_default() += 1;
        }

        for record in &self.documents {
            let found = indexed.remove(&record.id).unwrap_or(0);
            if found != record.chunk_count {
                return Err(Error::corruption(format!(
                    "document {} lists {} chunks but the index holds {}",
                    record.id, record.chunk_count, found
                )));
            }
        }

        if let Some(orphan) = indexed.keys().next() {
            return Err(Error::corruption(format!(
                "index holds chunks of unregistered document {}",
                orphan
            )));
        }

        Ok(())
    }
}
