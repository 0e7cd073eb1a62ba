//! Schema-versioned serialized form of the vector index

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Chunk;

/// Current snapshot schema
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Everything needed to rebuild a [`VectorIndex`](super::VectorIndex).
/// Norms are recomputed on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub schema_version: u32,
    pub dimension: usize,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl IndexSnapshot {
    pub fn empty(dimension: usize) -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            dimension,
            entries: Vec::new(),
        }
    }

    /// Reject snapshots this version cannot read
    pub fn check_schema(&self) -> Result<()> {
        if self.schema_version != INDEX_SCHEMA_VERSION {
            return Err(Error::corruption(format!(
                "unsupported index schema version {} (expected {})",
                self.schema_version, INDEX_SCHEMA_VERSION
            )));
        }
        if self.dimension == 0 {
            return Err(Error::corruption("index snapshot has zero dimension"));
        }
        Ok(())
    }
}
