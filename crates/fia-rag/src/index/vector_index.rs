//! In-memory exact vector index with deterministic ranking

use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Chunk, QueryResult, ScoredChunk};

use super::distance::{cosine_similarity, magnitude};
use super::snapshot::{IndexSnapshot, SnapshotEntry, INDEX_SCHEMA_VERSION};

/// A chunk paired with its embedding and cached norm
#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
    norm: f32,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Slot storage; a chunk keeps its slot until its document is deleted
    slots: Vec<Option<IndexEntry>>,
    /// Vacated slots available for reuse
    free: Vec<usize>,
    by_chunk: HashMap<Uuid, usize>,
    by_document: HashMap<Uuid, Vec<usize>>,
}

impl IndexState {
    fn place(&mut self, entry: IndexEntry) {
        let chunk_id = entry.chunk.id;
        let document_id = entry.chunk.document_id;

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        self.by_chunk.insert(chunk_id, slot);
        self.by_document.entry(document_id).or_default().push(slot);
    }

    fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.slots.iter().flatten()
    }
}

/// Exact cosine-similarity index over chunk embeddings.
///
/// Searches share a read lock and run in parallel; inserts and deletes take the
/// write lock, so a search observes either all of a document's chunks or none.
pub struct VectorIndex {
    dimension: usize,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` floats
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config("index dimension must be positive".to_string()));
        }
        Ok(Self {
            dimension,
            state: RwLock::new(IndexState::default()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert a single chunk. Duplicate chunk ids are rejected, never overwritten.
    pub fn insert(&self, chunk: Chunk, embedding: Vec<f32>) -> Result<()> {
        let entry = self.prepare(chunk, embedding)?;

        let mut state = self.state.write();
        if state.by_chunk.contains_key(&entry.chunk.id) {
            return Err(Error::DuplicateChunk {
                chunk_id: entry.chunk.id,
                document_id: entry.chunk.document_id,
            });
        }
        state.place(entry);
        Ok(())
    }

    /// Insert every chunk of one document as a single step.
    ///
    /// The whole batch is validated before anything is written: on error the index
    /// is unchanged, on success all chunks become searchable at once.
    pub fn insert_document(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<usize> {
        let Some(document_id) = entries.first().map(|(chunk, _)| chunk.document_id) else {
            return Ok(0);
        };

        let mut prepared = Vec::with_capacity(entries.len());
        let mut batch_ids = HashSet::with_capacity(entries.len());
        for (chunk, embedding) in entries {
            if chunk.document_id != document_id {
                return Err(Error::InvalidInput(format!(
                    "chunk {} belongs to document {}, batch is for {}",
                    chunk.id, chunk.document_id, document_id
                )));
            }
            if !batch_ids.insert(chunk.id) {
                return Err(Error::DuplicateChunk {
                    chunk_id: chunk.id,
                    document_id,
                });
            }
            prepared.push(self.prepare(chunk, embedding)?);
        }

        let mut state = self.state.write();
        if let Some(existing) = prepared.iter().find(|e| state.by_chunk.contains_key(&e.chunk.id)) {
            return Err(Error::DuplicateChunk {
                chunk_id: existing.chunk.id,
                document_id,
            });
        }

        let count = prepared.len();
        for entry in prepared {
            state.place(entry);
        }

        tracing::debug!("Indexed {} chunks for document {}", count, document_id);
        Ok(count)
    }

    /// The `k` most similar chunks, best first.
    ///
    /// Ties on score are broken by lower sequence index, then lower document id,
    /// then lower chunk id, so identical calls on an unchanged index return
    /// identical results.
    pub fn search(&self, query: &[f32], k: usize) -> Result<QueryResult> {
        self.check_dimension(query.len())?;
        if k == 0 {
            return Ok(QueryResult::default());
        }

        let query_norm = magnitude(query);
        let state = self.state.read();

        let mut scored: Vec<(f32, &IndexEntry)> = state
            .entries()
            .map(|entry| {
                let score = cosine_similarity(query, &entry.embedding, query_norm, entry.norm);
                (score, entry)
            })
            .collect();

        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, |a, b| rank(a, b));
            scored.truncate(k);
        }
        scored.sort_by(|a, b| rank(a, b));

        let hits = scored
            .into_iter()
            .map(|(score, entry)| ScoredChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect();

        Ok(QueryResult::new(hits))
    }

    /// Remove every chunk of a document. Unknown documents remove nothing.
    pub fn delete(&self, document_id: &Uuid) -> Result<usize> {
        let mut state = self.state.write();

        let Some(slots) = state.by_document.get(document_id) else {
            return Ok(0);
        };

        for &slot in slots {
            match state.slots.get(slot).and_then(Option::as_ref) {
                Some(entry) if entry.chunk.document_id == *document_id => {}
                _ => {
                    return Err(Error::corruption(format!(
                        "document {} maps to slot {} which does not hold one of its chunks",
                        document_id, slot
                    )))
                }
            }
        }

        let slots = state.by_document.remove(document_id).unwrap_or_default();
        for &slot in &slots {
            if let Some(entry) = state.slots[slot].take() {
                state.by_chunk.remove(&entry.chunk.id);
            }
            state.free.push(slot);
        }

        tracing::debug!("Removed {} chunks of document {}", slots.len(), document_id);
        Ok(slots.len())
    }

    /// Number of indexed chunks
    pub fn size(&self) -> usize {
        self.state.read().by_chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of documents with at least one indexed chunk
    pub fn document_count(&self) -> usize {
        self.state.read().by_document.len()
    }

    pub fn contains_chunk(&self, chunk_id: &Uuid) -> bool {
        self.state.read().by_chunk.contains_key(chunk_id)
    }

    pub fn chunk(&self, chunk_id: &Uuid) -> Option<Chunk> {
        let state = self.state.read();
        let slot = *state.by_chunk.get(chunk_id)?;
        let chunk = state.slots.get(slot)?.as_ref().map(|entry| entry.chunk.clone());
        chunk
    }

    pub fn contains_document(&self, document_id: &Uuid) -> bool {
        self.state.read().by_document.contains_key(document_id)
    }

    /// A document's chunks in sequence order
    pub fn chunks_for_document(&self, document_id: &Uuid) -> Vec<Chunk> {
        let state = self.state.read();
        let mut chunks: Vec<Chunk> = state
            .by_document
            .get(document_id)
            .into_iter()
            .flatten()
            .filter_map(|&slot| state.slots.get(slot).and_then(Option::as_ref))
            .map(|entry| entry.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.sequence_index);
        chunks
    }

    /// Cross-check slot storage against the lookup maps
    pub fn verify(&self) -> Result<()> {
        let state = self.state.read();

        let occupied = state.slots.iter().filter(|s| s.is_some()).count();
        if occupied != state.by_chunk.len() {
            return Err(Error::corruption(format!(
                "{} occupied slots but {} chunk ids",
                occupied,
                state.by_chunk.len()
            )));
        }

        for (chunk_id, &slot) in &state.by_chunk {
            match state.slots.get(slot).and_then(Option::as_ref) {
                Some(entry) if entry.chunk.id == *chunk_id => {}
                _ => {
                    return Err(Error::corruption(format!(
                        "chunk {} maps to slot {} which holds another entry",
                        chunk_id, slot
                    )))
                }
            }
        }

        let by_document: usize = state.by_document.values().map(Vec::len).sum();
        if by_document != occupied {
            return Err(Error::corruption(format!(
                "{} document slot references for {} entries",
                by_document, occupied
            )));
        }

        Ok(())
    }

    /// Serializable copy of the index, ordered by document then sequence index
    pub fn snapshot(&self) -> IndexSnapshot {
        let state = self.state.read();
        let mut entries: Vec<SnapshotEntry> = state
            .entries()
            .map(|entry| SnapshotEntry {
                chunk: entry.chunk.clone(),
                embedding: entry.embedding.clone(),
            })
            .collect();
        entries.sort_by(|a, b| {
            a.chunk
                .document_id
                .cmp(&b.chunk.document_id)
                .then(a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        });

        IndexSnapshot {
            schema_version: INDEX_SCHEMA_VERSION,
            dimension: self.dimension,
            entries,
        }
    }

    /// Rebuild an index from a snapshot. Any inconsistency is reported as corruption.
    pub fn restore(snapshot: IndexSnapshot) -> Result<Self> {
        snapshot.check_schema()?;
        let index = Self::new(snapshot.dimension)?;

        {
            let mut state = index.state.write();
            for SnapshotEntry { chunk, embedding } in snapshot.entries {
                if state.by_chunk.contains_key(&chunk.id) {
                    return Err(Error::corruption(format!(
                        "snapshot contains chunk {} twice",
                        chunk.id
                    )));
                }
                let entry = index.prepare(chunk, embedding).map_err(|e| {
                    Error::corruption(format!("invalid snapshot entry: {}", e))
                })?;
                state.place(entry);
            }
        }

        index.verify()?;
        Ok(index)
    }

    /// Write the index as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::storage::write_json_atomic(path.as_ref(), &self.snapshot())
    }

    /// Load an index written by [`VectorIndex::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let snapshot: IndexSnapshot = crate::storage::read_json(path.as_ref())?;
        Self::restore(snapshot)
    }

    fn prepare(&self, chunk: Chunk, embedding: Vec<f32>) -> Result<IndexEntry> {
        self.check_dimension(embedding.len())?;
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(Error::embedding(format!(
                "embedding for chunk {} contains non-finite values",
                chunk.id
            )));
        }
        let norm = magnitude(&embedding);
        Ok(IndexEntry {
            chunk,
            embedding,
            norm,
        })
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

/// Best first: score desc, then sequence index, document id and chunk id asc
fn rank(a: &(f32, &IndexEntry), b: &(f32, &IndexEntry)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| a.1.chunk.sequence_index.cmp(&b.1.chunk.sequence_index))
        .then_with(|| a.1.chunk.document_id.cmp(&b.1.chunk.document_id))
        .then_with(|| a.1.chunk.id.cmp(&b.1.chunk.id))
}
