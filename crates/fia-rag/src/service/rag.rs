//! Service facade over the retrieval-augmented QA pipeline

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::generation::AnswerComposer;
use crate::index::{IndexSnapshot, VectorIndex};
use crate::ingestion::TextChunker;
use crate::providers::{self, EmbeddingProvider, LlmProvider};
use crate::retrieval::Retriever;
use crate::storage::CorpusFile;
use crate::types::{
    Answer, CorpusStatus, DeleteOutcome, Document, DocumentRecord, IngestOutcome, QueryTrace,
};

/// Ingest, ask, delete and inspect a corpus.
///
/// Every `ingest` and `ask` holds one admission permit for its whole duration;
/// when none frees up within the configured wait the call fails with
/// [`Error::Overloaded`].
pub struct RagService {
    config: RagConfig,
    retriever: Retriever,
    composer: AnswerComposer,
    /// Registry of ingested documents
    documents: DashMap<Uuid, DocumentRecord>,
    /// Held while the index and the registry change together
    registry_lock: Mutex<()>,
    admission: Arc<Semaphore>,
    max_in_flight: usize,
}

impl RagService {
    /// Build the configured backends. Loads the corpus at `index.storage_path` if
    /// one exists, otherwise starts empty.
    pub fn from_config(config: RagConfig) -> Result<Self> {
        let embedder = providers::build_embedder(&config.embeddings)?;
        let llm = providers::build_llm(&config.llm)?;

        let path = config.index.storage_path.clone();
        if path.exists() {
            Self::load(config, embedder, llm, &path)
        } else {
            tracing::info!("No corpus at {}, starting empty", path.display());
            Self::new(config, embedder, llm)
        }
    }

    /// Create a service with an empty corpus around the given backends
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let index = VectorIndex::new(embedder.dimensions())?;
        Self::assemble(config, embedder, llm, index, Vec::new())
    }

    /// Restore a corpus written by [`RagService::save`]
    pub fn load(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let corpus = CorpusFile::load(path)?;
        let index = VectorIndex::restore(corpus.index)?;

        tracing::info!(
            "Loaded corpus from {} ({} documents, {} chunks)",
            path.display(),
            corpus.documents.len(),
            index.size()
        );
        Self::assemble(config, embedder, llm, index, corpus.documents)
    }

    fn assemble(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        index: VectorIndex,
        records: Vec<DocumentRecord>,
    ) -> Result<Self> {
        config.validate()?;

        let chunker = TextChunker::new(&config.chunking)?;
        let retriever = Retriever::new(
            chunker,
            embedder,
            Arc::new(index),
            config.service.embedding_timeout(),
        )?;
        let composer = AnswerComposer::new(llm, &config.composer)?;

        let max_in_flight = config.service.max_in_flight();
        tracing::info!("RAG service ready: {} operations in flight at most", max_in_flight);

        Ok(Self {
            retriever,
            composer,
            documents: records.into_iter().map(|r| (r.id, r)).collect(),
            registry_lock: Mutex::new(()),
            admission: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            config,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Chunk, embed and index a document. All-or-nothing.
    pub async fn ingest(&self, document: Document) -> Result<IngestOutcome> {
        let _permit = self.admit().await?;

        let entries = self.retriever.embed_document(&document).await?;

        let inserted_chunk_count = {
            let _registry = self.registry_lock.lock();
            let inserted = self.retriever.publish(&document, entries)?;
            self.documents
                .insert(document.id, DocumentRecord::new(&document, inserted));
            inserted
        };

        Ok(IngestOutcome {
            document_id: document.id,
            inserted_chunk_count,
        })
    }

    /// Answer a question from the corpus. `k` defaults to `service.default_top_k`.
    pub async fn ask(&self, question: &str, k: Option<usize>) -> Result<Answer> {
        let (result, _trace) = self.ask_traced(question, k).await;
        result
    }

    /// [`RagService::ask`], also returning the stages the query went through
    pub async fn ask_traced(&self, question: &str, k: Option<usize>) -> (Result<Answer>, QueryTrace) {
        let mut trace = QueryTrace::new();
        let result = self.run_query(question, k, &mut trace).await;

        match &result {
            Ok(answer) => tracing::info!(
                "Answered with {} citations (confidence {:.2})",
                answer.cited_chunk_ids.len(),
                answer.confidence
            ),
            Err(e) => {
                tracing::warn!("Query failed during {}: {}", trace.current(), e);
                trace.fail();
            }
        }

        (result, trace)
    }

    async fn run_query(
        &self,
        question: &str,
        k: Option<usize>,
        trace: &mut QueryTrace,
    ) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(Error::InvalidInput("question is empty".to_string()));
        }
        let k = k.unwrap_or(self.config.service.default_top_k);
        if k == 0 {
            return Err(Error::InvalidInput("k must be at least 1".to_string()));
        }

        let _permit = self.admit().await?;

        trace.advance();
        let query_vector = self.retriever.embed_query(question).await?;

        trace.advance();
        let result = self
            .retriever
            .search(&query_vector, k)?
            .above(self.config.service.min_similarity);
        tracing::debug!("Retrieved {} passages for question", result.len());

        trace.advance();
        let generation_timeout = self.config.service.generation_timeout();
        let answer = timeout(generation_timeout, self.composer.compose(question, &result))
            .await
            .map_err(|_| Error::timeout("generation", generation_timeout))??;

        trace.advance();
        Ok(answer)
    }

    /// Remove a document and all its chunks. Unknown ids remove nothing.
    pub fn delete_document(&self, document_id: &Uuid) -> Result<DeleteOutcome> {
        let removed_count = {
            let _registry = self.registry_lock.lock();
            let removed = self.retriever.index().delete(document_id)?;
            self.documents.remove(document_id);
            removed
        };

        if removed_count > 0 {
            tracing::info!("Deleted document {} ({} chunks)", document_id, removed_count);
        }
        Ok(DeleteOutcome {
            document_id: *document_id,
            removed_count,
        })
    }

    /// Corpus statistics
    pub fn status(&self) -> CorpusStatus {
        let _registry = self.registry_lock.lock();
        let document_count = self.documents.len();
        let (chunk_count, total_text_chars) = self
            .documents
            .iter()
            .fold((0, 0), |(chunks, chars), r| (chunks + r.chunk_count, chars + r.text_chars));

        CorpusStatus {
            document_count,
            chunk_count,
            index_size: self.retriever.index().size(),
            total_text_chars,
            average_chunks_per_document: if document_count == 0 {
                0.0
            } else {
                chunk_count as f32 / document_count as f32
            },
        }
    }

    /// Registered documents, oldest first
    pub fn documents(&self) -> Vec<DocumentRecord> {
        let mut records: Vec<DocumentRecord> =
            self.documents.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| {
            a.upload_timestamp
                .cmp(&b.upload_timestamp)
                .then_with(|| a.source_filename.cmp(&b.source_filename))
        });
        records
    }

    pub fn document(&self, document_id: &Uuid) -> Option<DocumentRecord> {
        self.documents.get(document_id).map(|r| r.value().clone())
    }

    /// Persist the corpus.
    ///
    /// Only documents whose chunks are all in the index snapshot are written, so an
    /// ingestion finishing concurrently never produces an inconsistent file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.retriever.index().snapshot();

        let mut indexed: HashMap<Uuid, usize> = HashMap::new();
        for entry in &snapshot.entries {
            *indexed.entry(entry.chunk.document_id).or_default() += 1;
        }

        let records: Vec<DocumentRecord> = self
            .documents()
            .into_iter()
            .filter(|r| indexed.get(&r.id) == Some(&r.chunk_count))
            .collect();
        let kept: HashSet<Uuid> = records.iter().map(|r| r.id).collect();

        let index = IndexSnapshot {
            schema_version: snapshot.schema_version,
            dimension: snapshot.dimension,
            entries: snapshot
                .entries
                .into_iter()
                .filter(|e| kept.contains(&e.chunk.document_id))
                .collect(),
        };

        CorpusFile::new(records, index).save(path.as_ref())
    }

    /// Persist the corpus at `index.storage_path`
    pub fn save_to_storage(&self) -> Result<()> {
        self.save(&self.config.index.storage_path)
    }

    async fn admit(&self) -> Result<OwnedSemaphorePermit> {
        match timeout(
            self.config.service.admission_wait(),
            self.admission.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(Error::internal("admission semaphore closed")),
            Err(_) => {
                tracing::warn!("Rejecting call: {} operations already in flight", self.max_in_flight);
                Err(Error::Overloaded {
                    limit: self.max_in_flight,
                })
            }
        }
    }
}
