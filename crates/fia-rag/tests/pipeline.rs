//! End-to-end behaviour of the ingest / ask / delete pipeline

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use fia_rag::config::{EmbeddingConfig, RagConfig};
use fia_rag::ingestion::{reassemble, TextChunker};
use fia_rag::providers::OllamaEmbedder;
use fia_rag::types::QueryStage;
use fia_rag::{Document, Error, RagService};
use uuid::Uuid;

#[tokio::test]
async fn test_fox_answer_cites_its_only_chunk() {
    let llm = CountingLlm::replying("The fox jumps [1].");
    let service = service(RagConfig::default(), llm.clone());

    let outcome = service
        .ingest(Document::new("fox.txt", "The quick brown fox. The fox jumps."))
        .await
        .unwrap();
    assert_eq!(outcome.inserted_chunk_count, 1);

    let answer = service.ask("What does the fox do?", None).await.unwrap();
    let chunks = service
        .retriever()
        .index()
        .chunks_for_document(&outcome.document_id);

    assert_eq!(answer.text, "The fox jumps [1].");
    assert_eq!(answer.cited_chunk_ids, vec![chunks[0].id]);
    assert!(answer.confidence > 0.0 && answer.confidence <= 1.0);

    let requests = llm.requests.lock();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].system.contains("The quick brown fox. The fox jumps."));
    assert!(requests[0].system.contains("fox.txt, part 1"));
}

#[tokio::test]
async fn test_empty_corpus_answers_without_backend_call() {
    let llm = CountingLlm::replying("unused");
    let service = service(RagConfig::default(), llm.clone());

    let answer = service.ask("What was revenue?", None).await.unwrap();
    assert!(answer.is_insufficient_information());
    assert!(answer.cited_chunk_ids.is_empty());
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_status_tracks_successful_ingestion_only() {
    let config = small_chunk_config();
    let expected_chunks = TextChunker::new(&config.chunking)
        .unwrap()
        .chunk(&Document::new("annual.txt", ANNUAL_REPORT))
        .unwrap()
        .len();
    assert!(expected_chunks > 2);

    let service = RagService::new(
        config,
        FailingEmbedder::failing_on(expected_chunks + 2),
        CountingLlm::replying("ok"),
    )
    .unwrap();

    service
        .ingest(Document::new("annual.txt", ANNUAL_REPORT))
        .await
        .unwrap();
    let status = service.status();
    assert_eq!(status.document_count, 1);
    assert_eq!(status.chunk_count, expected_chunks);
    assert_eq!(status.index_size, expected_chunks);

    // second document fails on its second embedding
    let err = service
        .ingest(Document::new("notes.txt", ANNUAL_REPORT.replace("Revenue", "Turnover")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    assert!(err.is_transient());

    let after = service.status();
    assert_eq!(after.document_count, 1);
    assert_eq!(after.chunk_count, expected_chunks);
    assert_eq!(after.index_size, expected_chunks);
    service.retriever().index().verify().unwrap();
}

#[tokio::test]
async fn test_empty_and_duplicate_documents_are_rejected() {
    let service = service(RagConfig::default(), CountingLlm::replying("ok"));

    let blank = Document::new("blank.txt", "  \n\t ");
    assert!(matches!(
        service.ingest(blank).await,
        Err(Error::EmptyDocument(_))
    ));

    let doc = Document::new("notes.txt", PRODUCT_NOTES);
    service.ingest(doc.clone()).await.unwrap();
    assert!(matches!(
        service.ingest(doc).await,
        Err(Error::DuplicateChunk { .. })
    ));
    assert_eq!(service.status().document_count, 1);
}

#[tokio::test]
async fn test_delete_removes_document_from_results() {
    let service = service(small_chunk_config(), CountingLlm::replying("ok"));
    let annual = service
        .ingest(Document::new("annual.txt", ANNUAL_REPORT))
        .await
        .unwrap();
    let notes = service
        .ingest(Document::new("notes.txt", PRODUCT_NOTES))
        .await
        .unwrap();
    let before = service.status().chunk_count;

    let outcome = service.delete_document(&annual.document_id).unwrap();
    assert_eq!(outcome.removed_count, annual.inserted_chunk_count);
    assert_eq!(
        service.status().chunk_count,
        before - annual.inserted_chunk_count
    );

    let hits = service
        .retriever()
        .retrieve("How did revenue and gross margin develop?", 50)
        .await
        .unwrap();
    assert!(hits
        .iter()
        .all(|hit| hit.chunk.document_id == notes.document_id));
    assert!(service.document(&annual.document_id).is_none());

    let again = service.delete_document(&annual.document_id).unwrap();
    assert_eq!(again.removed_count, 0);
}

#[tokio::test]
async fn test_search_is_deterministic_and_prefers_verbatim_chunk() {
    let service = service(small_chunk_config(), CountingLlm::replying("ok"));
    service
        .ingest(Document::new("annual.txt", ANNUAL_REPORT))
        .await
        .unwrap();
    service
        .ingest(Document::new("notes.txt", PRODUCT_NOTES))
        .await
        .unwrap();

    let retriever = service.retriever();
    let target = "Battery life doubled compared with the previous model.";
    let query = retriever.embed_query(target).await.unwrap();

    let first = retriever.search(&query, 5).unwrap();
    let second = retriever.search(&query, 5).unwrap();
    assert_eq!(first.chunk_ids(), second.chunk_ids());
    assert!(first.hits[0].chunk.text.contains(target));

    let scores: Vec<f32> = first.iter().map(|hit| hit.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_chunks_reassemble_into_document_text() {
    let config = small_chunk_config();
    let doc = Document::new("annual.txt", ANNUAL_REPORT);
    let chunks = TextChunker::new(&config.chunking)
        .unwrap()
        .chunk(&doc)
        .unwrap();

    assert_eq!(reassemble(&chunks), ANNUAL_REPORT);
    assert!(chunks
        .iter()
        .enumerate()
        .all(|(i, c)| c.sequence_index as usize == i));
}

#[tokio::test]
async fn test_generation_timeout_is_reported() {
    let mut config = RagConfig::default();
    config.service.generation_timeout_secs = 1;
    let service = service(
        config,
        CountingLlm::slow("late [1]", Duration::from_secs(10)),
    );
    service
        .ingest(Document::new("notes.txt", PRODUCT_NOTES))
        .await
        .unwrap();

    let (result, trace) = service
        .ask_traced("How long does the battery last?", None)
        .await;
    assert!(matches!(
        result,
        Err(Error::Timeout {
            operation: "generation",
            ..
        })
    ));
    assert_eq!(trace.current(), QueryStage::Failed);
    assert_eq!(trace.failed_during(), Some(QueryStage::Composing));
}

#[tokio::test]
async fn test_overloaded_service_rejects_calls() {
    let mut config = RagConfig::default();
    config.service.max_in_flight = Some(1);
    config.service.admission_wait_ms = 0;
    let service = Arc::new(service(
        config,
        CountingLlm::slow("slow [1]", Duration::from_secs(2)),
    ));
    service
        .ingest(Document::new("notes.txt", PRODUCT_NOTES))
        .await
        .unwrap();

    let busy = {
        let service = service.clone();
        tokio::spawn(async move { service.ask("When does the sensor ship?", None).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let err = service
        .ask("How long does the battery last?", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Overloaded { limit: 1 }));
    assert!(err.is_transient());

    assert!(busy.await.unwrap().is_ok());
    assert!(service.ask("Were there failures?", None).await.is_ok());
}

#[tokio::test]
async fn test_invalid_questions_fail_before_admission() {
    let llm = CountingLlm::replying("unused");
    let service = service(RagConfig::default(), llm.clone());

    let (result, trace) = service.ask_traced("   ", None).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(trace.failed_during(), Some(QueryStage::Received));

    assert!(matches!(
        service.ask("What was revenue?", Some(0)).await,
        Err(Error::InvalidInput(_))
    ));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_successful_query_passes_through_every_stage() {
    let service = service(RagConfig::default(), CountingLlm::replying("Spring [1]."));
    service
        .ingest(Document::new("notes.txt", PRODUCT_NOTES))
        .await
        .unwrap();

    let (result, trace) = service.ask_traced("When does the sensor ship?", None).await;
    assert!(result.is_ok());
    assert_eq!(
        trace.stages(),
        &[
            QueryStage::Received,
            QueryStage::Embedding,
            QueryStage::Searching,
            QueryStage::Composing,
            QueryStage::Done,
        ]
    );
}

#[tokio::test]
async fn test_concurrent_asks_all_complete() {
    let llm = CountingLlm::replying("Revenue grew [1].");
    let service = Arc::new(service(small_chunk_config(), llm.clone()));
    service
        .ingest(Document::new("annual.txt", ANNUAL_REPORT))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .ask(&format!("How did revenue develop in quarter {}?", i), Some(3))
                    .await
            })
        })
        .collect();

    for task in tasks {
        let answer = task.await.unwrap().unwrap();
        assert!(!answer.cited_chunk_ids.is_empty());
    }
    assert_eq!(llm.calls(), 8);
}

#[tokio::test]
async fn test_corpus_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.json");

    let service = service(small_chunk_config(), CountingLlm::replying("ok"));
    service
        .ingest(Document::new("annual.txt", ANNUAL_REPORT))
        .await
        .unwrap();
    service
        .ingest(Document::new("notes.txt", PRODUCT_NOTES))
        .await
        .unwrap();
    service.save(&path).unwrap();

    let restored = RagService::load(
        small_chunk_config(),
        embedder(),
        CountingLlm::replying("ok"),
        &path,
    )
    .unwrap();

    assert_eq!(restored.status(), service.status());
    assert_eq!(restored.documents(), service.documents());

    let question = "What happened to the current ratio?";
    let original = service.retriever().retrieve(question, 4).await.unwrap();
    let reloaded = restored.retriever().retrieve(question, 4).await.unwrap();
    assert_eq!(original.chunk_ids(), reloaded.chunk_ids());
}

#[tokio::test]
async fn test_load_rejects_mismatched_embedder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.json");

    let service = service(RagConfig::default(), CountingLlm::replying("ok"));
    service
        .ingest(Document::new("notes.txt", PRODUCT_NOTES))
        .await
        .unwrap();
    service.save(&path).unwrap();

    let wider = Arc::new(fia_rag::providers::HashingEmbedder::new(DIMENSIONS * 2).unwrap());
    let result = RagService::load(RagConfig::default(), wider, CountingLlm::replying("ok"), &path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_embedding_client_timeout_fails_as_timeout() {
    let mut config = RagConfig::default();
    config.service.embedding_timeout_secs = 5;
    let embedder = OllamaEmbedder::new(&EmbeddingConfig {
        base_url: stalled_server().await,
        request_timeout_secs: 1,
        ..Default::default()
    })
    .unwrap();
    let service = RagService::new(config, Arc::new(embedder), CountingLlm::replying("unused")).unwrap();

    let err = service
        .ingest(Document::new("notes.txt", PRODUCT_NOTES))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { operation: "embedding", .. }));
    assert!(err.is_transient());
    assert_eq!(service.status().document_count, 0);
    assert_eq!(service.status().index_size, 0);
}

#[tokio::test]
async fn test_zero_context_budget_is_a_config_error() {
    let mut config = RagConfig::default();
    config.composer.context_char_budget = 0;
    let result = RagService::new(config, embedder(), CountingLlm::replying("unused"));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_ingest_and_delete_keep_registry_in_step() {
    let service = Arc::new(service(small_chunk_config(), CountingLlm::replying("ok")));

    for round in 0..25 {
        let id = Uuid::new_v4();
        let ingest = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .ingest(Document::with_id(id, "annual.txt", ANNUAL_REPORT))
                    .await
            })
        };
        let delete = {
            let service = service.clone();
            tokio::spawn(async move {
                for _ in 0..round % 5 {
                    tokio::task::yield_now().await;
                }
                service.delete_document(&id)
            })
        };

        ingest.await.unwrap().unwrap();
        delete.await.unwrap().unwrap();

        let status = service.status();
        assert_eq!(status.chunk_count, status.index_size);
        let indexed = service.retriever().index().chunks_for_document(&id);
        match service.document(&id) {
            Some(record) => assert_eq!(record.chunk_count, indexed.len()),
            None => assert!(indexed.is_empty()),
        }
    }
    service.retriever().index().verify().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_searches_never_see_partial_documents() {
    let mut config = small_chunk_config();
    config.service.max_in_flight = Some(16);
    let chunker = TextChunker::new(&config.chunking).unwrap();
    let service = Arc::new(service(config, CountingLlm::replying("ok")));

    let incoming: Vec<Document> = (0..8)
        .map(|i| {
            let text = if i % 2 == 0 { ANNUAL_REPORT } else { PRODUCT_NOTES };
            Document::new(format!("incoming-{}.txt", i), text)
        })
        .collect();
    let doomed: Vec<Document> = (0..4)
        .map(|i| Document::new(format!("doomed-{}.txt", i), ANNUAL_REPORT))
        .collect();

    let expected: Arc<HashMap<Uuid, usize>> = Arc::new(
        incoming
            .iter()
            .chain(&doomed)
            .map(|doc| (doc.id, chunker.chunk(doc).unwrap().len()))
            .collect(),
    );
    assert!(expected.values().all(|&n| n > 1));

    for doc in &doomed {
        service.ingest(doc.clone()).await.unwrap();
    }
    let query = service
        .retriever()
        .embed_query("revenue, battery life and the current ratio")
        .await
        .unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let expected = expected.clone();
            let query = query.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let result = service.retriever().search(&query, 1_000).unwrap();
                    let mut seen: HashMap<Uuid, usize> = HashMap::new();
                    for hit in result.iter() {
                        *seen.entry(hit.chunk.document_id).or_default() += 1;
                    }
                    for (document_id, count) in seen {
                        assert_eq!(Some(&count), expected.get(&document_id));
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let ingests: Vec<_> = incoming
        .iter()
        .cloned()
        .map(|doc| {
            let service = service.clone();
            tokio::spawn(async move { service.ingest(doc).await })
        })
        .collect();
    let deletes: Vec<_> = doomed
        .iter()
        .map(|doc| {
            let service = service.clone();
            let id = doc.id;
            tokio::spawn(async move { service.delete_document(&id) })
        })
        .collect();

    for task in ingests {
        task.await.unwrap().unwrap();
    }
    for task in deletes {
        assert!(task.await.unwrap().unwrap().removed_count > 1);
    }
    for task in readers {
        task.await.unwrap();
    }

    let index = service.retriever().index();
    index.verify().unwrap();
    for doc in &incoming {
        assert_eq!(index.chunks_for_document(&doc.id).len(), expected[&doc.id]);
    }
    for doc in &doomed {
        assert!(index.chunks_for_document(&doc.id).is_empty());
    }
    let status = service.status();
    assert_eq!(status.document_count, incoming.len());
    assert_eq!(status.chunk_count, status.index_size);
}
