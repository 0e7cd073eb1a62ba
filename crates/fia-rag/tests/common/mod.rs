//! Scripted backends shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fia_rag::config::RagConfig;
use fia_rag::providers::{EmbeddingProvider, GenerationRequest, HashingEmbedder, LlmProvider};
use fia_rag::{Error, RagService, Result};

pub const DIMENSIONS: usize = 256;

/// Replies with a fixed text and records every request
pub struct CountingLlm {
    reply: String,
    delay: Duration,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl CountingLlm {
    pub fn replying(reply: &str) -> Arc<Self> {
        Self::slow(reply, Duration::ZERO)
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LlmProvider for CountingLlm {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.reply.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "counting"
    }

    fn model(&self) -> &str {
        "counting-1"
    }
}

/// Hashing embedder whose nth call (1-based) fails
pub struct FailingEmbedder {
    inner: HashingEmbedder,
    calls: AtomicUsize,
    fail_on: usize,
}

impl FailingEmbedder {
    pub fn failing_on(fail_on: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::new(DIMENSIONS).unwrap(),
            calls: AtomicUsize::new(0),
            fail_on,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(Error::embedding("connection reset by peer"));
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Address of a server that accepts connections and never answers
pub async fn stalled_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });
    format!("http://{}", addr)
}

pub fn embedder() -> Arc<HashingEmbedder> {
    Arc::new(HashingEmbedder::new(DIMENSIONS).unwrap())
}

/// Small chunks so a paragraph spans several of them
pub fn small_chunk_config() -> RagConfig {
    let mut config = RagConfig::default();
    config.chunking.max_chunk_chars = 120;
    config.chunking.overlap_chars = 20;
    config
}

pub fn service(config: RagConfig, llm: Arc<CountingLlm>) -> RagService {
    RagService::new(config, embedder(), llm).unwrap()
}

pub const ANNUAL_REPORT: &str = "Revenue for the year grew by twelve percent to 4.2 billion. \
Gross margin improved because raw material costs fell. \
Operating cash flow remained strong and covered capital expenditure twice over.\n\n\
The current ratio rose to 1.8 while total debt declined. \
Inventory turnover improved in every region. \
Management expects moderate growth next year and plans a higher dividend.";

pub const PRODUCT_NOTES: &str = "The new sensor line ships in spring. \
Battery life doubled compared with the previous model. \
Field trials in cold climates showed no failures.";
