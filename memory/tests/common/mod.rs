//! Mock providers shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mnema_core::config::IntelligenceConfig;
use mnema_core::{
    Embedding, EmbeddingModel, GenerateOptions, LanguageModel, MemoryError, Message, Result,
    VectorStore,
};
use mnema_memory::MemoryClient;
use mnema_store::SqliteStore;

pub const DIM: usize = 4;

/// Deterministic embedder: explicit vectors for registered texts, a
/// content-derived unit vector otherwise.
pub struct MockEmbedder {
    registered: Mutex<HashMap<String, Embedding>>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            registered: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, text: &str, embedding: &[f32]) {
        self.registered
            .lock()
            .unwrap()
            .insert(text.to_string(), embedding.to_vec());
    }

    fn derive(text: &str) -> Embedding {
        let mut seed = 0u64;
        for byte in text.bytes() {
            seed = seed.wrapping_mul(31).wrapping_add(u64::from(byte));
        }
        let mut vector: Embedding = (0..DIM)
            .map(|i| {
                seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                ((seed >> (8 + i)) % 1000) as f32 / 1000.0 + 0.05
            })
            .collect();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        for value in &mut vector {
            *value /= norm;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(vector) = self.registered.lock().unwrap().get(text) {
            return Ok(vector.clone());
        }
        Ok(Self::derive(text))
    }
}

/// Chat mock that replays scripted replies in order.
pub struct MockLlm {
    replies: Mutex<VecDeque<String>>,
}

impl MockLlm {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn generate_with_messages(
        &self,
        _messages: &[Message],
        _options: &GenerateOptions,
    ) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| MemoryError::llm("mock", "no scripted reply left"))
    }
}

pub async fn sqlite_store() -> Arc<dyn VectorStore> {
    Arc::new(SqliteStore::in_memory("memories", DIM).await.unwrap())
}

/// Client without a chat model: simple adds plus the dedup path.
pub async fn plain_client() -> (MemoryClient, Arc<MockEmbedder>, Arc<dyn VectorStore>) {
    let store = sqlite_store().await;
    let embedder = Arc::new(MockEmbedder::new());
    let client = MemoryClient::builder(Arc::clone(&store), embedder.clone())
        .with_intelligence(IntelligenceConfig::default())
        .build();
    (client, embedder, store)
}

/// Client with a scripted chat model: the full intelligent pipeline.
pub async fn intelligent_client(
    replies: impl IntoIterator<Item = impl Into<String>>,
) -> (
    MemoryClient,
    Arc<MockEmbedder>,
    Arc<MockLlm>,
    Arc<dyn VectorStore>,
) {
    let store = sqlite_store().await;
    let embedder = Arc::new(MockEmbedder::new());
    let llm = Arc::new(MockLlm::new(replies));
    let client = MemoryClient::builder(Arc::clone(&store), embedder.clone())
        .with_llm(llm.clone())
        .with_intelligence(IntelligenceConfig::default())
        .build();
    (client, embedder, llm, store)
}
