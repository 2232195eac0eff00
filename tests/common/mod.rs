//! Deterministic stand-ins for the embedding service and the chat model.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mimir::providers::traits::ensure_embeddable;
use mimir::{
    ChatModel, ChatRequest, Embedder, Embedding, MimirError, Result, RetryPolicy, UpstreamClient,
};

// ============================================================================
// Embedders
// ============================================================================

/// Embeds text by table lookup: the first needle contained in the text
/// decides the vector. Text matching no needle is an error.
pub struct TableEmbedder {
    model: String,
    dimensions: usize,
    table: Vec<(String, Vec<f32>)>,
    calls: AtomicU32,
}

impl TableEmbedder {
    pub fn new(model: &str, dimensions: usize, table: &[(&str, &[f32])]) -> Self {
        Self {
            model: model.to_string(),
            dimensions,
            table: table
                .iter()
                .map(|(needle, vector)| (needle.to_string(), vector.to_vec()))
                .collect(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn name(&self) -> &str {
        "table"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        ensure_embeddable(text)?;
        self.table
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, vector)| Embedding::new(vector.clone(), self.model.clone()))
            .ok_or_else(|| MimirError::InvalidInput(format!("no vector for {text:?}")))
    }
}

/// Fails the first `failures` embeds with `fail_with`, then returns `vector`
/// for any text. Counts calls.
pub struct FlakyEmbedder {
    remaining: AtomicU32,
    fail_with: fn() -> MimirError,
    vector: Vec<f32>,
    calls: AtomicU32,
}

impl FlakyEmbedder {
    pub fn new(failures: u32, fail_with: fn() -> MimirError, vector: &[f32]) -> Self {
        Self {
            remaining: AtomicU32::new(failures),
            fail_with,
            vector: vector.to_vec(),
            calls: AtomicU32::new(0),
        }
    }

    /// Never succeeds.
    pub fn always(fail_with: fn() -> MimirError, dimensions: usize) -> Self {
        Self::new(u32::MAX, fail_with, &vec![0.0; dimensions])
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn name(&self) -> &str {
        "flaky"
    }

    fn model(&self) -> &str {
        "flaky-v1"
    }

    fn dimensions(&self) -> usize {
        self.vector.len()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        ensure_embeddable(text)?;
        let remaining = self.remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.remaining.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok(Embedding::new(self.vector.clone(), "flaky-v1"))
    }
}

// ============================================================================
// Chat models
// ============================================================================

/// Answers by looking up the context message: the first needle contained in
/// it decides the reply. Counts calls.
pub struct ScriptedChat {
    replies: Vec<(String, String)>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl ScriptedChat {
    pub fn new(replies: &[(&str, &str)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(needle, reply)| (needle.to_string(), reply.to_string()))
                .collect(),
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let context = request
            .messages
            .get(1)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(self
            .replies
            .iter()
            .find(|(needle, _)| context.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| "unknown".to_string()))
    }
}

/// Fails the first `failures` calls with `fail_with`, then answers "ok".
pub struct FailThenSucceed {
    remaining: AtomicU32,
    fail_with: fn() -> MimirError,
    calls: AtomicU32,
}

impl FailThenSucceed {
    pub fn new(failures: u32, fail_with: fn() -> MimirError) -> Self {
        Self {
            remaining: AtomicU32::new(failures),
            fail_with,
            calls: AtomicU32::new(0),
        }
    }

    /// Never succeeds.
    pub fn always(fail_with: fn() -> MimirError) -> Self {
        Self::new(u32::MAX, fail_with)
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChatModel for FailThenSucceed {
    fn name(&self) -> &str {
        "mock-retry"
    }

    async fn chat(&self, _request: &ChatRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.remaining.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok("ok".to_string())
    }
}

/// Upstream client without retry around `chat`.
pub fn single_attempt(chat: Arc<dyn ChatModel>) -> UpstreamClient {
    UpstreamClient::new(chat, "gpt-3.5-turbo", RetryPolicy::disabled()).unwrap()
}
