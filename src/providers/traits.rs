//! Provider traits for the two external services the cache depends on.
//!
//! - [`Embedder`] turns text into a fixed-dimension vector.
//! - [`ChatModel`] performs one chat-completion call, without retry.
//!
//! Retry lives in [`UpstreamClient`](super::retry::UpstreamClient), which
//! wraps a `ChatModel`, so every implementation stays a single plain call.

use async_trait::async_trait;

use crate::types::{ChatRequest, Embedding};
use crate::{MimirError, Result};

// ============================================================================
// Embedder
// ============================================================================

/// Converts free text into a vector of [`dimensions()`](Embedder::dimensions) floats.
///
/// Implementations must be deterministic for a given model and must reject
/// empty input with [`MimirError::InvalidInput`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider name for logging/debugging (e.g. "local", "huggingface").
    fn name(&self) -> &str;

    /// Model identity. Entries written under one model are never compared
    /// against vectors from another.
    fn model(&self) -> &str;

    /// Declared output dimension.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Shared empty-input check for embedder implementations.
pub fn ensure_embeddable(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(MimirError::InvalidInput(
            "cannot embed empty text".to_string(),
        ));
    }
    Ok(())
}

/// Check a provider response against the declared dimension.
pub fn ensure_dimensions(embedding: &Embedding, expected: usize) -> Result<()> {
    if embedding.values.len() != expected {
        return Err(MimirError::DimensionMismatch {
            expected,
            actual: embedding.values.len(),
        });
    }
    Ok(())
}

// ============================================================================
// Chat Model
// ============================================================================

/// One upstream chat-completion call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name for logging/metrics (e.g. "openai").
    fn name(&self) -> &str;

    /// Reject model names this provider cannot serve. Called once, when an
    /// [`UpstreamClient`](super::retry::UpstreamClient) is built.
    fn validate_model(&self, _model: &str) -> Result<()> {
        Ok(())
    }

    /// Non-streaming chat completion returning the first choice's text.
    async fn chat(&self, request: &ChatRequest) -> Result<String>;
}
