//! Embedding providers and the upstream chat model.
//!
//! - [`traits`]: the [`Embedder`] and [`ChatModel`] capabilities
//! - [`retry`]: [`RetryPolicy`], the retrying [`UpstreamClient`] and [`RetryingEmbedder`]
//! - [`factory`]: provider selection for cache construction and sweeps
//! - [`openai`]: OpenAI-compatible chat completions
//! - `huggingface` / `fastembed`: remote and local embedders (feature-gated)

pub mod factory;
#[cfg(feature = "local-inference")]
pub mod fastembed;
#[cfg(feature = "huggingface")]
pub mod huggingface;
pub mod openai;
pub mod retry;
pub mod traits;

pub use factory::{DefaultEmbedderFactory, EmbedderFactory, EmbedderSpec, EmbeddingProviderKind};
#[cfg(feature = "local-inference")]
pub use fastembed::{LocalEmbeddingModel, LocalEmbeddingProvider};
#[cfg(feature = "huggingface")]
pub use huggingface::RemoteEmbeddingProvider;
pub use openai::OpenAiChatClient;
pub use retry::{Backoff, RetryPolicy, RetryingEmbedder, UpstreamClient};
pub use traits::{ChatModel, Embedder};
