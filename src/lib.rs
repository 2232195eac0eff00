//! Mimir - semantic result cache for expensive LLM queries
//!
//! A [`SemanticCache`] answers a query from a stored response when an
//! earlier query was close enough in embedding space, and otherwise calls
//! the upstream model through a retrying [`UpstreamClient`] and remembers
//! the answer. The [`harness`] measures what that trade costs in accuracy
//! and saves in latency across embedders and thresholds.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mimir::providers::{OpenAiChatClient, RemoteEmbeddingProvider};
//! use mimir::{CacheQuery, RetryPolicy, SemanticCache, SemanticCacheConfig, UpstreamClient};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let embedder = RemoteEmbeddingProvider::new(
//!         "hf_your_key",
//!         "sentence-transformers/all-MiniLM-L6-v2",
//!         384,
//!     )?;
//!     let cache = SemanticCache::new(Arc::new(embedder), SemanticCacheConfig::new())?;
//!
//!     let upstream = UpstreamClient::new(
//!         Arc::new(OpenAiChatClient::new("sk-your-key")?),
//!         "gpt-3.5-turbo",
//!         RetryPolicy::default(),
//!     )?;
//!
//!     let query = CacheQuery::new("What subject is this question about?", "What is entropy?");
//!     let resolution = cache.resolve(&query, &upstream).await?;
//!     println!("{} (hit: {})", resolution.response_text, resolution.was_cache_hit);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod harness;
pub mod providers;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{
    CacheEntry, CacheStats, CacheStore, DistanceMetric, FlatIndex, JsonFileStore,
    MemoryCacheStore, Resolution, SemanticCache, SemanticCacheConfig, VectorIndex,
};
pub use config::Config;
pub use error::{ErrorKind, MimirError, Result};
pub use harness::{CancelToken, Dataset, Sweep, SweepConfig, SweepReport};
pub use providers::{
    Backoff, ChatModel, Embedder, EmbedderFactory, EmbedderSpec, EmbeddingProviderKind,
    RetryPolicy, RetryingEmbedder, UpstreamClient,
};
pub use types::{CacheQuery, ChatRequest, Embedding, Message, Role};
