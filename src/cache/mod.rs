//! Semantic caching subsystem.
//!
//! - [`index`]: nearest-neighbour search over entry embeddings
//! - [`store`]: key → [`CacheEntry`] storage, in memory or on disk
//! - [`engine`]: [`SemanticCache`], which decides hit or miss and writes
//!   new answers back

pub mod engine;
pub mod entry;
pub mod index;
pub mod store;

pub use engine::{
    CacheMatch, CacheStats, DEFAULT_THRESHOLD, Resolution, SemanticCache, SemanticCacheConfig,
};
pub use entry::CacheEntry;
pub use index::{DistanceMetric, FlatIndex, Neighbor, VectorIndex};
pub use store::{CacheStore, JsonFileStore, MemoryCacheStore};
