//! Stored cache entries.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A cached upstream answer together with the vector it is found by.
///
/// Besides the response, an entry records the context it was validated
/// under (embedding model and threshold). A cache never serves an entry
/// whose context differs from its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Implementation-assigned identifier (UUID v4).
    pub key: String,
    /// Composite embedding of task and context.
    pub embedding: Vec<f32>,
    pub response_text: String,
    /// Unix timestamp (seconds).
    pub created_at: u64,
    /// Monotonic insertion order within one cache; breaks distance ties and
    /// orders index rebuilds.
    pub sequence: u64,
    #[serde(default)]
    pub hit_count: u64,
    pub query_text: String,
    pub context_text: String,
    /// Model the embedding came from.
    pub embedding_model: String,
    /// Threshold in force when the entry was written.
    pub threshold: f32,
}

impl CacheEntry {
    /// Number of dimensions of the stored embedding.
    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }
}

/// Seconds since the unix epoch.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
