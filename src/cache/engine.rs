//! The semantic cache engine.
//!
//! [`SemanticCache`] ties an [`Embedder`], a [`VectorIndex`] and a
//! [`CacheStore`] together behind get-or-compute semantics:
//!
//! ```text
//! query ─▶ embed(task ⏎⏎ context) ─▶ nearest(1) ─▶ distance ≤ τ ? ─▶ stored answer
//!                                                        │
//!                                                        └─ no ─▶ upstream ─▶ write entry
//! ```
//!
//! # Locking
//!
//! Lookups share a read lock. A miss takes the write lock, probes the index
//! again and only then calls upstream, so concurrent misses for the same
//! question produce a single upstream call and a single entry. The write
//! lock is held across the upstream call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::entry::{CacheEntry, unix_now};
use super::index::{DistanceMetric, FlatIndex, VectorIndex};
use super::store::{CacheStore, MemoryCacheStore};
use crate::providers::traits::Embedder;
use crate::providers::UpstreamClient;
use crate::telemetry;
use crate::types::CacheQuery;
use crate::{MimirError, Result};

/// Default similarity threshold (cosine distance).
pub const DEFAULT_THRESHOLD: f32 = 0.2;

/// Construction-time cache settings.
///
/// ```rust
/// # use mimir::cache::{DistanceMetric, SemanticCacheConfig};
/// let config = SemanticCacheConfig::new()
///     .threshold(0.1)
///     .metric(DistanceMetric::Cosine);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticCacheConfig {
    /// Maximum distance at which a stored entry answers a query. Default: 0.2.
    pub threshold: f32,
    /// Default: cosine.
    pub metric: DistanceMetric,
    /// On open, clear a store written under a different model, dimension or
    /// threshold instead of failing. Default: false.
    pub rebuild_on_mismatch: bool,
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            metric: DistanceMetric::Cosine,
            rebuild_on_mismatch: false,
        }
    }
}

impl SemanticCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn rebuild_on_mismatch(mut self, rebuild: bool) -> Self {
        self.rebuild_on_mismatch = rebuild;
        self
    }

    /// Check the threshold is meaningful for the metric.
    pub fn validate(&self) -> Result<()> {
        let t = self.threshold;
        if !t.is_finite() || t < 0.0 {
            return Err(MimirError::Configuration(format!(
                "similarity threshold must be a non-negative number, got {t}"
            )));
        }
        if self.metric == DistanceMetric::Cosine && t > 1.0 {
            return Err(MimirError::Configuration(format!(
                "cosine similarity threshold must be within [0, 1], got {t}"
            )));
        }
        Ok(())
    }
}

/// Outcome of [`SemanticCache::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub response_text: String,
    pub was_cache_hit: bool,
    /// Key of the entry that answered (hit) or was written (miss).
    pub entry_key: String,
    /// Distance to the matched entry; `None` on a miss.
    pub distance: Option<f32>,
    /// Hit count of the entry after this call.
    pub hit_count: u64,
}

/// A stored entry close enough to answer a query.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMatch {
    pub entry: CacheEntry,
    pub distance: f32,
}

/// Counters since construction or the last [`reset`](SemanticCache::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache; 0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    index: Box<dyn VectorIndex>,
    store: Box<dyn CacheStore>,
    next_sequence: u64,
}

enum Probe {
    Hit(CacheMatch),
    Miss,
    /// Index points at a key the store no longer has.
    Stale(String),
}

/// Semantic result cache bound to one embedder and one threshold.
pub struct SemanticCache {
    embedder: Arc<dyn Embedder>,
    config: SemanticCacheConfig,
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SemanticCache {
    /// Empty in-memory cache.
    pub fn new(embedder: Arc<dyn Embedder>, config: SemanticCacheConfig) -> Result<Self> {
        Self::open(embedder, config, MemoryCacheStore::new())
    }

    /// Cache over an existing store, rebuilding the index from its entries.
    pub fn open(
        embedder: Arc<dyn Embedder>,
        config: SemanticCacheConfig,
        store: impl CacheStore + 'static,
    ) -> Result<Self> {
        let index = FlatIndex::new(embedder.dimensions(), config.metric);
        Self::from_parts(embedder, config, Box::new(index), Box::new(store))
    }

    /// Cache over caller-provided parts. The index must be empty and agree
    /// with the embedder's dimension and the configured metric.
    pub fn from_parts(
        embedder: Arc<dyn Embedder>,
        config: SemanticCacheConfig,
        mut index: Box<dyn VectorIndex>,
        store: Box<dyn CacheStore>,
    ) -> Result<Self> {
        config.validate()?;
        if index.dimensions() != embedder.dimensions() {
            return Err(MimirError::DimensionMismatch {
                expected: embedder.dimensions(),
                actual: index.dimensions(),
            });
        }
        if index.metric() != config.metric {
            return Err(MimirError::Configuration(format!(
                "index uses {} distance but the cache is configured for {}",
                index.metric().as_str(),
                config.metric.as_str()
            )));
        }
        if !index.is_empty() {
            return Err(MimirError::Configuration(
                "vector index must be empty; it is rebuilt from the store".to_string(),
            ));
        }

        let entries = store.entries()?;
        let mismatch = entries
            .iter()
            .find_map(|entry| context_mismatch(entry, embedder.as_ref(), config.threshold));

        let mut next_sequence = 0;
        match mismatch {
            Some(err) if config.rebuild_on_mismatch => {
                warn!(
                    error = %err,
                    entries = entries.len(),
                    "cache store was written under a different configuration, clearing it"
                );
                store.clear()?;
            }
            Some(err) => return Err(err),
            None => {
                for entry in entries {
                    next_sequence = next_sequence.max(entry.sequence + 1);
                    index.insert(entry.embedding, entry.key)?;
                }
            }
        }

        info!(
            embedder = embedder.name(),
            model = embedder.model(),
            threshold = config.threshold,
            entries = index.len(),
            "semantic cache ready"
        );
        metrics::gauge!(telemetry::CACHE_ENTRIES).set(index.len() as f64);

        Ok(Self {
            embedder,
            config,
            state: RwLock::new(CacheState {
                index,
                store,
                next_sequence,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Answer `query` from the cache, or from `upstream` on a miss.
    ///
    /// Upstream failures are returned as-is and never cached. Embedder
    /// failures come back as [`MimirError::Embedding`].
    #[instrument(skip(self, query, upstream), fields(embedder = %self.embedder.name(), threshold = self.config.threshold))]
    pub async fn resolve(
        &self,
        query: &CacheQuery,
        upstream: &UpstreamClient,
    ) -> Result<Resolution> {
        let start = Instant::now();
        let result = self.resolve_inner(query, upstream).await;
        let outcome = match &result {
            Ok(r) if r.was_cache_hit => "hit",
            Ok(_) => "miss",
            Err(_) => "error",
        };
        metrics::histogram!(telemetry::RESOLVE_DURATION_SECONDS, "outcome" => outcome)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn resolve_inner(
        &self,
        query: &CacheQuery,
        upstream: &UpstreamClient,
    ) -> Result<Resolution> {
        query.validate()?;
        let vector = self.embed_query(query).await?;

        {
            let state = self.state.read().await;
            if let Probe::Hit(found) = self.probe(&state, &vector)? {
                return self.serve_hit(&state, found);
            }
        }

        let mut state = self.state.write().await;
        // Another caller may have written a matching entry while we waited.
        loop {
            match self.probe(&state, &vector)? {
                Probe::Hit(found) => return self.serve_hit(&state, found),
                Probe::Stale(key) => {
                    debug!(key = %key, "dropping index point for evicted entry");
                    state.index.remove(&key);
                }
                Probe::Miss => break,
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        debug!("cache miss, calling upstream");

        let response_text = upstream.complete(query).await?;

        let entry = CacheEntry {
            key: uuid::Uuid::new_v4().to_string(),
            embedding: vector.clone(),
            response_text: response_text.clone(),
            created_at: unix_now(),
            sequence: state.next_sequence,
            hit_count: 0,
            query_text: query.query_text.clone(),
            context_text: query.context_text.clone(),
            embedding_model: self.embedder.model().to_string(),
            threshold: self.config.threshold,
        };
        let key = entry.key.clone();

        state.index.insert(vector, key.clone())?;
        if let Err(e) = state.store.put(entry) {
            state.index.remove(&key);
            return Err(e);
        }
        state.next_sequence += 1;
        metrics::gauge!(telemetry::CACHE_ENTRIES).set(state.index.len() as f64);

        Ok(Resolution {
            response_text,
            was_cache_hit: false,
            entry_key: key,
            distance: None,
            hit_count: 0,
        })
    }

    /// Find the entry that would answer `query`, without calling upstream or
    /// counting a hit.
    pub async fn lookup(&self, query: &CacheQuery) -> Result<Option<CacheMatch>> {
        query.validate()?;
        let vector = self.embed_query(query).await?;
        let state = self.state.read().await;
        match self.probe(&state, &vector)? {
            Probe::Hit(found) => Ok(Some(found)),
            Probe::Miss | Probe::Stale(_) => Ok(None),
        }
    }

    /// Drop every entry and zero the counters.
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.index.clear();
        state.store.clear()?;
        state.next_sequence = 0;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        metrics::gauge!(telemetry::CACHE_ENTRIES).set(0.0);
        debug!("semantic cache reset");
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            entries: state.store.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Stored entry by key.
    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.state.read().await.store.get(key)
    }

    /// Persist buffered store state (hit counts for file-backed stores).
    pub async fn flush(&self) -> Result<()> {
        self.state.read().await.store.flush()
    }

    async fn embed_query(&self, query: &CacheQuery) -> Result<Vec<f32>> {
        let embedding = self
            .embedder
            .embed(&query.composite_text())
            .await
            .map_err(|e| MimirError::Embedding(Box::new(e)))?;
        let expected = self.embedder.dimensions();
        if embedding.values.len() != expected {
            return Err(MimirError::DimensionMismatch {
                expected,
                actual: embedding.values.len(),
            });
        }
        Ok(embedding.values)
    }

    fn probe(&self, state: &CacheState, vector: &[f32]) -> Result<Probe> {
        let Some(nearest) = state.index.nearest(vector, 1)?.into_iter().next() else {
            return Ok(Probe::Miss);
        };
        if nearest.distance > self.config.threshold {
            debug!(distance = nearest.distance, "nearest entry outside threshold");
            return Ok(Probe::Miss);
        }
        let Some(entry) = state.store.get(&nearest.key)? else {
            return Ok(Probe::Stale(nearest.key));
        };
        if let Some(err) = context_mismatch(&entry, self.embedder.as_ref(), self.config.threshold)
        {
            return Err(err);
        }
        Ok(Probe::Hit(CacheMatch {
            entry,
            distance: nearest.distance,
        }))
    }

    fn serve_hit(&self, state: &CacheState, found: CacheMatch) -> Result<Resolution> {
        let CacheMatch { entry, distance } = found;
        let hit_count = state
            .store
            .record_hit(&entry.key)?
            .unwrap_or(entry.hit_count + 1);

        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        debug!(key = %entry.key, distance, hit_count, "cache hit");

        Ok(Resolution {
            response_text: entry.response_text,
            was_cache_hit: true,
            entry_key: entry.key,
            distance: Some(distance),
            hit_count,
        })
    }
}

impl std::fmt::Debug for SemanticCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticCache")
            .field("embedder", &self.embedder.name())
            .field("model", &self.embedder.model())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Why `entry` may not be served by a cache with this embedder and threshold.
fn context_mismatch(entry: &CacheEntry, embedder: &dyn Embedder, threshold: f32) -> Option<MimirError> {
    if entry.dimensions() != embedder.dimensions() {
        return Some(MimirError::DimensionMismatch {
            expected: embedder.dimensions(),
            actual: entry.dimensions(),
        });
    }
    if entry.embedding_model != embedder.model() {
        return Some(MimirError::Configuration(format!(
            "cache entry {} was embedded with {:?}, cache uses {:?}",
            entry.key,
            entry.embedding_model,
            embedder.model()
        )));
    }
    if entry.threshold != threshold {
        return Some(MimirError::Configuration(format!(
            "cache entry {} was validated under threshold {}, cache uses {threshold}",
            entry.key, entry.threshold
        )));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SemanticCacheConfig::default();
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert!(!config.rebuild_on_mismatch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cosine_threshold_bounds() {
        assert!(SemanticCacheConfig::new().threshold(0.0).validate().is_ok());
        assert!(SemanticCacheConfig::new().threshold(1.0).validate().is_ok());
        assert!(SemanticCacheConfig::new().threshold(1.5).validate().is_err());
        assert!(SemanticCacheConfig::new().threshold(-0.1).validate().is_err());
        assert!(SemanticCacheConfig::new().threshold(f32::NAN).validate().is_err());
    }

    #[test]
    fn euclidean_allows_large_threshold() {
        let config = SemanticCacheConfig::new()
            .metric(DistanceMetric::Euclidean)
            .threshold(3.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn hit_rate_handles_empty() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
        let stats = CacheStats {
            entries: 1,
            hits: 3,
            misses: 1,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
