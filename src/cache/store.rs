//! Cache stores: key → [`CacheEntry`].
//!
//! - [`MemoryCacheStore`]: moka-backed, in-process. Used by the sweep
//!   harness.
//! - [`JsonFileStore`]: a JSON snapshot on disk, for caches that must
//!   survive a restart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::entry::CacheEntry;
use crate::{MimirError, Result};

/// Durable (or not) mapping from entry key to entry.
pub trait CacheStore: Send + Sync {
    /// Insert or overwrite the entry under `entry.key`.
    fn put(&self, entry: CacheEntry) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Atomically bump the hit count. Returns the new count, or `None` when
    /// the key is unknown.
    fn record_hit(&self, key: &str) -> Result<Option<u64>>;

    /// Returns whether the key existed.
    fn remove(&self, key: &str) -> Result<bool>;

    fn clear(&self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, ordered by insertion sequence.
    fn entries(&self) -> Result<Vec<CacheEntry>>;

    /// Persist anything buffered. No-op for in-memory stores.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// MemoryCacheStore
// ============================================================================

/// Stored value; the hit counter is atomic so concurrent hits never lose
/// an increment.
struct Slot {
    entry: CacheEntry,
    hits: AtomicU64,
}

impl Slot {
    fn snapshot(&self) -> CacheEntry {
        let mut entry = self.entry.clone();
        entry.hit_count = self.hits.load(Ordering::Relaxed);
        entry
    }
}

/// In-memory store on top of moka's concurrent cache.
///
/// Unbounded by default. With [`with_max_entries`](Self::with_max_entries)
/// moka may evict entries; the engine notices and drops the matching index
/// point.
pub struct MemoryCacheStore {
    entries: moka::sync::Cache<String, Arc<Slot>>,
}

impl MemoryCacheStore {
    /// Create an empty, unbounded store.
    pub fn new() -> Self {
        Self {
            entries: moka::sync::Cache::builder().build(),
        }
    }

    /// Create a store holding at most `max` entries.
    pub fn with_max_entries(max: u64) -> Self {
        Self {
            entries: moka::sync::Cache::new(max),
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCacheStore {
    fn put(&self, entry: CacheEntry) -> Result<()> {
        let slot = Slot {
            hits: AtomicU64::new(entry.hit_count),
            entry,
        };
        self.entries.insert(slot.entry.key.clone(), Arc::new(slot));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|slot| slot.snapshot()))
    }

    fn record_hit(&self, key: &str) -> Result<Option<u64>> {
        Ok(self
            .entries
            .get(key)
            .map(|slot| slot.hits.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        Ok(())
    }

    fn len(&self) -> usize {
        // entry_count is eventually consistent until pending tasks run.
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries: Vec<CacheEntry> = self
            .entries
            .iter()
            .map(|(_, slot)| slot.snapshot())
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }
}

// ============================================================================
// JsonFileStore
// ============================================================================

/// Snapshot format version.
const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

struct FileState {
    entries: HashMap<String, CacheEntry>,
    /// Hit counts changed since the last write.
    dirty: bool,
}

/// Store persisted as a single JSON file.
///
/// Writes go to a sibling temp file that is renamed over the snapshot, so a
/// crash leaves either the old or the new file. Hit counts are buffered and
/// written with the next `put`, `remove`, `clear` or `flush` (and on drop).
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl JsonFileStore {
    /// Open the snapshot at `path`, or start empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&content).map_err(|e| {
                MimirError::Store(format!("failed to parse cache file {path:?}: {e}"))
            })?;
            if file.version != STORE_FORMAT_VERSION {
                return Err(MimirError::Store(format!(
                    "cache file {path:?} has format version {}, expected {STORE_FORMAT_VERSION}",
                    file.version
                )));
            }
            file.entries
                .into_iter()
                .map(|entry| (entry.key.clone(), entry))
                .collect()
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "opened cache file");
        Ok(Self {
            path,
            state: Mutex::new(FileState {
                entries,
                dirty: false,
            }),
        })
    }

    /// Location of the snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, FileState>> {
        self.state
            .lock()
            .map_err(|_| MimirError::Store("cache file lock poisoned".to_string()))
    }

    fn persist(&self, state: &mut FileState) -> Result<()> {
        let mut entries: Vec<CacheEntry> = state.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.sequence);
        let json = serde_json::to_string(&StoreFile {
            version: STORE_FORMAT_VERSION,
            entries,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        state.dirty = false;
        Ok(())
    }
}

impl CacheStore for JsonFileStore {
    fn put(&self, entry: CacheEntry) -> Result<()> {
        let mut state = self.lock()?;
        let key = entry.key.clone();
        let previous = state.entries.insert(key.clone(), entry);
        if let Err(e) = self.persist(&mut state) {
            // The snapshot on disk is unchanged; keep memory in step with it.
            match previous {
                Some(previous) => state.entries.insert(key, previous),
                None => state.entries.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.entries.get(key).cloned())
    }

    fn record_hit(&self, key: &str) -> Result<Option<u64>> {
        let mut state = self.lock()?;
        let count = state.entries.get_mut(key).map(|entry| {
            entry.hit_count += 1;
            entry.hit_count
        });
        if count.is_some() {
            state.dirty = true;
        }
        Ok(count)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let existed = state.entries.remove(key).is_some();
        if existed {
            self.persist(&mut state)?;
        }
        Ok(existed)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.entries.clear();
        self.persist(&mut state)
    }

    fn len(&self) -> usize {
        self.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries: Vec<CacheEntry> = self.lock()?.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.dirty {
            self.persist(&mut state)?;
        }
        Ok(())
    }
}

impl Drop for JsonFileStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush cache file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, sequence: u64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            embedding: vec![1.0, 0.0],
            response_text: format!("answer-{key}"),
            created_at: 0,
            sequence,
            hit_count: 0,
            query_text: "q".into(),
            context_text: "c".into(),
            embedding_model: "test".into(),
            threshold: 0.2,
        }
    }

    #[test]
    fn memory_put_get_hit() {
        let store = MemoryCacheStore::new();
        store.put(entry("a", 0)).unwrap();

        assert_eq!(store.record_hit("a").unwrap(), Some(1));
        assert_eq!(store.record_hit("a").unwrap(), Some(2));
        assert_eq!(store.get("a").unwrap().unwrap().hit_count, 2);
        assert_eq!(store.record_hit("missing").unwrap(), None);
    }

    #[test]
    fn memory_clear_empties_store() {
        let store = MemoryCacheStore::new();
        store.put(entry("a", 0)).unwrap();
        store.put(entry("b", 1)).unwrap();
        assert_eq!(store.len(), 2);

        store.clear().unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn memory_entries_in_sequence_order() {
        let store = MemoryCacheStore::new();
        store.put(entry("late", 5)).unwrap();
        store.put(entry("early", 1)).unwrap();

        let keys: Vec<String> = store.entries().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["early", "late"]);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.put(entry("a", 0)).unwrap();
            store.record_hit("a").unwrap();
            // dropped here: buffered hit is flushed
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        let restored = reopened.get("a").unwrap().unwrap();
        assert_eq!(restored.response_text, "answer-a");
        assert_eq!(restored.hit_count, 1);
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path),
            Err(MimirError::Store(_))
        ));
    }

    #[test]
    fn file_store_clear_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.put(entry("a", 0)).unwrap();
        store.clear().unwrap();
        drop(store);

        assert!(JsonFileStore::open(&path).unwrap().is_empty());
    }

    #[test]
    fn file_store_failed_put_leaves_no_orphan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = JsonFileStore::open(&path).unwrap();

        // A directory where the temp snapshot goes makes the write fail.
        let blocker = path.with_extension("json.tmp");
        fs::create_dir(&blocker).unwrap();
        assert!(store.put(entry("lost", 0)).is_err());
        assert!(store.get("lost").unwrap().is_none());
        assert_eq!(store.len(), 0);

        fs::remove_dir(&blocker).unwrap();
        store.put(entry("kept", 1)).unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        let keys: Vec<String> = reopened.entries().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["kept".to_string()]);
    }
}
