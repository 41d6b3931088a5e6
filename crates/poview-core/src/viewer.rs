//! Entry viewer: the object the presentation layer talks to.
//!
//! [`EntryViewer`] wires an [`EntryStore`], an [`EntryCacheManager`] and an
//! [`InvalidationBridge`] together. Reads go cache-first and fall back to
//! the store; writes go to the store, whose change events keep the cache
//! consistent before the write call returns.
//!
//! Store reads that fill the cache are tagged with the cache's invalidation
//! generation, so a fill racing a write is dropped instead of cached.
//! Writes through the viewer are serialized, which keeps flag
//! read-modify-write cycles from losing each other's changes.

use crate::cache::{CacheStats, EntryCacheManager, InvalidationBridge, PrefetchHandle};
use crate::config::CacheConfig;
use crate::criteria::FilterCriteria;
use crate::error::{PoviewError, Result};
use crate::models::{EntryRecord, EntryStatistics};
use crate::store::EntryStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Cached, invalidation-aware access to one catalog's entries.
pub struct EntryViewer {
    store: Arc<EntryStore>,
    cache: Arc<EntryCacheManager>,
    bridge: InvalidationBridge,
    modified: AtomicBool,
    writes: Mutex<()>,
}

impl EntryViewer {
    /// Create a viewer over a fresh, empty store.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_store(Arc::new(EntryStore::new()?), config)
    }

    /// Create a viewer over an existing store.
    pub fn with_store(store: Arc<EntryStore>, config: CacheConfig) -> Result<Self> {
        let cache = Arc::new(EntryCacheManager::new(config)?);
        let bridge = InvalidationBridge::attach(&store, &cache);
        Ok(Self {
            store,
            cache,
            bridge,
            modified: AtomicBool::new(false),
            writes: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<EntryCacheManager> {
        &self.cache
    }

    pub fn bridge(&self) -> &InvalidationBridge {
        &self.bridge
    }

    // ========================================
    // Reads
    // ========================================

    /// Get an entry by key, cache first.
    pub fn get_entry(&self, key: &str) -> Result<Option<Arc<EntryRecord>>> {
        if let Some(record) = self.cache.get_entry(key) {
            return Ok(Some(record));
        }

        let generation = self.cache.generation();
        let Some(record) = self.store.get(key)? else {
            return Ok(None);
        };
        let record = Arc::new(record);
        self.cache.put_entry_since(key, Arc::clone(&record), generation);
        Ok(Some(record))
    }

    /// Get several entries, cache first, fetching all misses in one store
    /// round-trip. Results follow `keys`; unknown keys are skipped.
    pub fn get_entries_by_keys(&self, keys: &[String]) -> Result<Vec<Arc<EntryRecord>>> {
        let mut found: HashMap<&str, Arc<EntryRecord>> = HashMap::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match self.cache.get_entry(key) {
                Some(record) => {
                    found.insert(key.as_str(), record);
                }
                None => missing.push(key.clone()),
            }
        }

        let generation = self.cache.generation();
        let fetched: Vec<Arc<EntryRecord>> = if missing.is_empty() {
            Vec::new()
        } else {
            debug!("Fetching {} uncached entries", missing.len());
            self.store
                .get_many(&missing)?
                .into_iter()
                .map(Arc::new)
                .collect()
        };
        for record in &fetched {
            self.cache
                .put_entry_since(record.key.clone(), Arc::clone(record), generation);
        }
        let fetched: HashMap<&str, &Arc<EntryRecord>> =
            fetched.iter().map(|r| (r.key.as_str(), r)).collect();

        Ok(keys
            .iter()
            .filter_map(|key| {
                found
                    .get(key.as_str())
                    .or_else(|| fetched.get(key.as_str()).copied())
                    .cloned()
            })
            .collect())
    }

    /// Get the entry at `index` in display order.
    pub fn get_entry_at(&self, index: usize) -> Result<Option<Arc<EntryRecord>>> {
        let generation = self.cache.generation();
        let Some(record) = self.store.get_at(index)? else {
            return Ok(None);
        };
        let record = Arc::new(record);
        self.cache
            .put_entry_since(record.key.clone(), Arc::clone(&record), generation);
        Ok(Some(record))
    }

    /// Entries matching `criteria`, served from the filter-result cache
    /// when possible.
    pub fn get_filtered(&self, criteria: &FilterCriteria) -> Result<Vec<Arc<EntryRecord>>> {
        let cache_key = criteria.cache_key();

        if let Some(keys) = self.cache.get_filtered(&cache_key) {
            return self.get_entries_by_keys(&keys);
        }

        let generation = self.cache.generation();
        let records: Vec<Arc<EntryRecord>> = self
            .store
            .query(criteria)?
            .into_iter()
            .map(Arc::new)
            .collect();

        let keys: Vec<String> = records.iter().map(|r| r.key.clone()).collect();
        for record in &records {
            self.cache
                .put_entry_since(record.key.clone(), Arc::clone(record), generation);
        }
        self.cache.put_filtered_since(cache_key, keys, generation);

        Ok(records)
    }

    /// Number of entries matching `criteria`, ignoring paging.
    pub fn count_filtered(&self, criteria: &FilterCriteria) -> Result<usize> {
        self.store.count_matching(criteria)
    }

    // ========================================
    // Writes
    // ========================================

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_modified(&self) {
        self.modified.store(true, Ordering::SeqCst);
    }

    /// Replace the catalog contents. Clears both cache tiers.
    pub fn load_entries(&self, records: &[EntryRecord]) -> Result<usize> {
        let _writes = self.write_lock();
        let count = self.store.replace_all(records)?;
        self.modified.store(false, Ordering::SeqCst);
        info!("Loaded {} entries", count);
        Ok(count)
    }

    /// Write an edited entry back to the store.
    pub fn update_entry(&self, record: &EntryRecord) -> Result<()> {
        let _writes = self.write_lock();
        self.store.update(record)?;
        self.mark_modified();
        Ok(())
    }

    /// Write several edited entries back in one transaction.
    ///
    /// All or nothing: an unknown key fails with `EntryNotFound` and no
    /// entry changes. The cache is cleared once for the whole batch.
    pub fn update_entries(&self, records: &[EntryRecord]) -> Result<usize> {
        let _writes = self.write_lock();
        let count = self.store.update_bulk(records)?;
        if count > 0 {
            self.mark_modified();
        }
        Ok(count)
    }

    /// Merge entries into the catalog, inserting new keys and replacing
    /// existing ones. Returns `(inserted, updated)`.
    pub fn import_entries(&self, records: &[EntryRecord]) -> Result<(usize, usize)> {
        let _writes = self.write_lock();
        let counts = self.store.upsert_bulk(records)?;
        if !records.is_empty() {
            self.mark_modified();
        }
        Ok(counts)
    }

    /// Move `keys` to the front of the display order, in the given order.
    /// Entries not listed keep their relative order after them.
    pub fn reorder_entries(&self, keys: &[String]) -> Result<usize> {
        let _writes = self.write_lock();
        let count = self.store.reorder(keys)?;
        if count > 0 {
            self.mark_modified();
        }
        Ok(count)
    }

    /// Add or remove a flag. Returns whether the entry changed.
    pub fn set_flag(&self, key: &str, flag: &str, on: bool) -> Result<bool> {
        let _writes = self.write_lock();
        let mut record = self.require_entry(key)?;
        if !record.set_flag(flag, on) {
            return Ok(false);
        }
        self.store.update(&record)?;
        self.mark_modified();
        Ok(true)
    }

    /// Flip a flag. Returns whether the flag is now set.
    pub fn toggle_flag(&self, key: &str, flag: &str) -> Result<bool> {
        let _writes = self.write_lock();
        let mut record = self.require_entry(key)?;
        let on = !record.has_flag(flag.trim());
        if record.set_flag(flag, on) {
            self.store.update(&record)?;
            self.mark_modified();
        }
        Ok(on)
    }

    /// Remove an entry.
    pub fn delete_entry(&self, key: &str) -> Result<()> {
        let _writes = self.write_lock();
        self.store.delete(key)?;
        self.mark_modified();
        Ok(())
    }

    /// Current stored version of `key`, read past the cache.
    fn require_entry(&self, key: &str) -> Result<EntryRecord> {
        self.store
            .get(key)?
            .ok_or_else(|| PoviewError::EntryNotFound {
                key: key.to_string(),
            })
    }

    // ========================================
    // Cache control
    // ========================================

    /// Warm the entry cache for `keys` in the background.
    pub fn prefetch(&self, keys: impl IntoIterator<Item = String>) -> Option<PrefetchHandle> {
        let store = Arc::clone(&self.store);
        self.cache.prefetch(keys, move |batch| store.get_many(batch))
    }

    /// Drop every cached entry and filter result.
    pub fn clear_all(&self) {
        self.cache.clear_all();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    // ========================================
    // Statistics & state
    // ========================================

    pub fn statistics(&self) -> Result<EntryStatistics> {
        self.store.statistics()
    }

    pub fn flag_statistics(&self) -> Result<BTreeMap<String, usize>> {
        self.store.flag_counts()
    }

    /// Whether any write went through this viewer since the last load or save.
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    pub fn mark_saved(&self) {
        self.modified.store(false, Ordering::SeqCst);
    }
}

impl Drop for EntryViewer {
    fn drop(&mut self) {
        self.bridge.detach(&self.store);
    }
}
