//! The two-tier entry cache.

use super::tier::{BoundedTier, TierStats};
use crate::config::CacheConfig;
use crate::criteria::CacheKey;
use crate::error::{PoviewError, Result};
use crate::models::EntryRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Snapshot of cache occupancy and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: TierStats,
    pub filters: TierStats,
    /// Keys currently being fetched by prefetch tasks.
    pub in_flight: usize,
}

/// Everything guarded by the cache mutex.
pub(super) struct CacheState {
    pub(super) entries: BoundedTier<String, Arc<EntryRecord>>,
    pub(super) filters: BoundedTier<CacheKey, Arc<[String]>>,
    /// Prefetch tickets by key. A fetched record is only inserted while
    /// its ticket is still the one recorded here.
    pub(super) in_flight: HashMap<String, u64>,
    pub(super) next_ticket: u64,
    /// Bumped by every invalidation. A fill computed from a store read is
    /// only cached if no invalidation happened since the read began.
    generation: u64,
}

impl CacheState {
    fn new(config: &CacheConfig) -> Self {
        Self {
            entries: BoundedTier::new(
                config.entry_cache_max_entries,
                config.entry_cache_max_bytes,
                config.entry_ttl(),
            ),
            filters: BoundedTier::new(
                config.filter_cache_max_entries,
                config.filter_cache_max_bytes,
                None,
            ),
            in_flight: HashMap::new(),
            next_ticket: 1,
            generation: 0,
        }
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn clear(&mut self) -> (usize, usize) {
        self.bump();
        self.in_flight.clear();
        (self.entries.clear(), self.filters.clear())
    }
}

/// Estimated footprint of a filter result.
fn filtered_size(keys: &[String]) -> usize {
    std::mem::size_of::<Arc<[String]>>()
        + keys
            .iter()
            .map(|k| k.len() + std::mem::size_of::<String>())
            .sum::<usize>()
}

/// Complete-entry cache plus filter-result cache.
///
/// Misses are `None`; the manager never talks to the store itself. Both
/// tiers and the prefetch in-flight set share one mutex, and no method
/// holds it across I/O.
pub struct EntryCacheManager {
    pub(super) config: CacheConfig,
    pub(super) state: Mutex<CacheState>,
    pub(super) enabled: AtomicBool,
    pub(super) prefetch_permits: Arc<Semaphore>,
}

impl EntryCacheManager {
    /// Create a cache manager. Fails if `config` does not validate.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Entry cache: {} entries / {} bytes, filter cache: {} results / {} bytes",
            config.entry_cache_max_entries,
            config.entry_cache_max_bytes,
            config.filter_cache_max_entries,
            config.filter_cache_max_bytes
        );
        Ok(Self {
            state: Mutex::new(CacheState::new(&config)),
            enabled: AtomicBool::new(config.cache_enabled),
            prefetch_permits: Arc::new(Semaphore::new(config.prefetch_workers)),
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub(super) fn lock(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|e| PoviewError::LockPoisoned(e.to_string()))
    }

    /// Lock for reads and puts; a poisoned lock is treated as unavailable.
    fn try_lock(&self, op: &str) -> Option<MutexGuard<'_, CacheState>> {
        if !self.is_enabled() {
            return None;
        }
        match self.lock() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("Skipping cache {}: {}", op, e);
                None
            }
        }
    }

    /// Current invalidation generation.
    ///
    /// Read it before a store read and hand it to [`put_entry_since`] or
    /// [`put_filtered_since`]; the put is dropped if a write invalidated
    /// anything in between.
    ///
    /// [`put_entry_since`]: Self::put_entry_since
    /// [`put_filtered_since`]: Self::put_filtered_since
    pub fn generation(&self) -> u64 {
        self.state
            .lock()
            .map(|state| state.generation)
            .unwrap_or_else(|e| e.into_inner().generation)
    }

    // ========================================
    // Complete-entry tier
    // ========================================

    /// Cached record for `key`, refreshing its recency.
    pub fn get_entry(&self, key: &str) -> Option<Arc<EntryRecord>> {
        let record = self.try_lock("get_entry")?.entries.get(key);
        debug!(
            "Entry cache {}: {}",
            if record.is_some() { "hit" } else { "miss" },
            key
        );
        record
    }

    /// Whether a live record for `key` is cached. Does not refresh recency.
    pub fn contains_entry(&self, key: &str) -> bool {
        self.try_lock("contains_entry")
            .is_some_and(|state| state.entries.contains(key))
    }

    /// Cache a record. Supersedes any prefetch in flight for the key.
    pub fn put_entry(&self, key: impl Into<String>, record: Arc<EntryRecord>) {
        self.store_entry(key.into(), record, None);
    }

    /// Cache a record read from the store at `generation`. Returns `false`
    /// and caches nothing if an invalidation happened since.
    pub fn put_entry_since(
        &self,
        key: impl Into<String>,
        record: Arc<EntryRecord>,
        generation: u64,
    ) -> bool {
        self.store_entry(key.into(), record, Some(generation))
    }

    fn store_entry(&self, key: String, record: Arc<EntryRecord>, since: Option<u64>) -> bool {
        let Some(mut state) = self.try_lock("put_entry") else {
            return false;
        };
        if since.is_some_and(|generation| generation != state.generation) {
            debug!("Dropping stale fill for entry {}", key);
            return false;
        }
        state.in_flight.remove(&key);
        let size = record.estimated_size();
        if !state.entries.put(key.clone(), record, size) {
            debug!("Entry {} ({} bytes) exceeds the entry cache bound", key, size);
            return false;
        }
        true
    }

    /// Drop the cached record for `key` and revoke its prefetch ticket.
    pub fn invalidate_entry(&self, key: &str) -> Result<()> {
        let mut state = self.lock().map_err(|e| PoviewError::Invalidation {
            key: Some(key.to_string()),
            message: e.to_string(),
        })?;
        state.bump();
        let revoked = state.in_flight.remove(key).is_some();
        let removed = state.entries.remove(key);
        debug!(
            "Invalidated entry {} (cached: {}, prefetch revoked: {})",
            key, removed, revoked
        );
        Ok(())
    }

    // ========================================
    // Filter-result tier
    // ========================================

    /// Cached ordered keys for a filter. `Some(empty)` is a cached empty
    /// result, distinct from a miss.
    pub fn get_filtered(&self, cache_key: &CacheKey) -> Option<Arc<[String]>> {
        let keys = self.try_lock("get_filtered")?.filters.get(cache_key);
        debug!(
            "Filter cache {}: {}",
            if keys.is_some() { "hit" } else { "miss" },
            cache_key
        );
        keys
    }

    pub fn put_filtered(&self, cache_key: CacheKey, keys: impl Into<Arc<[String]>>) {
        self.store_filtered(cache_key, keys.into(), None);
    }

    /// Cache a filter result computed at `generation`. Returns `false` and
    /// caches nothing if an invalidation happened since.
    pub fn put_filtered_since(
        &self,
        cache_key: CacheKey,
        keys: impl Into<Arc<[String]>>,
        generation: u64,
    ) -> bool {
        self.store_filtered(cache_key, keys.into(), Some(generation))
    }

    fn store_filtered(
        &self,
        cache_key: CacheKey,
        keys: Arc<[String]>,
        since: Option<u64>,
    ) -> bool {
        let Some(mut state) = self.try_lock("put_filtered") else {
            return false;
        };
        if since.is_some_and(|generation| generation != state.generation) {
            debug!("Dropping stale fill for filter {}", cache_key);
            return false;
        }
        let size = filtered_size(&keys);
        if !state.filters.put(cache_key, keys, size) {
            debug!("Filter result {} ({} bytes) exceeds the filter cache bound", cache_key, size);
            return false;
        }
        true
    }

    /// Drop every cached filter result.
    pub fn invalidate_filters(&self) -> Result<()> {
        let mut state = self.lock().map_err(|e| PoviewError::Invalidation {
            key: None,
            message: e.to_string(),
        })?;
        state.bump();
        let removed = state.filters.clear();
        debug!("Invalidated {} filter results", removed);
        Ok(())
    }

    // ========================================
    // Whole-cache operations
    // ========================================

    /// Empty both tiers and revoke every prefetch ticket.
    ///
    /// Never fails: a poisoned lock is recovered.
    pub fn clear_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering poisoned cache lock");
            self.state.clear_poison();
            poisoned.into_inner()
        });
        let (entries, filters) = state.clear();
        info!("Cleared cache ({} entries, {} filter results)", entries, filters);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn caching on or off. Disabling empties both tiers; while disabled
    /// lookups miss and puts are dropped.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was && !enabled {
            self.clear_all();
        }
        if was != enabled {
            info!("Cache {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    /// Whether a prefetch task is currently fetching `key`.
    pub fn is_prefetching(&self, key: &str) -> bool {
        self.lock()
            .map(|state| state.in_flight.contains_key(key))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            enabled: self.is_enabled(),
            entries: state.entries.stats(),
            filters: state.filters.stats(),
            in_flight: state.in_flight.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::FilterCriteria;

    fn record(msgid: &str) -> Arc<EntryRecord> {
        Arc::new(EntryRecord::new(None, msgid, ""))
    }

    fn manager(pairs: &[(&str, &str)]) -> EntryCacheManager {
        EntryCacheManager::new(CacheConfig::from_pairs(pairs.iter().copied()).unwrap()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = CacheConfig {
            prefetch_workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            EntryCacheManager::new(config),
            Err(PoviewError::Config { .. })
        ));
    }

    #[test]
    fn test_entry_round_trip_and_invalidate() {
        let cache = manager(&[]);
        let a = record("a");
        cache.put_entry("|a", Arc::clone(&a));

        assert!(Arc::ptr_eq(&cache.get_entry("|a").unwrap(), &a));
        cache.invalidate_entry("|a").unwrap();
        assert!(cache.get_entry("|a").is_none());
        // Idempotent
        cache.invalidate_entry("|a").unwrap();
    }

    #[test]
    fn test_empty_filter_result_is_a_hit() {
        let cache = manager(&[]);
        let key = FilterCriteria::keyword_only("nothing").cache_key();

        assert!(cache.get_filtered(&key).is_none());
        cache.put_filtered(key, Vec::<String>::new());
        assert_eq!(cache.get_filtered(&key).unwrap().len(), 0);
    }

    #[test]
    fn test_invalidate_filters_keeps_entries() {
        let cache = manager(&[]);
        let key = FilterCriteria::all().cache_key();
        cache.put_entry("|a", record("a"));
        cache.put_filtered(key, vec!["|a".to_string()]);

        cache.invalidate_filters().unwrap();

        assert!(cache.get_filtered(&key).is_none());
        assert!(cache.get_entry("|a").is_some());
    }

    #[test]
    fn test_fill_after_invalidation_is_dropped() {
        let cache = manager(&[]);
        let key = FilterCriteria::all().cache_key();

        let before = cache.generation();
        cache.invalidate_entry("|a").unwrap();
        assert!(!cache.put_entry_since("|a", record("stale"), before));
        assert!(!cache.put_filtered_since(key, vec!["|a".to_string()], before));
        assert!(cache.get_entry("|a").is_none());
        assert!(cache.get_filtered(&key).is_none());

        let before = cache.generation();
        cache.invalidate_filters().unwrap();
        assert!(!cache.put_entry_since("|a", record("stale"), before));

        let before = cache.generation();
        cache.clear_all();
        assert!(!cache.put_filtered_since(key, vec!["|a".to_string()], before));

        let current = cache.generation();
        assert!(cache.put_entry_since("|a", record("a"), current));
        assert!(cache.put_filtered_since(key, vec!["|a".to_string()], current));
        assert!(cache.get_entry("|a").is_some());
        assert!(cache.get_filtered(&key).is_some());
    }

    #[test]
    fn test_clear_all_recovers_poisoned_lock() {
        let cache = Arc::new(manager(&[]));
        cache.put_entry("|a", record("a"));

        let poisoner = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.state.lock().unwrap();
            panic!("poison the cache lock");
        })
        .join();

        assert!(cache.invalidate_entry("|a").is_err());
        cache.clear_all();
        assert!(cache.invalidate_entry("|a").is_ok());
        assert_eq!(cache.stats().entries.entries, 0);
    }

    #[test]
    fn test_disabled_cache_misses_and_drops_puts() {
        let cache = manager(&[]);
        cache.put_entry("|a", record("a"));

        cache.set_enabled(false);
        assert!(cache.get_entry("|a").is_none());
        cache.put_entry("|b", record("b"));

        cache.set_enabled(true);
        assert!(cache.get_entry("|a").is_none());
        assert!(cache.get_entry("|b").is_none());
        assert!(cache.stats().enabled);
    }

    #[test]
    fn test_stats() {
        let cache = manager(&[("entry_cache_max_entries", "1")]);
        cache.put_entry("|a", record("a"));
        cache.put_entry("|b", record("b"));
        cache.get_entry("|b");
        cache.get_entry("|a");

        let stats = cache.stats();
        assert!(stats.enabled);
        assert_eq!(stats.entries.entries, 1);
        assert_eq!(stats.entries.max_entries, 1);
        assert_eq!(stats.entries.evictions, 1);
        assert_eq!((stats.entries.hits, stats.entries.misses), (1, 1));
        assert_eq!(stats.in_flight, 0);
    }
}
