//! Keeps the entry cache consistent with store writes.

use super::manager::EntryCacheManager;
use crate::store::{ChangeEvent, EntryStore, ListenerId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct BridgeCounters {
    events: AtomicU64,
    fallbacks: AtomicU64,
}

/// Subscription translating store change events into cache invalidation.
///
/// Every keyed event drops that entry's slot and the whole filter-result
/// tier; bulk events clear both tiers. If targeted invalidation fails the
/// bridge clears everything instead. The cache is held weakly, so dropping
/// it turns the subscription into a no-op.
pub struct InvalidationBridge {
    listener: ListenerId,
    counters: Arc<BridgeCounters>,
}

impl InvalidationBridge {
    /// Subscribe `cache` to `store`'s change events.
    pub fn attach(store: &EntryStore, cache: &Arc<EntryCacheManager>) -> Self {
        let weak: Weak<EntryCacheManager> = Arc::downgrade(cache);
        let counters = Arc::new(BridgeCounters::default());
        let sink = Arc::clone(&counters);

        let listener = store.on_change(move |event| {
            let Some(cache) = weak.upgrade() else {
                return;
            };
            sink.events.fetch_add(1, Ordering::Relaxed);
            if !Self::apply(&cache, event) {
                sink.fallbacks.fetch_add(1, Ordering::Relaxed);
            }
        });

        debug!("Invalidation bridge attached");
        Self { listener, counters }
    }

    /// Apply one event to `cache`. Returns `false` if targeted
    /// invalidation failed and the cache was cleared instead.
    pub fn apply(cache: &EntryCacheManager, event: &ChangeEvent) -> bool {
        let Some(key) = event.key() else {
            cache.clear_all();
            return true;
        };

        let result = cache
            .invalidate_entry(key)
            .and_then(|_| cache.invalidate_filters());
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Targeted invalidation failed, clearing cache: {}", e);
                cache.clear_all();
                false
            }
        }
    }

    /// Unsubscribe from `store`.
    pub fn detach(&self, store: &EntryStore) -> bool {
        store.remove_listener(self.listener)
    }

    /// Events handled so far.
    pub fn events_handled(&self) -> u64 {
        self.counters.events.load(Ordering::Relaxed)
    }

    /// Events that fell back to a full clear.
    pub fn fallbacks(&self) -> u64 {
        self.counters.fallbacks.load(Ordering::Relaxed)
    }
}
