//! Bounded cache tier: an [`lru::LruCache`] with estimated-size accounting
//! and optional TTL.

use lru::LruCache;
use serde::Serialize;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// Counters and occupancy of one cache tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub entries: usize,
    pub bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Values refused because they alone exceed `max_bytes`.
    pub rejected: u64,
}

struct Slot<V> {
    value: V,
    size: usize,
    expires_at: Option<Instant>,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// One tier of the cache, bounded by entry count and total size.
///
/// The count bound is the capacity of the underlying [`LruCache`]; the byte
/// bound is enforced here by popping least-recently-used slots. Expiry is
/// checked lazily on read.
pub(crate) struct BoundedTier<K: Hash + Eq, V> {
    slots: LruCache<K, Slot<V>>,
    bytes: usize,
    max_bytes: usize,
    ttl: Option<Duration>,
    stats: TierStats,
}

impl<K, V> BoundedTier<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(max_entries: usize, max_bytes: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: LruCache::new(capacity),
            bytes: 0,
            max_bytes,
            ttl,
            stats: TierStats::default(),
        }
    }

    /// Look up a value, refreshing its recency. Expired slots are dropped
    /// and reported as a miss.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let expired = match self.slots.peek(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(slot) => slot.is_expired(Instant::now()),
        };

        if expired {
            self.remove(key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.slots.get(key).map(|slot| slot.value.clone())
    }

    /// Whether a live value is present. Does not touch recency or counters.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.slots
            .peek(key)
            .is_some_and(|slot| !slot.is_expired(Instant::now()))
    }

    /// Insert or replace a value, evicting least-recently-used slots until
    /// both bounds hold.
    ///
    /// Returns `false` when the value alone exceeds `max_bytes`; it is not
    /// stored and any previous value for the key is dropped.
    pub fn put(&mut self, key: K, value: V, size: usize) -> bool {
        self.remove(&key);

        if size > self.max_bytes {
            self.stats.rejected += 1;
            return false;
        }

        // An unrepresentable deadline means the slot never expires.
        let expires_at = self.ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        let slot = Slot {
            value,
            size,
            expires_at,
        };
        if let Some((_, evicted)) = self.slots.push(key, slot) {
            self.bytes -= evicted.size;
            self.stats.evictions += 1;
        }
        self.bytes += size;

        while self.bytes > self.max_bytes {
            let Some((_, evicted)) = self.slots.pop_lru() else {
                break;
            };
            self.bytes -= evicted.size;
            self.stats.evictions += 1;
        }
        true
    }

    /// Remove a slot. Returns whether one was present.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.slots.pop(key) {
            Some(slot) => {
                self.bytes -= slot.size;
                true
            }
            None => false,
        }
    }

    /// Drop every slot. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.slots.len();
        self.slots.clear();
        self.bytes = 0;
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            entries: self.slots.len(),
            bytes: self.bytes,
            max_entries: self.slots.cap().get(),
            max_bytes: self.max_bytes,
            ..self.stats
        }
    }
}
