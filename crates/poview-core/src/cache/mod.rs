//! Two-tier entry cache for poview.
//!
//! Provides the caching layer between the presentation layer and the
//! entry store:
//! - Complete-entry cache (record key → shared record)
//! - Filter-result cache (criteria cache key → ordered record keys)
//! - Background prefetch on tokio's blocking pool
//! - Store-driven invalidation through [`InvalidationBridge`]
//!
//! Both tiers are `lru` caches bounded by entry count and estimated memory.

pub mod bridge;
mod tier;
mod manager;
mod prefetch;

pub use bridge::InvalidationBridge;
pub use tier::TierStats;
pub use manager::{CacheStats, EntryCacheManager};
pub use prefetch::{PrefetchHandle, PrefetchOutcome};
