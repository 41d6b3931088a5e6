//! Centralized configuration for poview.
//!
//! [`CacheConfig`] is the flat key/value surface that bounds the two cache
//! tiers and the prefetch pool. It is validated eagerly: an
//! [`EntryCacheManager`](crate::cache::EntryCacheManager) refuses to start
//! with a config that fails [`CacheConfig::validate`].

use crate::error::{PoviewError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the entry cache and prefetch subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CacheConfig {
    /// Maximum number of records in the complete-entry cache.
    pub entry_cache_max_entries: usize,
    /// Estimated memory bound for the complete-entry cache, in bytes.
    pub entry_cache_max_bytes: usize,
    /// Maximum number of cached filter results.
    pub filter_cache_max_entries: usize,
    /// Estimated memory bound for the filter-result cache, in bytes.
    pub filter_cache_max_bytes: usize,
    /// Time-to-live for complete-entry slots in seconds (0 = no expiry).
    pub entry_ttl_secs: u64,
    /// Maximum number of keys fetched by one prefetch request.
    pub prefetch_batch_size: usize,
    /// Number of prefetch fetches allowed to run concurrently.
    pub prefetch_workers: usize,
    /// Whether prefetch requests are honoured at all.
    pub prefetch_enabled: bool,
    /// Whether caching is enabled.
    pub cache_enabled: bool,
}

impl CacheConfig {
    pub const DEFAULT_ENTRY_CACHE_MAX_ENTRIES: usize = 10_000;
    /// 64 MiB.
    pub const DEFAULT_ENTRY_CACHE_MAX_BYTES: usize = 64 * 1024 * 1024;
    pub const DEFAULT_FILTER_CACHE_MAX_ENTRIES: usize = 128;
    /// 16 MiB.
    pub const DEFAULT_FILTER_CACHE_MAX_BYTES: usize = 16 * 1024 * 1024;
    pub const DEFAULT_PREFETCH_BATCH_SIZE: usize = 100;
    pub const DEFAULT_PREFETCH_WORKERS: usize = 2;
    /// Longest accepted entry TTL: one year.
    pub const MAX_ENTRY_TTL_SECS: u64 = 365 * 24 * 60 * 60;

    /// Every key accepted by [`CacheConfig::from_pairs`].
    pub const KEYS: [&'static str; 9] = [
        "entry_cache_max_entries",
        "entry_cache_max_bytes",
        "filter_cache_max_entries",
        "filter_cache_max_bytes",
        "entry_ttl_secs",
        "prefetch_batch_size",
        "prefetch_workers",
        "prefetch_enabled",
        "cache_enabled",
    ];

    /// Build a config from flat `key = value` pairs on top of the defaults.
    ///
    /// Keys are matched case-insensitively and may use `-` in place of `_`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key.as_ref(), value.as_ref())?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Set a single field from its flat key and string value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let normalized = key.trim().to_ascii_lowercase().replace('-', "_");
        let value = value.trim();
        match normalized.as_str() {
            "entry_cache_max_entries" => self.entry_cache_max_entries = parse_num(key, value)?,
            "entry_cache_max_bytes" => self.entry_cache_max_bytes = parse_num(key, value)?,
            "filter_cache_max_entries" => self.filter_cache_max_entries = parse_num(key, value)?,
            "filter_cache_max_bytes" => self.filter_cache_max_bytes = parse_num(key, value)?,
            "entry_ttl_secs" => self.entry_ttl_secs = parse_num(key, value)?,
            "prefetch_batch_size" => self.prefetch_batch_size = parse_num(key, value)?,
            "prefetch_workers" => self.prefetch_workers = parse_num(key, value)?,
            "prefetch_enabled" => self.prefetch_enabled = parse_bool(key, value)?,
            "cache_enabled" => self.cache_enabled = parse_bool(key, value)?,
            _ => {
                return Err(PoviewError::config(format!(
                    "unknown cache setting '{}' (expected one of: {})",
                    key,
                    Self::KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }

    /// Reject bounds that would make a cache tier unusable.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("entry_cache_max_entries", self.entry_cache_max_entries),
            ("entry_cache_max_bytes", self.entry_cache_max_bytes),
            ("filter_cache_max_entries", self.filter_cache_max_entries),
            ("filter_cache_max_bytes", self.filter_cache_max_bytes),
            ("prefetch_batch_size", self.prefetch_batch_size),
            ("prefetch_workers", self.prefetch_workers),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(PoviewError::config(format!("{} must be greater than 0", name)));
            }
        }
        if self.entry_ttl_secs > Self::MAX_ENTRY_TTL_SECS {
            return Err(PoviewError::config(format!(
                "entry_ttl_secs must be at most {} (got {})",
                Self::MAX_ENTRY_TTL_SECS,
                self.entry_ttl_secs
            )));
        }
        Ok(())
    }

    /// TTL for complete-entry slots, `None` when expiry is disabled.
    pub fn entry_ttl(&self) -> Option<Duration> {
        (self.entry_ttl_secs > 0).then(|| Duration::from_secs(self.entry_ttl_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_cache_max_entries: Self::DEFAULT_ENTRY_CACHE_MAX_ENTRIES,
            entry_cache_max_bytes: Self::DEFAULT_ENTRY_CACHE_MAX_BYTES,
            filter_cache_max_entries: Self::DEFAULT_FILTER_CACHE_MAX_ENTRIES,
            filter_cache_max_bytes: Self::DEFAULT_FILTER_CACHE_MAX_BYTES,
            entry_ttl_secs: 0,
            prefetch_batch_size: Self::DEFAULT_PREFETCH_BATCH_SIZE,
            prefetch_workers: Self::DEFAULT_PREFETCH_WORKERS,
            prefetch_enabled: true,
            cache_enabled: true,
        }
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        PoviewError::config(format!(
            "invalid value '{}' for {}: expected a non-negative integer",
            value, key
        ))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PoviewError::config(format!(
            "invalid value '{}' for {}: expected a boolean",
            value, key
        ))),
    }
}

/// Store-level constants.
pub struct StoreConfig;

impl StoreConfig {
    /// Name of the FTS5 shadow table over entry text.
    pub const FTS_TABLE: &'static str = "entry_search";
    /// Shortest keyword (in characters) the trigram index can serve.
    pub const TRIGRAM_MIN_CHARS: usize = 3;
    /// Flag that marks an entry as needing review.
    pub const FUZZY_FLAG: &'static str = "fuzzy";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = CacheConfig::default();
        config.validate().unwrap();
        assert!(config.entry_ttl().is_none());
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_from_pairs_overrides_defaults() {
        let config = CacheConfig::from_pairs([
            ("entry_cache_max_entries", "50"),
            ("ENTRY-TTL-SECS", "30"),
            ("prefetch_enabled", "off"),
        ])
        .unwrap();

        assert_eq!(config.entry_cache_max_entries, 50);
        assert_eq!(config.entry_ttl(), Some(Duration::from_secs(30)));
        assert!(!config.prefetch_enabled);
        assert_eq!(
            config.filter_cache_max_entries,
            CacheConfig::DEFAULT_FILTER_CACHE_MAX_ENTRIES
        );
    }

    #[test]
    fn test_negative_size_is_rejected() {
        let err = CacheConfig::from_pairs([("entry_cache_max_bytes", "-1")]).unwrap_err();
        assert!(matches!(err, PoviewError::Config { .. }));
    }

    #[test]
    fn test_zero_bound_is_rejected() {
        let err = CacheConfig::from_pairs([("filter_cache_max_entries", "0")]).unwrap_err();
        assert!(err.to_string().contains("filter_cache_max_entries"));
    }

    #[test]
    fn test_oversized_ttl_is_rejected() {
        let err = CacheConfig::from_pairs([("entry_ttl_secs", u64::MAX.to_string())]).unwrap_err();
        assert!(err.to_string().contains("entry_ttl_secs"));

        let max = CacheConfig::MAX_ENTRY_TTL_SECS.to_string();
        let config = CacheConfig::from_pairs([("entry_ttl_secs", max.as_str())]).unwrap();
        assert!(config.entry_ttl().is_some());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = CacheConfig::from_pairs([("max_size", "10")]).unwrap_err();
        assert!(matches!(err, PoviewError::Config { .. }));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"entry_ttl_secs": 5, "cache_enabled": false}"#).unwrap();
        assert_eq!(config.entry_ttl_secs, 5);
        assert!(!config.cache_enabled);
        assert_eq!(config.prefetch_workers, CacheConfig::DEFAULT_PREFETCH_WORKERS);
    }
}
