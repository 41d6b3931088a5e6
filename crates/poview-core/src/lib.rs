//! Poview Core - Headless entry cache backend for translation catalog viewers.
//!
//! This crate holds a catalog's entries in an indexed in-memory store and
//! serves them to a presentation layer through a two-tier cache: complete
//! entries by key, and ordered key lists per filter. Store writes invalidate
//! the cache synchronously through an [`InvalidationBridge`]. It can be used
//! programmatically without any HTTP/RPC layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use poview_core::{CacheConfig, EntryRecord, EntryViewer, FilterCriteria};
//!
//! fn main() -> poview_core::Result<()> {
//!     let viewer = EntryViewer::new(CacheConfig::default())?;
//!     viewer.load_entries(&[
//!         EntryRecord::new(None, "cat", ""),
//!         EntryRecord::new(None, "dog", ""),
//!     ])?;
//!
//!     let cats = viewer.get_filtered(&FilterCriteria::keyword_only("cat"))?;
//!     println!("Found {} entries", cats.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod criteria;
pub mod error;
pub mod models;
pub mod store;
pub mod viewer;

// Re-export commonly used types
pub use cache::{
    CacheStats, EntryCacheManager, InvalidationBridge, PrefetchHandle, PrefetchOutcome, TierStats,
};
pub use config::{CacheConfig, StoreConfig};
pub use criteria::{
    CacheKey, FilterCriteria, FilterCriteriaBuilder, Page, SearchField, SortColumn, SortOrder,
    SortSpec, StatusFilter,
};
pub use error::{PoviewError, Result};
pub use models::{EntryRecord, EntryStatistics, EntryStatus, ReviewComment, ReviewData};
pub use store::{BulkOp, ChangeEvent, EntryStore, QueryEngine, TextIndex};
pub use viewer::EntryViewer;
