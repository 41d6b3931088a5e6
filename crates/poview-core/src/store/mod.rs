//! In-memory entry store with FTS5 full-text search.
//!
//! This module provides:
//! - Entry storage in SQLite (`:memory:`)
//! - FTS5 trigram search over entry text
//! - Criteria-to-SQL query planning
//! - Change notifications for committed writes

mod entry_store;
mod events;
mod fts5;
pub mod query;

pub use entry_store::EntryStore;
pub use events::{BulkOp, ChangeEvent, ChangeListener, ListenerId};
pub use fts5::{FTS5Config, FTS5Manager, FTS5Stats};
pub use query::{Fts5TrigramIndex, QueryEngine, QueryPlan, SubstringScan, TextIndex};
