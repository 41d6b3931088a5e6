//! Data models for poview.
//!
//! These are the values exchanged between the store, the cache and the
//! presentation layer.

mod entry;

pub use entry::*;
