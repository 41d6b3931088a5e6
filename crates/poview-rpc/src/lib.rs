//! Poview RPC - JSON-RPC 2.0 surface over [`poview_core::EntryViewer`].
//!
//! The binary in `main.rs` is a thin shell around [`server::start_server`];
//! the router itself is exposed so it can be driven in-process by tests.

pub mod handlers;
pub mod server;
mod wrapper;
