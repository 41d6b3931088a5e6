//! Change notifications emitted by the entry store.

use serde::Serialize;
use std::sync::Arc;

/// Kind of multi-row write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum BulkOp {
    /// Rows appended by `insert_bulk`.
    Inserted { count: usize },
    /// Every row replaced by `replace_all`.
    Replaced { count: usize },
    /// Existing rows rewritten by `update_bulk`.
    Updated { count: usize },
    /// Rows inserted or replaced by `upsert_bulk`.
    Imported { count: usize },
    /// Display positions rewritten by `reorder`.
    Reordered { count: usize },
    /// Every row removed by `clear`.
    Cleared,
    /// FTS index rebuilt.
    Reindexed,
}

/// A committed write to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEvent {
    Inserted(String),
    Updated(String),
    Deleted(String),
    Bulk(BulkOp),
}

impl ChangeEvent {
    /// Key of the single entry this event concerns, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            ChangeEvent::Inserted(key) | ChangeEvent::Updated(key) | ChangeEvent::Deleted(key) => {
                Some(key)
            }
            ChangeEvent::Bulk(_) => None,
        }
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, ChangeEvent::Bulk(_))
    }
}

/// Callback registered with [`EntryStore::on_change`](super::EntryStore::on_change).
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle returned by `on_change`, used to detach the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key() {
        assert_eq!(ChangeEvent::Updated("|a".into()).key(), Some("|a"));
        assert_eq!(ChangeEvent::Bulk(BulkOp::Cleared).key(), None);
        assert!(ChangeEvent::Bulk(BulkOp::Inserted { count: 2 }).is_bulk());
    }
}
