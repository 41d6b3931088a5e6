//! Background population of the complete-entry cache.

use super::manager::EntryCacheManager;
use crate::error::Result;
use crate::models::EntryRecord;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What a finished prefetch task did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchOutcome {
    /// Keys handed to the fetch function.
    pub requested: usize,
    /// Records inserted into the cache.
    pub inserted: usize,
    /// Records dropped because their key was invalidated while in flight.
    pub discarded: usize,
    /// Whether the fetch function failed or panicked.
    pub failed: bool,
}

/// Handle to a submitted prefetch task.
#[derive(Debug)]
pub struct PrefetchHandle {
    keys: Vec<String>,
    handle: JoinHandle<PrefetchOutcome>,
}

impl PrefetchHandle {
    /// Keys this task is fetching, after deduplication and truncation.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to finish.
    pub async fn join(self) -> PrefetchOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Prefetch task ended abnormally: {}", e);
                PrefetchOutcome {
                    requested: self.keys.len(),
                    failed: true,
                    ..Default::default()
                }
            }
        }
    }
}

impl EntryCacheManager {
    /// Fetch `keys` in the background and cache the results.
    ///
    /// Keys that are duplicated, already cached or already in flight are
    /// skipped, and at most `prefetch_batch_size` remain. `fetch` runs on
    /// tokio's blocking pool, at most `prefetch_workers` at a time. Returns
    /// `None` when nothing needs fetching, prefetch is disabled, or no
    /// tokio runtime is available.
    pub fn prefetch<I, F>(self: &Arc<Self>, keys: I, fetch: F) -> Option<PrefetchHandle>
    where
        I: IntoIterator<Item = String>,
        F: FnOnce(&[String]) -> Result<Vec<EntryRecord>> + Send + 'static,
    {
        if !self.config.prefetch_enabled || !self.is_enabled() {
            return None;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("Prefetch skipped: no tokio runtime");
                return None;
            }
        };

        let (batch, ticket) = {
            let mut state = match self.lock() {
                Ok(state) => state,
                Err(e) => {
                    warn!("Prefetch skipped: {}", e);
                    return None;
                }
            };

            let mut seen = HashSet::new();
            let batch: Vec<String> = keys
                .into_iter()
                .filter(|key| {
                    seen.insert(key.clone())
                        && !state.entries.contains(key.as_str())
                        && !state.in_flight.contains_key(key)
                })
                .take(self.config.prefetch_batch_size)
                .collect();
            if batch.is_empty() {
                return None;
            }

            let ticket = state.next_ticket;
            state.next_ticket += 1;
            for key in &batch {
                state.in_flight.insert(key.clone(), ticket);
            }
            (batch, ticket)
        };

        debug!("Prefetching {} entries (ticket {})", batch.len(), ticket);

        let tickets = TicketGuard {
            manager: Arc::downgrade(self),
            ticket,
            keys: batch.clone(),
        };
        let permits = Arc::clone(&self.prefetch_permits);
        let handle = runtime.spawn(async move {
            let keys = &tickets.keys;
            let requested = keys.len();
            // The semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            let fetch_keys = keys.clone();
            let fetched = tokio::task::spawn_blocking(move || fetch(&fetch_keys)).await;

            let records = match fetched {
                Ok(Ok(records)) => Some(records),
                Ok(Err(e)) => {
                    warn!("Prefetch fetch failed: {}", e);
                    None
                }
                Err(e) => {
                    warn!("Prefetch fetch panicked: {}", e);
                    None
                }
            };
            complete(&tickets, requested, records)
        });

        Some(PrefetchHandle {
            keys: batch,
            handle,
        })
    }
}

/// In-flight tickets of one prefetch task.
///
/// Owned by the task, so the tickets are released however the task ends,
/// including when the runtime drops it before it completes.
struct TicketGuard {
    manager: Weak<EntryCacheManager>,
    ticket: u64,
    keys: Vec<String>,
}

impl Drop for TicketGuard {
    fn drop(&mut self) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let mut state = manager.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut released = 0;
        for key in &self.keys {
            if state.in_flight.get(key) == Some(&self.ticket) {
                state.in_flight.remove(key);
                released += 1;
            }
        }
        if released > 0 {
            debug!("Released {} prefetch tickets ({})", released, self.ticket);
        }
    }
}

/// Insert fetched records whose ticket is still current. The tickets
/// themselves are released when `tickets` drops.
fn complete(
    tickets: &TicketGuard,
    requested: usize,
    records: Option<Vec<EntryRecord>>,
) -> PrefetchOutcome {
    let ticket = tickets.ticket;
    let mut outcome = PrefetchOutcome {
        requested,
        failed: records.is_none(),
        ..Default::default()
    };
    let Some(manager) = tickets.manager.upgrade() else {
        return outcome;
    };
    let Ok(mut state) = manager.lock() else {
        warn!("Prefetch results dropped: cache lock poisoned");
        return outcome;
    };

    let enabled = manager.is_enabled();
    for record in records.unwrap_or_default() {
        let current = state.in_flight.get(&record.key) == Some(&ticket);
        if !current || !enabled {
            outcome.discarded += 1;
            continue;
        }
        let size = record.estimated_size();
        let key = record.key.clone();
        if state.entries.put(key, Arc::new(record), size) {
            outcome.inserted += 1;
        }
    }

    debug!(
        "Prefetch ticket {} done: {} inserted, {} discarded",
        ticket, outcome.inserted, outcome.discarded
    );
    outcome
}
