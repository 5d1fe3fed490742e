//! Request/response correlation keyed by `requestId`.
//!
//! A waiter is registered before the triggering message or event is sent and
//! is settled by the first of {response, timeout, disconnect}. Settlement
//! removes the entry under the map lock, so whichever path gets there
//! second finds nothing and does nothing.

use crate::{BridgeError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

struct PendingEntry<T> {
    settle: oneshot::Sender<T>,
    created_at: Instant,
}

/// Outstanding requests awaiting exactly one settlement each.
pub struct PendingMap<T> {
    entries: Mutex<HashMap<String, PendingEntry<T>>>,
}

impl<T> Default for PendingMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a waiter. Returns `None` if `request_id` is already pending.
    pub fn register(&self, request_id: &str) -> Option<oneshot::Receiver<T>> {
        let mut entries = self.entries();
        if entries.contains_key(request_id) {
            return None;
        }

        let (settle, receiver) = oneshot::channel();
        entries.insert(
            request_id.to_string(),
            PendingEntry {
                settle,
                created_at: Instant::now(),
            },
        );
        Some(receiver)
    }

    /// Settle `request_id` with `value`. Returns `false` when nothing was
    /// pending under that id (already settled, timed out or never sent).
    pub fn settle(&self, request_id: &str, value: T) -> bool {
        let Some(entry) = self.entries().remove(request_id) else {
            return false;
        };

        debug!(
            request_id,
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            "Settling pending request"
        );
        // The waiter may have stopped listening; the entry is gone either way.
        let _ = entry.settle.send(value);
        true
    }

    /// Remove a waiter without settling it.
    pub fn cancel(&self, request_id: &str) -> bool {
        self.entries().remove(request_id).is_some()
    }

    /// Settle every outstanding waiter with a value built by `make`.
    ///
    /// The map is taken as a whole before any waiter is notified.
    pub fn settle_all(&self, make: impl Fn() -> T) -> usize {
        let drained = std::mem::take(&mut *self.entries());
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.settle.send(make());
        }
        count
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.entries().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Wait for the waiter registered under `request_id`, removing it if
    /// `budget` elapses first.
    pub async fn wait(
        &self,
        request_id: &str,
        receiver: oneshot::Receiver<T>,
        budget: Duration,
    ) -> Result<T> {
        match tokio::time::timeout(budget, receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(BridgeError::Connection(
                "request was abandoned before completion".to_string(),
            )),
            Err(_) => {
                self.cancel(request_id);
                Err(BridgeError::Timeout(budget))
            }
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, PendingEntry<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
