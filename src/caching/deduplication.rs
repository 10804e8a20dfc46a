//! # In-Flight Request Deduplication
//!
//! Concurrent fetches of the same cache key share one upstream call. The first
//! caller becomes the leader and holds a [`FlightGuard`]; later callers wait on
//! the leader's `Notify` and then re-read the cache. Dropping the guard (on
//! success, failure or cancellation) always wakes the waiters.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Tracks keys with a leader call in progress
#[derive(Debug, Default)]
pub struct InFlightRequests {
    waiters: DashMap<String, Arc<Notify>>,
}

/// Held by the leader of an in-flight key
#[derive(Debug)]
pub struct FlightGuard<'a> {
    owner: &'a InFlightRequests,
    key: String,
    notify: Arc<Notify>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // Remove before notifying so late arrivals become the next leader
        self.owner
            .waiters
            .remove_if(&self.key, |_, current| Arc::ptr_eq(current, &self.notify));
        self.notify.notify_waiters();
    }
}

impl InFlightRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the leader for `key`, or wait for the current leader to finish
    ///
    /// Returns `Some(guard)` for the leader. Returns `None` once an earlier
    /// leader has finished; the caller should consult the cache again.
    pub async fn acquire(&self, key: &str) -> Option<FlightGuard<'_>> {
        let notify = match self.waiters.entry(key.to_string()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let notify = Arc::new(Notify::new());
                entry.insert(Arc::clone(&notify));
                return Some(FlightGuard {
                    owner: self,
                    key: key.to_string(),
                    notify,
                });
            }
        };

        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        // The leader may have finished between the lookup and `enable`
        let still_running = self
            .waiters
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current.value(), &notify));
        if still_running {
            debug!(key = %key, "Waiting for in-flight request");
            notified.await;
        }
        None
    }

    /// Number of keys with a leader in progress
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
