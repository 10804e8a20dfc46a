//! # Expiring FIFO Cache
//!
//! A bounded in-memory cache whose entries expire a fixed time after they were
//! written. When a tier is full, inserting a new key evicts the entry that was
//! inserted first; reads never change the eviction order.
//!
//! All bookkeeping (entries, hit/miss counters) lives behind one
//! `parking_lot::Mutex` that is held for exactly one `get` or `set`.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Capacity and lifetime of one cache tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTierConfig {
    /// Maximum number of live entries
    pub capacity: usize,

    /// Time an entry stays visible after it was written
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl CacheTierConfig {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl }
    }
}

/// A cached value with its expiration deadline
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct CacheState<V> {
    /// Insertion-ordered entries; index 0 is the oldest insertion
    entries: IndexMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub name: String,
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit rate in percent, rounded to one decimal
    pub hit_rate: f64,
    pub ttl_seconds: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Bounded, insertion-ordered cache with a fixed time-to-live
#[derive(Debug)]
pub struct ExpiringCache<V> {
    name: String,
    config: CacheTierConfig,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> ExpiringCache<V> {
    /// Create an empty cache tier
    pub fn new(name: impl Into<String>, config: CacheTierConfig) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(CacheState {
                entries: IndexMap::with_capacity(config.capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            config,
        }
    }

    /// Look up a live entry
    ///
    /// Expired entries are removed on the spot and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let lookup = state
            .entries
            .get(key)
            .map(|entry| (entry.is_expired(now), entry.value.clone()));

        match lookup {
            Some((false, value)) => {
                state.hits += 1;
                drop(state);
                metrics::counter!("intel_cache_hits_total", "tier" => self.name.clone()).increment(1);
                Some(value)
            }
            Some((true, _)) => {
                state.entries.shift_remove(key);
                state.expirations += 1;
                state.misses += 1;
                drop(state);
                debug!(tier = %self.name, key = %key, "Cache entry expired");
                metrics::counter!("intel_cache_misses_total", "tier" => self.name.clone()).increment(1);
                None
            }
            None => {
                state.misses += 1;
                drop(state);
                metrics::counter!("intel_cache_misses_total", "tier" => self.name.clone()).increment(1);
                None
            }
        }
    }

    /// Read a live entry without touching the hit/miss counters
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert or overwrite an entry
    ///
    /// A new key evicts the oldest insertion when the tier is full. Overwriting
    /// keeps the key's original position and refreshes its expiry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        if self.config.capacity == 0 {
            return;
        }

        let key = key.into();
        let expires_at = Instant::now() + self.config.ttl;
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }

        while state.entries.len() >= self.config.capacity {
            if let Some((evicted, _)) = state.entries.shift_remove_index(0) {
                state.evictions += 1;
                debug!(tier = %self.name, key = %evicted, "Evicted oldest cache entry");
            } else {
                break;
            }
        }

        state.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Remove one entry, returning its value if it was still live
    pub fn remove(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state
            .entries
            .shift_remove(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
    }

    /// Drop every entry whose deadline has passed, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - state.entries.len();
        state.expirations += purged as u64;
        purged
    }

    /// Remove all entries; counters are kept
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Number of physically stored entries, including not-yet-swept expired ones
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheTierConfig {
        &self.config
    }

    /// Get a statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let total = state.hits + state.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            (state.hits as f64 / total as f64 * 1000.0).round() / 10.0
        };

        CacheStats {
            name: self.name.clone(),
            size: state.entries.len(),
            capacity: self.config.capacity,
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            ttl_seconds: self.config.ttl.as_secs(),
            evictions: state.evictions,
            expirations: state.expirations,
        }
    }
}
