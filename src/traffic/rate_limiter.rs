//! # Token Bucket Rate Limiter
//!
//! Bounds the request rate towards upstream. The bucket holds up to `capacity`
//! tokens and refills continuously at `refill_rate` tokens per second. Refill is
//! lazy: it is computed from the elapsed time whenever the bucket is touched.
//!
//! The limiter never queues callers. [`TokenBucket::try_consume`] answers
//! immediately, and [`TokenBucket::time_until_available`] tells the caller how
//! long a bounded wait would need to be.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum burst size
    pub capacity: f64,

    /// Sustained rate in tokens per second
    pub refill_rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 5.0,
            refill_rate: 0.5,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn projected(&self, now: Instant, config: &RateLimitConfig) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * config.refill_rate).min(config.capacity)
    }

    fn refill(&mut self, now: Instant, config: &RateLimitConfig) {
        self.tokens = self.projected(now, config);
        self.last_refill = now;
    }
}

/// Limiter statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterStats {
    pub tokens_available: f64,
    pub capacity: f64,
    pub refill_rate: f64,
    /// Seconds until one token is available
    pub wait_time_secs: f64,
    pub granted: u64,
    pub rejected: u64,
}

/// Thread-safe token bucket
#[derive(Debug)]
pub struct TokenBucket {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
    granted: AtomicU64,
    rejected: AtomicU64,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
            config,
            granted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Take `tokens` from the bucket if enough are available
    pub fn try_consume(&self, tokens: f64) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.refill(now, &self.config);

        if state.tokens >= tokens {
            state.tokens -= tokens;
            self.granted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            let remaining = state.tokens;
            drop(state);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("intel_rate_limit_rejections_total").increment(1);
            debug!(requested = tokens, available = remaining, "Rate limit token unavailable");
            false
        }
    }

    /// Take a single token
    pub fn try_acquire(&self) -> bool {
        self.try_consume(1.0)
    }

    /// How long until `tokens` could be consumed, without changing the bucket
    ///
    /// Returns `Duration::MAX` when the request can never be satisfied because
    /// it exceeds the capacity or the bucket does not refill.
    pub fn time_until_available(&self, tokens: f64) -> Duration {
        if tokens > self.config.capacity || self.config.refill_rate <= 0.0 {
            return Duration::MAX;
        }

        let available = self.state.lock().projected(Instant::now(), &self.config);
        if available >= tokens {
            return Duration::ZERO;
        }

        let secs = (tokens - available) / self.config.refill_rate;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Tokens available right now, without changing the bucket
    pub fn tokens_available(&self) -> f64 {
        self.state.lock().projected(Instant::now(), &self.config)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Get a statistics snapshot
    pub fn stats(&self) -> RateLimiterStats {
        let wait = self.time_until_available(1.0);
        RateLimiterStats {
            tokens_available: (self.tokens_available() * 100.0).round() / 100.0,
            capacity: self.config.capacity,
            refill_rate: self.config.refill_rate,
            wait_time_secs: if wait == Duration::MAX {
                f64::INFINITY
            } else {
                (wait.as_secs_f64() * 100.0).round() / 100.0
            },
            granted: self.granted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
