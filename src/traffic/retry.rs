//! # Retry with Exponential Backoff
//!
//! Attempt `n` (zero based) that fails with a retryable error is followed by a
//! wait of `base_delay * 2^n`, plus a uniform jitter of up to `jitter_ratio` of
//! that delay, capped at `max_delay`. After `max_retries` extra attempts the
//! last error is returned unchanged.
//!
//! The circuit breaker wraps a whole retry sequence, so one logical call is one
//! breaker outcome no matter how many attempts it took.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound of the random extra delay, as a fraction of the delay
    pub jitter_ratio: f64,

    /// Cap applied to the exponential delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            jitter_ratio: 0.25,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff policy
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    /// Backoff before retrying after failed attempt `attempt`, without jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }

    /// Backoff with random jitter added
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let ratio = self.config.jitter_ratio.clamp(0.0, 1.0);
        if ratio == 0.0 || delay.is_zero() {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=ratio);
        delay + delay.mul_f64(jitter)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent
    ///
    /// `op` receives the zero-based attempt number. Errors rejected by
    /// `is_retryable` are returned immediately.
    pub async fn execute<F, Fut, T, E, R>(&self, is_retryable: R, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.config.max_retries && is_retryable(&err) => {
                    let delay = self.jittered_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Retry every error of `op` with the default jitter
pub async fn with_retry<F, Fut, T, E>(op: F, max_retries: u32, base_delay: Duration) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let policy = RetryPolicy::new(RetryConfig {
        max_retries,
        base_delay,
        ..RetryConfig::default()
    });
    policy.execute(|_| true, op).await
}
