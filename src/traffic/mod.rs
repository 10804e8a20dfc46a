//! # Traffic Management Module
//!
//! Protects the upstream from overload and the caller from a failing upstream.
//!
//! ## Key Components
//!
//! - [`TokenBucket`]: bounds the sustained request rate, allows short bursts
//! - [`CircuitBreaker`]: fails fast while upstream is unhealthy
//! - [`RetryPolicy`]: exponential backoff with jitter for transient errors

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerState,
    CircuitBreakerStats,
};
pub use rate_limiter::{RateLimitConfig, RateLimiterStats, TokenBucket};
pub use retry::{with_retry, RetryConfig, RetryPolicy};
