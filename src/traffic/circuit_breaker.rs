//! Circuit Breaker Implementation
//!
//! Stops calling an upstream that keeps failing. The breaker is a state machine
//! with three states:
//!
//! - **Closed**: calls pass through; consecutive failures are counted and a
//!   success resets the count. Reaching `failure_threshold` opens the circuit.
//! - **Open**: calls are rejected without running the operation until
//!   `timeout` has elapsed since the circuit opened.
//! - **HalfOpen**: the first call after the timeout is the single trial. Its
//!   outcome closes or re-opens the circuit. Callers arriving while the trial
//!   is running are rejected as if the circuit were open.
//!
//! Every decision is taken under one `parking_lot::Mutex`; the operation itself
//! runs with the lock released.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

/// Outcome of a call made through the breaker
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CircuitBreakerError<E> {
    /// Rejected without running the operation
    #[error("Circuit breaker '{name}' is open, retry in {retry_in:?}")]
    Open { name: String, retry_in: Duration },

    /// The operation ran and failed with its own error
    #[error("{0}")]
    Inner(E),
}

/// Circuit breaker state machine
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerState {
    /// Normal operation, tracks consecutive failures
    Closed { failure_count: u32 },

    /// Failing fast since `opened_at`
    Open { opened_at: Instant },

    /// Recovery probe; at most one trial call at a time
    HalfOpen { trial_in_flight: bool },
}

impl CircuitBreakerState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed { .. } => "closed",
            Self::Open { .. } => "open",
            Self::HalfOpen { .. } => "half_open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            Self::Closed { .. } => 0.0,
            Self::HalfOpen { .. } => 1.0,
            Self::Open { .. } => 2.0,
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// How long to stay open before allowing a trial call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Metrics collected by the circuit breaker
#[derive(Debug, Default)]
pub struct CircuitBreakerMetrics {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub circuit_opened_count: AtomicU64,
    pub circuit_closed_count: AtomicU64,
}

impl CircuitBreakerMetrics {
    pub fn snapshot(&self) -> CircuitBreakerMetricsSnapshot {
        CircuitBreakerMetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            circuit_opened_count: self.circuit_opened_count.load(Ordering::Relaxed),
            circuit_closed_count: self.circuit_closed_count.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of circuit breaker metrics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerMetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub circuit_opened_count: u64,
    pub circuit_closed_count: u64,
}

/// Breaker status for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: String,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub timeout_secs: u64,
    /// Seconds until an open circuit admits its trial call
    pub retry_in_secs: Option<f64>,
    /// Seconds since the most recent recorded failure
    pub last_failure_secs_ago: Option<f64>,
    pub metrics: CircuitBreakerMetricsSnapshot,
}

/// How a call was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    last_failure: Option<Instant>,
}

/// Main circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    metrics: Arc<CircuitBreakerMetrics>,
}

/// Settles a trial as a failure if the call is dropped before it completes
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl TrialGuard<'_> {
    fn settle(mut self, failed: bool) {
        self.settled = true;
        if failed {
            self.breaker.record_failure(self.admission);
        } else {
            self.breaker.record_success(self.admission);
        }
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            warn!(breaker = %self.breaker.name, "Trial call cancelled, re-opening circuit");
            self.breaker.record_failure(Admission::Trial);
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the Closed state
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitBreakerState::Closed { failure_count: 0 },
                last_failure: None,
            }),
            metrics: Arc::new(CircuitBreakerMetrics::default()),
        }
    }

    /// Create a circuit breaker with default configuration
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Run `op` through the breaker; every error counts as a failure
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_with(op, |_| true).await
    }

    /// Run `op` through the breaker, counting only errors accepted by `counts_as_failure`
    ///
    /// Errors that do not count are returned unchanged and treated like a
    /// success for the state machine: upstream answered, it is not down.
    pub async fn call_with<F, Fut, T, E, P>(
        &self,
        op: F,
        counts_as_failure: P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let admission = self.admit().map_err(|retry_in| CircuitBreakerError::Open {
            name: self.name.clone(),
            retry_in,
        })?;

        let guard = TrialGuard {
            breaker: self,
            admission,
            settled: false,
        };

        match op().await {
            Ok(value) => {
                guard.settle(false);
                Ok(value)
            }
            Err(err) => {
                guard.settle(counts_as_failure(&err));
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Decide whether a call may proceed, moving Open to HalfOpen when due
    fn admit(&self) -> Result<Admission, Duration> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let decision = match inner.state.clone() {
            CircuitBreakerState::Closed { .. } => Ok(Admission::Normal),
            CircuitBreakerState::Open { opened_at } => {
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= self.config.timeout {
                    self.transition(&mut inner, CircuitBreakerState::HalfOpen {
                        trial_in_flight: true,
                    });
                    info!(breaker = %self.name, "Circuit half-open, admitting trial call");
                    Ok(Admission::Trial)
                } else {
                    Err(self.config.timeout - elapsed)
                }
            }
            CircuitBreakerState::HalfOpen { trial_in_flight } => {
                if trial_in_flight {
                    Err(Duration::ZERO)
                } else {
                    inner.state = CircuitBreakerState::HalfOpen {
                        trial_in_flight: true,
                    };
                    Ok(Admission::Trial)
                }
            }
        };
        drop(inner);

        match decision {
            Ok(_) => {
                self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.rejected_requests.fetch_add(1, Ordering::Relaxed);
            }
        }
        decision
    }

    fn record_success(&self, admission: Admission) {
        self.metrics.successful_requests.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();

        match (inner.state.clone(), admission) {
            (CircuitBreakerState::Closed { .. }, Admission::Normal) => {
                inner.state = CircuitBreakerState::Closed { failure_count: 0 };
            }
            (CircuitBreakerState::HalfOpen { .. }, Admission::Trial) => {
                self.transition(&mut inner, CircuitBreakerState::Closed { failure_count: 0 });
                self.metrics.circuit_closed_count.fetch_add(1, Ordering::Relaxed);
                info!(breaker = %self.name, "Trial call succeeded, circuit closed");
            }
            // Stale outcome of a call admitted before the last transition
            _ => {}
        }
    }

    fn record_failure(&self, admission: Admission) {
        self.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.last_failure = Some(now);

        match (inner.state.clone(), admission) {
            (CircuitBreakerState::Closed { failure_count }, Admission::Normal) => {
                let failure_count = failure_count + 1;
                if failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitBreakerState::Open { opened_at: now });
                    self.metrics.circuit_opened_count.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        breaker = %self.name,
                        failures = failure_count,
                        "Failure threshold reached, circuit opened"
                    );
                } else {
                    inner.state = CircuitBreakerState::Closed { failure_count };
                }
            }
            (CircuitBreakerState::HalfOpen { .. }, Admission::Trial) => {
                self.transition(&mut inner, CircuitBreakerState::Open { opened_at: now });
                self.metrics.circuit_opened_count.fetch_add(1, Ordering::Relaxed);
                warn!(breaker = %self.name, "Trial call failed, circuit re-opened");
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, next: CircuitBreakerState) {
        let from = inner.state.name();
        let to = next.name();
        metrics::counter!(
            "intel_circuit_breaker_transitions_total",
            "breaker" => self.name.clone(),
            "from" => from,
            "to" => to
        )
        .increment(1);
        metrics::gauge!("intel_circuit_breaker_state", "breaker" => self.name.clone())
            .set(next.gauge_value());
        inner.state = next;
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().state.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<CircuitBreakerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Force the breaker back to Closed
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitBreakerState::Closed { failure_count: 0 });
        inner.last_failure = None;
    }

    /// Get a reporting snapshot
    pub fn stats(&self) -> CircuitBreakerStats {
        let now = Instant::now();
        let inner = self.inner.lock();

        let (failure_count, retry_in_secs) = match inner.state.clone() {
            CircuitBreakerState::Closed { failure_count } => (failure_count, None),
            CircuitBreakerState::Open { opened_at } => {
                let remaining = self
                    .config
                    .timeout
                    .saturating_sub(now.saturating_duration_since(opened_at));
                (self.config.failure_threshold, Some(remaining.as_secs_f64()))
            }
            CircuitBreakerState::HalfOpen { .. } => (self.config.failure_threshold, Some(0.0)),
        };

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state.name().to_string(),
            failure_count,
            failure_threshold: self.config.failure_threshold,
            timeout_secs: self.config.timeout.as_secs(),
            retry_in_secs,
            last_failure_secs_ago: inner
                .last_failure
                .map(|at| now.saturating_duration_since(at).as_secs_f64()),
            metrics: self.metrics.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn breaker(threshold: u32, timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                timeout: Duration::from_secs(timeout_secs),
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        cb.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, CircuitBreakerError<&'static str>> {
        cb.call(|| async { Ok::<_, &'static str>(7) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_initial_state() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state(), CircuitBreakerState::Closed { failure_count: 0 });
        assert_eq!(succeed(&cb).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_rejects_without_running() {
        let cb = breaker(3, 60);

        for i in 0..3 {
            assert_eq!(fail(&cb).await, Err(CircuitBreakerError::Inner("boom")));
            if i < 2 {
                assert_eq!(cb.state(), CircuitBreakerState::Closed { failure_count: i + 1 });
            }
        }
        assert!(matches!(cb.state(), CircuitBreakerState::Open { .. }));

        let invoked = AtomicU32::new(0);
        let result = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;

        assert!(matches!(
            result,
            Err(CircuitBreakerError::Open { retry_in, .. }) if retry_in == Duration::from_secs(60)
        ));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(cb.metrics().snapshot().rejected_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, 60);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), CircuitBreakerState::Closed { failure_count: 0 });

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert!(matches!(cb.state(), CircuitBreakerState::Closed { failure_count: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_success_closes() {
        let cb = breaker(2, 30);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(matches!(succeed(&cb).await, Err(CircuitBreakerError::Open { .. })));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(succeed(&cb).await, Ok(7));
        assert_eq!(cb.state(), CircuitBreakerState::Closed { failure_count: 0 });
        assert_eq!(cb.metrics().snapshot().circuit_closed_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_failure_reopens_with_fresh_timer() {
        let cb = breaker(1, 10);
        let _ = fail(&cb).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(fail(&cb).await, Err(CircuitBreakerError::Inner("boom")));
        assert!(matches!(cb.state(), CircuitBreakerState::Open { .. }));

        tokio::time::advance(Duration::from_secs(5)).await;
        match succeed(&cb).await {
            Err(CircuitBreakerError::Open { retry_in, .. }) => {
                assert_eq!(retry_in, Duration::from_secs(5))
            }
            other => panic!("Expected open circuit, got {:?}", other),
        }
        assert_eq!(cb.metrics().snapshot().circuit_opened_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_in_half_open() {
        let cb = Arc::new(breaker(1, 10));
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let cb = Arc::clone(&cb);
            tokio::spawn(async move {
                cb.call(|| async move {
                    let _ = release_rx.await;
                    Ok::<_, &'static str>("trial")
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(cb.state(), CircuitBreakerState::HalfOpen { trial_in_flight: true });

        // Concurrent callers are rejected while the trial runs
        assert!(matches!(succeed(&cb).await, Err(CircuitBreakerError::Open { .. })));

        release_tx.send(()).unwrap();
        assert_eq!(trial.await.unwrap(), Ok("trial"));
        assert_eq!(cb.state(), CircuitBreakerState::Closed { failure_count: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_reopens() {
        let cb = breaker(1, 10);
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let pending = cb.call(|| std::future::pending::<Result<(), &'static str>>());
        let timed_out = tokio::time::timeout(Duration::from_secs(1), pending).await;
        assert!(timed_out.is_err());
        assert!(matches!(cb.state(), CircuitBreakerState::Open { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_counting_errors_do_not_open() {
        let cb = breaker(1, 10);
        let result = cb
            .call_with(|| async { Err::<(), _>(404u16) }, |status| *status >= 500)
            .await;
        assert_eq!(result, Err(CircuitBreakerError::Inner(404)));
        assert_eq!(cb.state(), CircuitBreakerState::Closed { failure_count: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_reset() {
        let cb = breaker(1, 60);
        let _ = fail(&cb).await;

        let stats = cb.stats();
        assert_eq!(stats.state, "open");
        assert_eq!(stats.retry_in_secs, Some(60.0));
        assert_eq!(stats.metrics.failed_requests, 1);

        cb.reset();
        assert_eq!(cb.stats().state, "closed");
        assert!(succeed(&cb).await.is_ok());
    }
}
