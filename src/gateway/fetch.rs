//! # Resilient Fetch Gateway
//!
//! The single entry point for upstream reads. Each [`FetchRequest`] goes
//! through the same pipeline:
//!
//! 1. Look up the request's cache tier; a live entry is returned directly.
//! 2. On a miss, join an identical in-flight request if there is one.
//! 3. Take a rate limit token, waiting a bounded number of times.
//! 4. Call upstream through `breaker(retry(remote))`.
//! 5. Store successful payloads in the tier.
//!
//! Status mapping: 2xx is success; 429 and 5xx are retryable; any other status
//! is a definitive [`IntelError::UpstreamError`] that is neither retried nor
//! counted against the breaker. Retryable failures that outlive the retry
//! budget surface as [`IntelError::TransientFailure`].
//!
//! No lock is held while the remote call is in progress.

use crate::caching::{CacheTier, CacheTiers, InFlightRequests, KeyGenerator};
use crate::core::error::{IntelError, IntelResult};
use crate::gateway::remote::RemoteSource;
use crate::traffic::{CircuitBreaker, CircuitBreakerError, RetryPolicy, TokenBucket};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded waiting for rate limit tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Token attempts before giving up with `RateLimitExceeded`
    pub max_wait_attempts: u32,

    /// Longest single wait between token attempts
    #[serde(with = "humantime_serde")]
    pub max_wait_interval: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_wait_attempts: 3,
            max_wait_interval: Duration::from_secs(2),
        }
    }
}

/// An idempotent upstream read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    pub tier: CacheTier,
}

impl FetchRequest {
    pub fn new(endpoint: impl Into<String>, tier: CacheTier) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            tier,
        }
    }

    /// Add a query parameter
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Deterministic cache key for this request
    pub fn cache_key(&self) -> String {
        KeyGenerator::new(self.tier.as_str()).generate(&self.endpoint, &self.params)
    }
}

#[derive(Debug, Default)]
struct GatewayMetrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
    remote_calls: AtomicU64,
    failures: AtomicU64,
}

/// Gateway counters snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayStats {
    pub requests: u64,
    pub cache_hits: u64,
    /// Requests that waited for an identical in-flight request
    pub coalesced: u64,
    /// Individual remote attempts, retries included
    pub remote_calls: u64,
    pub failures: u64,
    pub in_flight: usize,
}

/// Cache → rate limiter → breaker(retry(remote)) pipeline
pub struct ResilientGateway {
    remote: Arc<dyn RemoteSource>,
    cache: Arc<CacheTiers>,
    limiter: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    config: FetchConfig,
    in_flight: InFlightRequests,
    metrics: GatewayMetrics,
}

impl ResilientGateway {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        cache: Arc<CacheTiers>,
        limiter: Arc<TokenBucket>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        config: FetchConfig,
    ) -> Self {
        Self {
            remote,
            cache,
            limiter,
            breaker,
            retry,
            config,
            in_flight: InFlightRequests::new(),
            metrics: GatewayMetrics::default(),
        }
    }

    /// Fetch a payload, from cache when possible
    pub async fn fetch(&self, request: &FetchRequest) -> IntelResult<Value> {
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);
        let key = request.cache_key();
        let tier = self.cache.tier(request.tier);

        loop {
            if let Some(value) = tier.get(&key) {
                debug!(endpoint = %request.endpoint, tier = %request.tier, "Cache hit");
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }

            let Some(_flight) = self.in_flight.acquire(&key).await else {
                self.metrics.coalesced.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            // A previous leader may have stored the value after our lookup
            if let Some(value) = tier.peek(&key) {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }

            let result = self.fetch_remote(request).await;
            match &result {
                Ok(value) => tier.set(key.clone(), value.clone()),
                Err(err) => {
                    self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("intel_upstream_failures_total", "kind" => err.error_type())
                        .increment(1);
                    warn!(
                        endpoint = %request.endpoint,
                        error = %err,
                        kind = err.error_type(),
                        "Upstream fetch failed"
                    );
                }
            }
            return result;
        }
    }

    async fn fetch_remote(&self, request: &FetchRequest) -> IntelResult<Value> {
        self.acquire_token().await?;

        let attempts = AtomicU32::new(0);
        let outcome = self
            .breaker
            .call_with(
                || {
                    self.retry.execute(IntelError::is_retryable, |attempt| {
                        attempts.store(attempt + 1, Ordering::Relaxed);
                        self.call_once(request)
                    })
                },
                IntelError::should_trip_breaker,
            )
            .await;

        match outcome {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::Open { name, retry_in }) => Err(IntelError::CircuitOpen {
                breaker: name,
                retry_in,
            }),
            Err(CircuitBreakerError::Inner(err)) if err.is_retryable() => {
                Err(IntelError::TransientFailure {
                    attempts: attempts.load(Ordering::Relaxed),
                    last_error: err.to_string(),
                })
            }
            Err(CircuitBreakerError::Inner(err)) => Err(err),
        }
    }

    /// One remote attempt with status classification
    async fn call_once(&self, request: &FetchRequest) -> IntelResult<Value> {
        self.metrics.remote_calls.fetch_add(1, Ordering::Relaxed);
        let response = self
            .remote
            .call(&request.endpoint, &request.params)
            .await
            .map_err(IntelError::from)?;

        metrics::counter!(
            "intel_upstream_requests_total",
            "status" => response.status.to_string()
        )
        .increment(1);

        match response.status {
            200..=299 => Ok(response.body),
            status => Err(IntelError::UpstreamError { status }),
        }
    }

    /// Take a token, sleeping between attempts for at most `max_wait_interval`
    async fn acquire_token(&self) -> IntelResult<()> {
        let attempts = self.config.max_wait_attempts.max(1);

        for attempt in 1..=attempts {
            if self.limiter.try_acquire() {
                return Ok(());
            }

            let wait = self.limiter.time_until_available(1.0);
            if attempt == attempts || wait == Duration::MAX {
                return Err(IntelError::RateLimitExceeded { retry_after: wait });
            }

            let sleep_for = wait.min(self.config.max_wait_interval);
            debug!(attempt, wait_ms = sleep_for.as_millis() as u64, "Waiting for rate limit token");
            tokio::time::sleep(sleep_for).await;
        }

        Err(IntelError::RateLimitExceeded {
            retry_after: self.limiter.time_until_available(1.0),
        })
    }

    pub fn cache(&self) -> &Arc<CacheTiers> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<TokenBucket> {
        &self.limiter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            requests: self.metrics.requests.load(Ordering::Relaxed),
            cache_hits: self.metrics.cache_hits.load(Ordering::Relaxed),
            coalesced: self.metrics.coalesced.load(Ordering::Relaxed),
            remote_calls: self.metrics.remote_calls.load(Ordering::Relaxed),
            failures: self.metrics.failures.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::CacheConfigs;
    use crate::gateway::remote::{RemoteError, RemoteResponse};
    use crate::traffic::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replays scripted responses, then repeats the fallback
    struct ScriptedRemote {
        script: Mutex<VecDeque<Result<RemoteResponse, RemoteError>>>,
        fallback: Result<RemoteResponse, RemoteError>,
        latency: Duration,
        calls: AtomicU32,
    }

    impl ScriptedRemote {
        fn always(response: Result<RemoteResponse, RemoteError>) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: response,
                latency: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }

        fn then(self, response: Result<RemoteResponse, RemoteError>) -> Self {
            self.script.lock().push_back(response);
            self
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteSource for ScriptedRemote {
        async fn call(
            &self,
            _endpoint: &str,
            _params: &BTreeMap<String, String>,
        ) -> Result<RemoteResponse, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn gateway_with(
        remote: Arc<ScriptedRemote>,
        limit: RateLimitConfig,
        breaker: CircuitBreakerConfig,
    ) -> ResilientGateway {
        ResilientGateway::new(
            remote,
            Arc::new(CacheTiers::new(&CacheConfigs::default())),
            Arc::new(TokenBucket::new(limit)),
            Arc::new(CircuitBreaker::new("steam", breaker)),
            RetryPolicy::new(RetryConfig::default()),
            FetchConfig::default(),
        )
    }

    fn gateway(remote: Arc<ScriptedRemote>) -> ResilientGateway {
        gateway_with(
            remote,
            RateLimitConfig {
                capacity: 100.0,
                refill_rate: 100.0,
            },
            CircuitBreakerConfig::default(),
        )
    }

    fn schema_request() -> FetchRequest {
        FetchRequest::new("ISteamUserStats/GetSchemaForGame/v2/", CacheTier::Api).param("appid", 10)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_cached() {
        let remote = Arc::new(ScriptedRemote::always(Ok(RemoteResponse::ok(json!({"game": 1})))));
        let gateway = gateway(remote.clone());

        assert_eq!(gateway.fetch(&schema_request()).await.unwrap(), json!({"game": 1}));
        assert_eq!(gateway.fetch(&schema_request()).await.unwrap(), json!({"game": 1}));

        assert_eq!(remote.calls(), 1);
        let stats = gateway.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(gateway.cache().tier(CacheTier::Api).stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_fetches_share_one_call() {
        let remote = Arc::new(
            ScriptedRemote::always(Ok(RemoteResponse::ok(json!([1, 2, 3]))))
                .with_latency(Duration::from_millis(200)),
        );
        let gateway = gateway(remote.clone());
        let request = schema_request();

        let (a, b) = tokio::join!(gateway.fetch(&request), gateway.fetch(&request));
        assert_eq!(a.unwrap(), json!([1, 2, 3]));
        assert_eq!(b.unwrap(), json!([1, 2, 3]));
        assert_eq!(remote.calls(), 1);
        assert_eq!(gateway.stats().coalesced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_definitive_status_is_not_retried() {
        let remote = Arc::new(ScriptedRemote::always(Ok(RemoteResponse::new(404, json!(null)))));
        let gateway = gateway(remote.clone());

        let err = gateway.fetch(&schema_request()).await.unwrap_err();
        assert!(matches!(err, IntelError::UpstreamError { status: 404 }));
        assert_eq!(remote.calls(), 1);
        assert_eq!(
            gateway.breaker().state(),
            crate::traffic::CircuitBreakerState::Closed { failure_count: 0 }
        );
        // Failures are never cached
        assert!(gateway.cache().tier(CacheTier::Api).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_then_succeed() {
        let remote = Arc::new(
            ScriptedRemote::always(Ok(RemoteResponse::ok(json!("ok"))))
                .then(Ok(RemoteResponse::new(503, json!(null))))
                .then(Err(RemoteError::Timeout(Duration::from_secs(10)))),
        );
        let gateway = gateway(remote.clone());

        assert_eq!(gateway.fetch(&schema_request()).await.unwrap(), json!("ok"));
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_become_transient_failure() {
        let remote = Arc::new(ScriptedRemote::always(Ok(RemoteResponse::new(429, json!(null)))));
        let gateway = gateway(remote.clone());

        match gateway.fetch(&schema_request()).await {
            Err(IntelError::TransientFailure { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("429"));
            }
            other => panic!("Expected transient failure, got {:?}", other),
        }
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_counts_logical_calls_and_fails_fast() {
        let remote = Arc::new(ScriptedRemote::always(Err(RemoteError::Connection(
            "refused".into(),
        ))));
        let gateway = gateway_with(
            remote.clone(),
            RateLimitConfig {
                capacity: 100.0,
                refill_rate: 100.0,
            },
            CircuitBreakerConfig {
                failure_threshold: 2,
                timeout: Duration::from_secs(60),
            },
        );

        for _ in 0..2 {
            let err = gateway.fetch(&schema_request()).await.unwrap_err();
            assert!(matches!(err, IntelError::TransientFailure { attempts: 3, .. }));
        }
        assert_eq!(remote.calls(), 6);

        let err = gateway.fetch(&schema_request()).await.unwrap_err();
        assert!(matches!(err, IntelError::CircuitOpen { .. }));
        assert_eq!(remote.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_wait_is_bounded() {
        let remote = Arc::new(ScriptedRemote::always(Ok(RemoteResponse::ok(json!(1)))));
        let gateway = gateway_with(
            remote.clone(),
            RateLimitConfig {
                capacity: 1.0,
                refill_rate: 0.01,
            },
            CircuitBreakerConfig::default(),
        );

        gateway.fetch(&schema_request()).await.unwrap();

        let started = tokio::time::Instant::now();
        let other = FetchRequest::new("ISteamNews/GetNewsForApp/v2/", CacheTier::Api).param("appid", 10);
        let err = gateway.fetch(&other).await.unwrap_err();

        assert!(matches!(err, IntelError::RateLimitExceeded { .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_wait_then_proceeds() {
        let remote = Arc::new(ScriptedRemote::always(Ok(RemoteResponse::ok(json!(1)))));
        let gateway = gateway_with(
            remote.clone(),
            RateLimitConfig {
                capacity: 1.0,
                refill_rate: 1.0,
            },
            CircuitBreakerConfig::default(),
        );

        gateway.fetch(&schema_request()).await.unwrap();
        let other = FetchRequest::new("ISteamNews/GetNewsForApp/v2/", CacheTier::Api);
        assert!(gateway.fetch(&other).await.is_ok());
        assert_eq!(remote.calls(), 2);
    }
}
