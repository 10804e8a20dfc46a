//! # Metrics Export
//!
//! Components record through the `metrics` facade. Without an installed
//! recorder those calls are no-ops; the binary installs the Prometheus exporter
//! when a listen address is configured.

use crate::core::config::MetricsConfig;
use crate::core::error::{IntelError, IntelResult};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing::info;

/// Buckets for the parallel batch duration histogram, in seconds
const BATCH_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Register help text for every metric the crate emits
pub fn describe_metrics() {
    metrics::describe_counter!("intel_cache_hits_total", "Cache lookups served from a tier");
    metrics::describe_counter!(
        "intel_cache_misses_total",
        "Cache lookups that found no live entry"
    );
    metrics::describe_counter!(
        "intel_rate_limit_rejections_total",
        "Token requests denied by the rate limiter"
    );
    metrics::describe_counter!(
        "intel_circuit_breaker_transitions_total",
        "Circuit breaker state changes"
    );
    metrics::describe_gauge!(
        "intel_circuit_breaker_state",
        "Circuit breaker state (0 closed, 1 half-open, 2 open)"
    );
    metrics::describe_counter!(
        "intel_upstream_requests_total",
        "Upstream responses by status code"
    );
    metrics::describe_counter!(
        "intel_upstream_failures_total",
        "Failed gateway fetches by error kind"
    );
    metrics::describe_histogram!(
        "intel_parallel_batch_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time of one parallel batch"
    );
}

/// Install the Prometheus exporter when configured
///
/// Returns `false` when no listen address is set. Must be called inside a
/// tokio runtime.
pub fn install_prometheus(config: &MetricsConfig) -> IntelResult<bool> {
    let Some(addr) = config.prometheus_listen else {
        return Ok(false);
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("intel_parallel_batch_duration_seconds".to_string()),
            BATCH_DURATION_BUCKETS,
        )
        .map_err(|e| IntelError::config(format!("Invalid histogram buckets: {}", e)))?
        .install()
        .map_err(|e| IntelError::config(format!("Failed to install Prometheus exporter: {}", e)))?;

    describe_metrics();
    info!(listen = %addr, "Prometheus exporter listening");
    Ok(true)
}
