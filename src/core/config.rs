//! # Configuration Module
//!
//! Configuration structures and loading for the intelligence core.
//!
//! ## Key Features
//! - YAML/JSON/TOML configuration parsing with serde, chosen by file extension
//! - Human-readable durations ("15m", "500ms") via `humantime-serde`
//! - Environment variable overrides with the `INTEL_` prefix
//! - Validation that reports every problem at once

use crate::caching::CacheConfigs;
use crate::core::error::{IntelError, IntelResult};
use crate::gateway::FetchConfig;
use crate::parallel::ExecutorConfig;
use crate::traffic::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Complete configuration of the intelligence core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelConfig {
    /// Capacity and TTL of the api, tool and guide cache tiers
    pub cache: CacheConfigs,

    /// Token bucket protecting the upstream
    pub rate_limit: RateLimitConfig,

    pub circuit_breaker: CircuitBreakerConfig,

    pub retry: RetryConfig,

    /// Bounded waiting for rate limit tokens
    pub gateway: FetchConfig,

    /// Parallel runner width
    pub executor: ExecutorConfig,

    /// Upstream endpoints and credentials
    pub upstream: UpstreamConfig,

    /// Output sizes of the tool operations
    pub roadmap: RoadmapConfig,

    /// Logging and metrics settings
    pub observability: ObservabilityConfig,
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> IntelResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(IntelError::config(format!(
                "Unsupported config file extension: {}",
                path.display()
            ))),
        }
    }
}

impl IntelConfig {
    /// Load configuration from a YAML, JSON or TOML file
    ///
    /// Environment overrides are applied before validation.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> IntelResult<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IntelError::config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let mut config = Self::parse(&content, format)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text without overrides or validation
    pub fn parse(content: &str, format: ConfigFormat) -> IntelResult<Self> {
        let config = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: INTEL_<SECTION>_<FIELD>
    /// For example: INTEL_RATE_LIMIT_REFILL_RATE=1.5
    pub fn apply_env_overrides(&mut self) -> IntelResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> IntelResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Overrides { lookup };

        // Upstream
        if let Some(key) = vars.string("INTEL_UPSTREAM_API_KEY") {
            self.upstream.api_key = key;
        }
        if let Some(id) = vars.string("INTEL_UPSTREAM_STEAM_ID") {
            self.upstream.steam_id = id;
        }
        if let Some(url) = vars.string("INTEL_UPSTREAM_API_BASE_URL") {
            self.upstream.api_base_url = url;
        }
        if let Some(url) = vars.string("INTEL_UPSTREAM_COMMUNITY_BASE_URL") {
            self.upstream.community_base_url = url;
        }
        if let Some(timeout) = vars.duration("INTEL_UPSTREAM_TIMEOUT")? {
            self.upstream.timeout = timeout;
        }
        if let Some(path) = vars.string("INTEL_UPSTREAM_LIBRARY_PATH") {
            self.upstream.library_path = Some(PathBuf::from(path));
        }

        // Traffic
        if let Some(capacity) = vars.parsed("INTEL_RATE_LIMIT_CAPACITY")? {
            self.rate_limit.capacity = capacity;
        }
        if let Some(rate) = vars.parsed("INTEL_RATE_LIMIT_REFILL_RATE")? {
            self.rate_limit.refill_rate = rate;
        }
        if let Some(threshold) = vars.parsed("INTEL_CIRCUIT_BREAKER_FAILURE_THRESHOLD")? {
            self.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(timeout) = vars.duration("INTEL_CIRCUIT_BREAKER_TIMEOUT")? {
            self.circuit_breaker.timeout = timeout;
        }
        if let Some(retries) = vars.parsed("INTEL_RETRY_MAX_RETRIES")? {
            self.retry.max_retries = retries;
        }
        if let Some(delay) = vars.duration("INTEL_RETRY_BASE_DELAY")? {
            self.retry.base_delay = delay;
        }

        if let Some(workers) = vars.parsed("INTEL_EXECUTOR_MAX_WORKERS")? {
            self.executor.max_workers = workers;
        }

        // Observability
        if let Some(level) = vars.string("INTEL_LOG_LEVEL") {
            self.observability.logging.level = level;
        }
        if let Some(format) = vars.parsed("INTEL_LOG_FORMAT")? {
            self.observability.logging.format = format;
        }
        if let Some(listen) = vars.parsed("INTEL_METRICS_PROMETHEUS_LISTEN")? {
            self.observability.metrics.prometheus_listen = Some(listen);
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    pub fn validate(&self) -> IntelResult<()> {
        let mut errors = Vec::new();

        for (tier, tier_config) in [
            ("api", &self.cache.api),
            ("tool", &self.cache.tool),
            ("guide", &self.cache.guide),
        ] {
            if tier_config.capacity == 0 {
                errors.push(format!("cache.{}.capacity must be greater than 0", tier));
            }
            if tier_config.ttl.is_zero() {
                errors.push(format!("cache.{}.ttl must be greater than 0", tier));
            }
        }

        if !(self.rate_limit.capacity.is_finite() && self.rate_limit.capacity >= 1.0) {
            errors.push(format!(
                "rate_limit.capacity must be at least 1, got: {}",
                self.rate_limit.capacity
            ));
        }
        if !(self.rate_limit.refill_rate.is_finite() && self.rate_limit.refill_rate > 0.0) {
            errors.push(format!(
                "rate_limit.refill_rate must be greater than 0, got: {}",
                self.rate_limit.refill_rate
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            errors.push("circuit_breaker.failure_threshold must be greater than 0".to_string());
        }
        if self.circuit_breaker.timeout.is_zero() {
            errors.push("circuit_breaker.timeout must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            errors.push(format!(
                "retry.jitter_ratio must be between 0.0 and 1.0, got: {}",
                self.retry.jitter_ratio
            ));
        }
        if self.retry.max_delay < self.retry.base_delay {
            errors.push("retry.max_delay must not be shorter than retry.base_delay".to_string());
        }

        if self.gateway.max_wait_attempts == 0 {
            errors.push("gateway.max_wait_attempts must be greater than 0".to_string());
        }
        if self.executor.max_workers == 0 {
            errors.push("executor.max_workers must be greater than 0".to_string());
        }

        for (field, value) in [
            ("upstream.api_base_url", &self.upstream.api_base_url),
            ("upstream.community_base_url", &self.upstream.community_base_url),
        ] {
            if value.is_empty() {
                errors.push(format!("{} cannot be empty", field));
            } else if let Err(e) = Url::parse(value) {
                errors.push(format!("{} is not a valid URL ({}): {}", field, e, value));
            }
        }
        if self.upstream.timeout.is_zero() {
            errors.push("upstream.timeout must be greater than 0".to_string());
        }

        if self.roadmap.limit == 0 {
            errors.push("roadmap.limit must be greater than 0".to_string());
        }

        match self.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.observability.logging.level)),
        }

        if !errors.is_empty() {
            return Err(IntelError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

struct Overrides<F> {
    lookup: F,
}

impl<F> Overrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    fn parsed<T>(&self, name: &str) -> IntelResult<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.string(name)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|e| IntelError::config(format!("Invalid {}: {}", name, e)))
            })
            .transpose()
    }

    fn duration(&self, name: &str) -> IntelResult<Option<Duration>> {
        self.string(name)
            .map(|raw| {
                humantime::parse_duration(raw.trim())
                    .map_err(|e| IntelError::config(format!("Invalid {}: {}", name, e)))
            })
            .transpose()
    }
}

/// Upstream endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Web API base URL; relative endpoints are joined onto it
    pub api_base_url: String,

    /// Community site base URL (guide listings and links)
    pub community_base_url: String,

    /// Web API key, sent as the `key` query parameter when set
    pub api_key: String,

    /// 64-bit id of the player whose progress is read
    pub steam_id: String,

    /// Deadline of a single remote attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// JSON file with the local game library
    pub library_path: Option<PathBuf>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.steampowered.com/".to_string(),
            community_base_url: "https://steamcommunity.com".to_string(),
            api_key: String::new(),
            steam_id: String::new(),
            timeout: Duration::from_secs(10),
            library_path: None,
        }
    }
}

/// Output sizes of the tool operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadmapConfig {
    /// Achievements returned by a roadmap
    pub limit: usize,

    /// Leading roadmap entries that get next-step hints
    pub next_steps: usize,

    /// Guides fetched from the listing page for a missable scan
    pub guide_search_limit: usize,

    /// Guides whose bodies are scanned for missable content
    pub missable_guide_limit: usize,

    /// News items in a session context
    pub news_count: usize,
}

impl Default for RoadmapConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            next_steps: 5,
            guide_search_limit: 20,
            missable_guide_limit: 5,
            news_count: 3,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for this crate when RUST_LOG is unset
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log line formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = IntelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            other => Err(IntelError::config(format!("Unknown log format '{}'", other))),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address of the Prometheus scrape endpoint; disabled when unset
    pub prometheus_listen: Option<SocketAddr>,
}
