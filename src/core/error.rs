//! # Error Handling Module
//!
//! Every fallible operation in the crate returns [`IntelResult<T>`]. The
//! [`IntelError`] enum carries the typed signals the fetch pipeline produces
//! (rate limited, circuit open, upstream status, exhausted retries) next to the
//! plumbing errors (I/O, parsing, configuration).
//!
//! Aggregating operations never propagate a single section's error to the whole
//! response; they convert it into a section marker with [`IntelError::error_type`]
//! and the display message.

use std::time::Duration;
use thiserror::Error;

/// Main result type used throughout the crate
pub type IntelResult<T> = Result<T, IntelError>;

/// Error types for the intelligence core
#[derive(Debug, Error, Clone)]
pub enum IntelError {
    /// The requested game (or other record) does not exist
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// No rate limit token became available within the bounded wait
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    /// The circuit breaker rejected the call without contacting upstream
    #[error("Circuit breaker '{breaker}' is open, retry in {retry_in:?}")]
    CircuitOpen { breaker: String, retry_in: Duration },

    /// Upstream answered with a non-success status
    #[error("Upstream returned status {status}")]
    UpstreamError { status: u16 },

    /// A retryable failure survived the whole retry budget
    #[error("Transient failure after {attempts} attempts: {last_error}")]
    TransientFailure { attempts: u32, last_error: String },

    /// Dependency analysis found achievements that reference each other
    #[error("Dependency cycle between {members:?} (blocked: {blocked:?})")]
    DependencyCycle {
        members: Vec<String>,
        blocked: Vec<String>,
    },

    /// Connection could not be established or was reset
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// A single remote attempt exceeded its deadline
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// An upstream payload did not have the expected shape
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// A spawned task panicked or was cancelled
    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal errors for unexpected failures
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// TOML parsing errors for configuration files
    #[error("TOML error: {message}")]
    Toml { message: String },
}

impl IntelError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a not found error for the given subject
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a parse error with a custom message
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Check if this error should be retried
    ///
    /// 429, 5xx, connection errors and timeouts are transient. Everything else
    /// (404, 403, parse errors, open circuit) is definitive for this call.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamError { status } => *status == 429 || (500..600).contains(status),
            Self::Connection { .. } => true,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Check if this error should count as a circuit breaker failure
    ///
    /// A definitive upstream answer (for example 404) proves upstream is alive,
    /// so it does not count.
    pub fn should_trip_breaker(&self) -> bool {
        match self {
            Self::UpstreamError { .. } | Self::Connection { .. } | Self::Timeout { .. } => {
                self.is_retryable()
            }
            Self::TransientFailure { .. } => true,
            _ => false,
        }
    }

    /// Get a stable string tag for the error kind
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::UpstreamError { .. } => "upstream_error",
            Self::TransientFailure { .. } => "transient_failure",
            Self::DependencyCycle { .. } => "dependency_cycle",
            Self::Connection { .. } => "connection_error",
            Self::Timeout { .. } => "timeout",
            Self::Parse { .. } => "parse_error",
            Self::TaskFailed { .. } => "task_failed",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
            Self::Toml { .. } => "toml_error",
        }
    }
}

impl From<std::io::Error> for IntelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for IntelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for IntelError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for IntelError {
    fn from(err: toml::de::Error) -> Self {
        Self::Toml {
            message: err.to_string(),
        }
    }
}

/// Convenience macro for creating internal errors
///
/// Usage: `internal_error!("missing section: {}", name)`
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::core::error::IntelError::internal(format!($($arg)*))
    };
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid capacity: {}", capacity)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::IntelError::config(format!($($arg)*))
    };
}
