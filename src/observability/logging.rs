//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. Output always goes to stderr so
//! stdout carries only tool results.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and everything else logs at `warn`.

use crate::core::config::{LogFormat, LoggingConfig};
use crate::core::error::{IntelError, IntelResult};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter used when `RUST_LOG` is not set
pub fn default_directives(level: &str) -> String {
    format!("warn,achievement_intel={}", level.to_lowercase())
}

fn env_filter(config: &LoggingConfig) -> IntelResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_directives(&config.level))
            .map_err(|e| IntelError::config(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Initialize the global subscriber
///
/// A second call keeps the first subscriber and only logs a warning.
pub fn init_tracing(config: &LoggingConfig) -> IntelResult<()> {
    let filter = env_filter(config)?;
    let registry = Registry::default().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return Ok(());
    }

    info!(level = %config.level, format = ?config.format, "Structured logging initialized");
    Ok(())
}
