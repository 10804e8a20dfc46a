//! # Observability
//!
//! Process-wide logging and metrics setup. Components emit through the
//! `tracing` and `metrics` facades; the binary decides where it goes.

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{describe_metrics, install_prometheus};
