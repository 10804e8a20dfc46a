//! # Parallel Execution Module
//!
//! Bounded fan-out of independent upstream requests with per-task error
//! isolation. See [`ParallelRunner`].

pub mod runner;

pub use runner::{task, ExecutorConfig, ParallelRunner, RunnerStats, TaskFuture, TaskResult, TaskResults};
