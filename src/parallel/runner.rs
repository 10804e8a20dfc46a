//! # Parallel Task Runner
//!
//! Runs a batch of named, independent tasks on the tokio runtime with bounded
//! concurrency and waits for all of them (fan-out / fan-in).
//!
//! - Concurrency is bounded by a semaphore created for each `run_all` call, so
//!   a task may itself call `run_all` without starving its parent batch.
//! - A failing or panicking task only affects its own [`TaskResult`].
//! - Tasks are not retried here; retries belong to the fetch gateway.

use crate::core::error::{IntelError, IntelResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum tasks of one batch running at the same time
    pub max_workers: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_workers: 5 }
    }
}

/// A boxed task future
pub type TaskFuture<V> = BoxFuture<'static, IntelResult<V>>;

/// Pair a name with a task future
pub fn task<V, F>(name: impl Into<String>, future: F) -> (String, TaskFuture<V>)
where
    F: Future<Output = IntelResult<V>> + Send + 'static,
{
    (name.into(), future.boxed())
}

/// Outcome of one task
#[derive(Debug)]
pub struct TaskResult<V> {
    pub name: String,
    pub outcome: IntelResult<V>,
    /// Execution time, excluding time spent waiting for a worker
    pub elapsed: Duration,
}

impl<V> TaskResult<V> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Results of one batch keyed by task name
///
/// When two tasks share a name, the one submitted later wins.
#[derive(Debug)]
pub struct TaskResults<V> {
    results: HashMap<String, TaskResult<V>>,
}

impl<V> TaskResults<V> {
    pub fn get(&self, name: &str) -> Option<&TaskResult<V>> {
        self.results.get(name)
    }

    /// Take the outcome of a task out of the batch
    pub fn take(&mut self, name: &str) -> IntelResult<V> {
        self.results
            .remove(name)
            .map(|result| result.outcome)
            .unwrap_or_else(|| Err(IntelError::internal(format!("No task named '{}'", name))))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn into_inner(self) -> HashMap<String, TaskResult<V>> {
        self.results
    }
}

#[derive(Debug, Default)]
struct RunnerMetrics {
    batches: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    total_batch_ms: AtomicU64,
    total_task_ms: AtomicU64,
}

/// Runner statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerStats {
    pub max_workers: usize,
    pub batches: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub avg_batch_ms: f64,
    pub avg_task_ms: f64,
}

/// Bounded fan-out / fan-in executor
#[derive(Debug, Default)]
pub struct ParallelRunner {
    config: ExecutorConfig,
    metrics: RunnerMetrics,
}

impl ParallelRunner {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            metrics: RunnerMetrics::default(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.config.max_workers.max(1)
    }

    /// Run every task and wait for all of them
    pub async fn run_all<V>(&self, tasks: Vec<(String, TaskFuture<V>)>) -> TaskResults<V>
    where
        V: Send + 'static,
    {
        let batch_id = Uuid::new_v4();
        let batch_started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_workers()));
        debug!(batch = %batch_id, tasks = tasks.len(), width = self.max_workers(), "Starting batch");

        let mut handles = Vec::with_capacity(tasks.len());
        for (name, future) in tasks {
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Instant::now();
                let outcome = future.await;
                (outcome, started.elapsed())
            });
            handles.push((name, handle));
        }

        let mut results = HashMap::with_capacity(handles.len());
        for (name, handle) in handles {
            let (outcome, elapsed) = match handle.await {
                Ok(finished) => finished,
                Err(join_error) => (
                    Err(IntelError::TaskFailed {
                        task: name.clone(),
                        message: join_error.to_string(),
                    }),
                    Duration::ZERO,
                ),
            };

            self.metrics
                .total_task_ms
                .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
            match &outcome {
                Ok(_) => {
                    self.metrics.tasks_completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.metrics.tasks_failed.fetch_add(1, Ordering::Relaxed);
                    warn!(batch = %batch_id, task = %name, error = %err, "Task failed");
                }
            }

            results.insert(
                name.clone(),
                TaskResult {
                    name,
                    outcome,
                    elapsed,
                },
            );
        }

        let batch_elapsed = batch_started.elapsed();
        self.metrics.batches.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .total_batch_ms
            .fetch_add(batch_elapsed.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!("intel_parallel_batch_duration_seconds").record(batch_elapsed.as_secs_f64());
        debug!(batch = %batch_id, elapsed_ms = batch_elapsed.as_millis() as u64, "Batch finished");

        TaskResults { results }
    }

    /// Get a statistics snapshot
    pub fn stats(&self) -> RunnerStats {
        let batches = self.metrics.batches.load(Ordering::Relaxed);
        let completed = self.metrics.tasks_completed.load(Ordering::Relaxed);
        let failed = self.metrics.tasks_failed.load(Ordering::Relaxed);
        let average = |total: u64, count: u64| {
            if count == 0 {
                0.0
            } else {
                (total as f64 / count as f64 * 10.0).round() / 10.0
            }
        };

        RunnerStats {
            max_workers: self.max_workers(),
            batches,
            tasks_completed: completed,
            tasks_failed: failed,
            avg_batch_ms: average(self.metrics.total_batch_ms.load(Ordering::Relaxed), batches),
            avg_task_ms: average(
                self.metrics.total_task_ms.load(Ordering::Relaxed),
                completed + failed,
            ),
        }
    }
}
