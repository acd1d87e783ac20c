//! Plan execution.
//!
//! Batches run in dependency waves: every batch whose prerequisites have
//! finished joins the next wave, and the batches of a wave (plus the
//! operations inside each batch) run on a bounded rayon pool. Cancellation
//! is only observed between waves, so a batch is never abandoned halfway.
//! Failed operations are retried with exponential backoff; a batch that
//! depends on a batch with failures is skipped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::BatchConfig;
use crate::errors::SyncResult;
use crate::models::{BatchPlan, UpdateBatch, UpdateOperation};
use crate::query::guards::{clamp_retries, clamp_workers, MAX_RETRY_BACKOFF_MS};

/// Executes a single operation. Implementations must not retry on their own.
pub trait OperationRunner: Sync {
    fn run(&self, operation: &UpdateOperation) -> SyncResult<()>;
}

impl<F> OperationRunner for F
where
    F: Fn(&UpdateOperation) -> SyncResult<()> + Sync,
{
    fn run(&self, operation: &UpdateOperation) -> SyncResult<()> {
        self(operation)
    }
}

/// Cooperative cancellation flag shared between the caller and the executor.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub operation_id: String,
    pub target: String,
    pub message: String,
    /// Retries spent before giving up.
    pub retry_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub total_batches: usize,
    pub executed_batches: usize,
    pub skipped_batches: usize,
    pub waves: usize,
    pub total_retries: u32,
    pub elapsed_ms: u64,
    pub workers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// True when every operation completed and nothing was cancelled.
    pub success: bool,
    pub completed_operations: usize,
    pub failed_operations: usize,
    pub skipped_operations: usize,
    pub cancelled: bool,
    /// Ids of completed operations, in completion-wave order.
    pub completed: Vec<String>,
    pub errors: Vec<OperationError>,
    pub metrics: ExecutionMetrics,
}

struct Outcome {
    operation_id: String,
    target: String,
    retry_count: u32,
    error: Option<String>,
}

struct BatchOutcome {
    batch_index: usize,
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone)]
struct RetryPolicy {
    max_retries: u32,
    backoff_ms: u64,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor).min(MAX_RETRY_BACKOFF_MS))
    }
}

fn run_operation(runner: &dyn OperationRunner, op: &UpdateOperation, policy: &RetryPolicy) -> Outcome {
    let mut attempt = 0u32;
    loop {
        let mut current = op.clone();
        current.retry_count = attempt;
        match runner.run(&current) {
            Ok(()) => {
                return Outcome {
                    operation_id: op.id.clone(),
                    target: op.target.clone(),
                    retry_count: attempt,
                    error: None,
                }
            }
            Err(err) if attempt < policy.max_retries && !err.is_fatal() => {
                tracing::debug!(operation = %op.id, attempt, error = %err, "retrying operation");
                std::thread::sleep(policy.delay(attempt));
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(operation = %op.id, retries = attempt, error = %err, "operation failed");
                return Outcome {
                    operation_id: op.id.clone(),
                    target: op.target.clone(),
                    retry_count: attempt,
                    error: Some(err.to_string()),
                };
            }
        }
    }
}

fn run_batch(
    runner: &dyn OperationRunner,
    index: usize,
    batch: &UpdateBatch,
    policy: &RetryPolicy,
) -> BatchOutcome {
    let outcomes = batch
        .operations
        .par_iter()
        .map(|op| run_operation(runner, op, policy))
        .collect();
    BatchOutcome {
        batch_index: index,
        outcomes,
    }
}

fn run_wave(
    pool: Option<&rayon::ThreadPool>,
    runner: &dyn OperationRunner,
    plan: &BatchPlan,
    wave: &[usize],
    policy: &RetryPolicy,
) -> Vec<BatchOutcome> {
    match pool {
        Some(pool) => pool.install(|| {
            wave.par_iter()
                .map(|&i| run_batch(runner, i, &plan.batches[i], policy))
                .collect()
        }),
        None => wave
            .iter()
            .map(|&i| BatchOutcome {
                batch_index: i,
                outcomes: plan.batches[i]
                    .operations
                    .iter()
                    .map(|op| run_operation(runner, op, policy))
                    .collect(),
            })
            .collect(),
    }
}

/// Execute a plan to completion. Operation failures never abort the plan;
/// they are itemised in the result.
pub fn execute_optimized(
    plan: &BatchPlan,
    runner: &dyn OperationRunner,
    config: &BatchConfig,
    cancel: &CancellationToken,
) -> ExecutionResult {
    let started = Instant::now();
    let workers = clamp_workers(config.max_parallelism as i64);
    let policy = RetryPolicy {
        max_retries: clamp_retries(config.max_retries as i64),
        backoff_ms: config.retry_backoff_ms.min(MAX_RETRY_BACKOFF_MS),
    };
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => Some(pool),
        Err(err) => {
            tracing::warn!(error = %err, "thread pool unavailable, executing sequentially");
            None
        }
    };

    let index: HashMap<&str, usize> = plan
        .batches
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.as_str(), i))
        .collect();
    let deps: Vec<Vec<usize>> = plan
        .batches
        .iter()
        .map(|b| {
            b.dependencies
                .iter()
                .filter_map(|d| {
                    let found = index.get(d.as_str()).copied();
                    if found.is_none() {
                        tracing::warn!(batch = %b.id, dependency = %d, "ignoring unknown batch dependency");
                    }
                    found
                })
                .collect()
        })
        .collect();

    let mut result = ExecutionResult {
        metrics: ExecutionMetrics {
            total_batches: plan.batches.len(),
            workers,
            ..ExecutionMetrics::default()
        },
        ..ExecutionResult::default()
    };
    tracing::info!(
        batches = plan.batches.len(),
        operations = plan.total_operations,
        workers,
        "executing batch plan"
    );

    let mut finished: HashSet<usize> = HashSet::new();
    // Batches with failed or skipped operations; their dependents are skipped.
    let mut tainted: HashSet<usize> = HashSet::new();

    while finished.len() < plan.batches.len() {
        let ready: Vec<usize> = (0..plan.batches.len())
            .filter(|i| !finished.contains(i) && deps[*i].iter().all(|d| finished.contains(d)))
            .collect();

        if cancel.is_cancelled() || ready.is_empty() {
            if !cancel.is_cancelled() {
                tracing::warn!("batch dependencies form a cycle; skipping the remainder");
            }
            result.cancelled = cancel.is_cancelled();
            for i in 0..plan.batches.len() {
                if finished.insert(i) {
                    result.skipped_operations += plan.batches[i].operations.len();
                    result.metrics.skipped_batches += 1;
                }
            }
            break;
        }

        let mut wave: Vec<usize> = Vec::new();
        for i in ready {
            if deps[i].iter().any(|d| tainted.contains(d)) {
                tracing::warn!(batch = %plan.batches[i].id, "skipping batch after upstream failure");
                result.skipped_operations += plan.batches[i].operations.len();
                result.metrics.skipped_batches += 1;
                tainted.insert(i);
                finished.insert(i);
            } else {
                wave.push(i);
            }
        }
        if wave.is_empty() {
            continue;
        }

        result.metrics.waves += 1;
        for outcome in run_wave(pool.as_ref(), runner, plan, &wave, &policy) {
            let mut failed = false;
            for op in outcome.outcomes {
                result.metrics.total_retries += op.retry_count;
                match op.error {
                    None => {
                        result.completed_operations += 1;
                        result.completed.push(op.operation_id);
                    }
                    Some(message) => {
                        failed = true;
                        result.failed_operations += 1;
                        result.errors.push(OperationError {
                            operation_id: op.operation_id,
                            target: op.target,
                            message,
                            retry_count: op.retry_count,
                        });
                    }
                }
            }
            if failed {
                tainted.insert(outcome.batch_index);
            }
            result.metrics.executed_batches += 1;
            finished.insert(outcome.batch_index);
        }
    }

    result.success =
        !result.cancelled && result.failed_operations == 0 && result.skipped_operations == 0;
    result.metrics.elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        success = result.success,
        completed = result.completed_operations,
        failed = result.failed_operations,
        skipped = result.skipped_operations,
        cancelled = result.cancelled,
        elapsed_ms = result.metrics.elapsed_ms,
        "batch plan finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SyncError;
    use crate::models::OperationKind;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn op(id: &str) -> UpdateOperation {
        UpdateOperation {
            id: id.into(),
            kind: OperationKind::UpdateArtifact,
            target: id.into(),
            priority: 1,
            retry_count: 0,
            estimated_ms: 1,
            depends_on: vec![],
        }
    }

    fn batch(id: &str, ops: &[&str], deps: &[&str], level: usize) -> UpdateBatch {
        UpdateBatch {
            id: id.into(),
            operations: ops.iter().map(|o| op(o)).collect(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            estimated_time_ms: 1,
            level,
        }
    }

    fn plan(batches: Vec<UpdateBatch>) -> BatchPlan {
        let total_operations = batches.iter().map(|b| b.operations.len()).sum();
        BatchPlan {
            parallel_groups: 0,
            total_operations,
            estimated_time_ms: 0,
            batches,
        }
    }

    fn fast_config() -> BatchConfig {
        BatchConfig {
            retry_backoff_ms: 0,
            ..BatchConfig::default()
        }
    }

    #[test]
    fn runs_everything_in_dependency_order() {
        let p = plan(vec![
            batch("b0", &["x", "y"], &[], 0),
            batch("b1", &["z"], &["b0"], 1),
        ]);
        let seen = Mutex::new(Vec::new());
        let runner = |o: &UpdateOperation| -> SyncResult<()> {
            seen.lock().push(o.id.clone());
            Ok(())
        };
        let result = execute_optimized(&p, &runner, &fast_config(), &CancellationToken::new());
        assert!(result.success);
        assert_eq!(result.completed_operations, 3);
        assert_eq!(result.metrics.waves, 2);
        let seen = seen.lock();
        assert_eq!(seen.last().map(String::as_str), Some("z"));
    }

    #[test]
    fn failures_are_itemised_and_dependents_skipped() {
        let p = plan(vec![
            batch("b0", &["ok", "bad"], &[], 0),
            batch("b1", &["independent"], &[], 0),
            batch("b2", &["after"], &["b0"], 1),
        ]);
        let runner = |o: &UpdateOperation| -> SyncResult<()> {
            if o.id == "bad" {
                Err(SyncError::Generation("boom".into()))
            } else {
                Ok(())
            }
        };
        let result = execute_optimized(&p, &runner, &fast_config(), &CancellationToken::new());
        assert!(!result.success);
        assert_eq!(result.completed_operations, 2);
        assert_eq!(result.failed_operations, 1);
        assert_eq!(result.skipped_operations, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].operation_id, "bad");
        assert_eq!(result.errors[0].retry_count, 2);
        assert_eq!(
            result.completed_operations + result.failed_operations + result.skipped_operations,
            p.total_operations
        );
    }

    #[test]
    fn transient_failures_are_retried() {
        let calls = AtomicUsize::new(0);
        let runner = |_: &UpdateOperation| -> SyncResult<()> {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SyncError::Store("busy".into()))
            } else {
                Ok(())
            }
        };
        let p = plan(vec![batch("b0", &["only"], &[], 0)]);
        let result = execute_optimized(&p, &runner, &fast_config(), &CancellationToken::new());
        assert!(result.success);
        assert_eq!(result.metrics.total_retries, 1);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let runner = |_: &UpdateOperation| -> SyncResult<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::MissingContent("ours".into()))
        };
        let p = plan(vec![batch("b0", &["only"], &[], 0)]);
        let result = execute_optimized(&p, &runner, &fast_config(), &CancellationToken::new());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.errors[0].retry_count, 0);
    }

    #[test]
    fn cancellation_is_checked_between_waves() {
        let token = CancellationToken::new();
        let p = plan(vec![
            batch("b0", &["first", "second"], &[], 0),
            batch("b1", &["third"], &["b0"], 1),
        ]);
        let runner = |_: &UpdateOperation| -> SyncResult<()> {
            token.cancel();
            Ok(())
        };
        let result = execute_optimized(&p, &runner, &fast_config(), &token);
        assert!(result.cancelled);
        assert!(!result.success);
        assert_eq!(result.completed_operations, 2);
        assert_eq!(result.skipped_operations, 1);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_ms: 100,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(40), Duration::from_millis(MAX_RETRY_BACKOFF_MS));
    }
}
