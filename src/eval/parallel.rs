//! Opt-in concurrency: bounded parallel, race, batch with retry and a
//! parallel `foreach`.
//!
//! Every operation runs on its own [`ExecutionContext::fork`], so writes to
//! variables stay inside the operation while the handler, keywords, result
//! log and metrics are shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::context::ExecutionContext;
use super::interpreter::execute_steps;
use super::loops::{bind_iteration, collect_items};
use crate::ast::{BatchNode, ParallelForEachNode, ParallelNode, RaceNode, Step};
use crate::error::{EvalError, EvalResult};
use crate::handler::ActionError;

/// Settled outcome of one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult {
    /// 0-based position of the operation in its block.
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Aggregate returned by `parallel` (without fail-fast), `batch` and
/// parallel `forEach`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<OperationResult>,
}

impl ParallelSummary {
    pub fn new(mut results: Vec<OperationResult>) -> Self {
        results.sort_by_key(|r| r.index);
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    pub fn to_value(&self) -> Value {
        let results: Vec<Value> = self
            .results
            .iter()
            .map(|r| {
                json!({
                    "index": r.index,
                    "success": r.success,
                    "value": r.value,
                    "error": r.error,
                    "attempts": r.attempts,
                    "elapsedMs": r.elapsed_ms,
                })
            })
            .collect();
        json!({
            "total": self.total,
            "succeeded": self.succeeded,
            "failed": self.failed,
            "results": results,
        })
    }
}

/// One unit of concurrent work: a step list and the fork it runs on.
struct Operation {
    index: usize,
    steps: Vec<Step>,
    ctx: ExecutionContext,
}

struct Settled {
    result: OperationResult,
    error: Option<EvalError>,
}

impl Settled {
    fn new(index: usize, outcome: EvalResult<Value>, attempts: u32, elapsed: Duration) -> Self {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Ok(value) => Self {
                result: OperationResult {
                    index,
                    success: true,
                    value: Some(value),
                    error: None,
                    attempts,
                    elapsed_ms,
                },
                error: None,
            },
            Err(err) => Self {
                result: OperationResult {
                    index,
                    success: false,
                    value: None,
                    error: Some(err.to_string()),
                    attempts,
                    elapsed_ms,
                },
                error: Some(err),
            },
        }
    }
}

async fn run_operation(steps: &[Step], ctx: &ExecutionContext, timeout: Duration) -> EvalResult<Value> {
    match tokio::time::timeout(timeout, execute_steps(steps, ctx)).await {
        Ok(flow) => flow.map(|f| f.into_value()),
        Err(_) => Err(EvalError::Timeout { after: timeout }),
    }
}

fn join_failure(index: usize, err: tokio::task::JoinError) -> Settled {
    Settled::new(
        index,
        Err(ActionError::Failed(format!("operation task failed: {}", err)).into()),
        1,
        Duration::ZERO,
    )
}

/// Admit operations in order, never more than `max_concurrency` in flight.
/// With `fail_fast`, admission stops after the first failure; operations
/// already running are left to settle.
async fn run_bounded(
    operations: Vec<Operation>,
    max_concurrency: usize,
    timeout: Duration,
    fail_fast: bool,
) -> EvalResult<Vec<Settled>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let failed = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(operations.len());

    for operation in operations {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ActionError::Failed(e.to_string()))?;
        if fail_fast && failed.load(Ordering::SeqCst) {
            debug!(index = operation.index, "fail-fast: not admitting further operations");
            break;
        }
        debug!(index = operation.index, "admitting operation");
        let failed = failed.clone();
        let index = operation.index;
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let outcome = run_operation(&operation.steps, &operation.ctx, timeout).await;
            if outcome.is_err() {
                failed.store(true, Ordering::SeqCst);
            }
            Settled::new(operation.index, outcome, 1, started.elapsed())
        });
        handles.push((index, handle));
    }

    let mut settled = Vec::with_capacity(handles.len());
    for (index, handle) in handles {
        settled.push(handle.await.unwrap_or_else(|e| join_failure(index, e)));
    }
    Ok(settled)
}

/// With fail-fast, raise the lowest-indexed failure; otherwise summarize.
fn conclude(settled: Vec<Settled>, fail_fast: bool) -> EvalResult<Value> {
    if fail_fast {
        let first_failure = settled
            .iter()
            .filter_map(|s| s.error.as_ref().map(|e| (s.result.index, e)))
            .min_by_key(|(index, _)| *index);
        if let Some((index, source)) = first_failure {
            return Err(EvalError::ParallelFailed {
                index,
                source: Box::new(source.clone()),
            });
        }
    }
    let summary = ParallelSummary::new(settled.into_iter().map(|s| s.result).collect());
    debug!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "parallel block settled"
    );
    Ok(summary.to_value())
}

#[tracing::instrument(skip_all, fields(operations = node.actions.len()), level = "debug")]
pub async fn run_parallel(node: &ParallelNode, ctx: &ExecutionContext) -> EvalResult<Value> {
    let defaults = &ctx.config().parallel;
    let max_concurrency = node.max_concurrency.unwrap_or(defaults.max_concurrency);
    let fail_fast = node.fail_fast.unwrap_or(defaults.fail_fast);
    let timeout = node.timeout.unwrap_or(defaults.timeout);

    let operations = node
        .actions
        .iter()
        .enumerate()
        .map(|(index, step)| Operation {
            index,
            steps: vec![step.clone()],
            ctx: ctx.fork(),
        })
        .collect();
    let settled = run_bounded(operations, max_concurrency, timeout, fail_fast).await?;
    conclude(settled, fail_fast)
}

/// Parallel `forEach`: one operation per element, each with its own copy
/// of the loop bindings.
#[tracing::instrument(skip_all, fields(item = %node.iter.item), level = "debug")]
pub async fn run_foreach(node: &ParallelForEachNode, ctx: &ExecutionContext) -> EvalResult<Value> {
    let defaults = &ctx.config().parallel;
    let max_concurrency = node.max_concurrency.unwrap_or(defaults.max_concurrency);
    let fail_fast = node.fail_fast.unwrap_or(defaults.fail_fast);
    let timeout = node.timeout.unwrap_or(defaults.timeout);

    let operations = collect_items(&node.iter.source, ctx)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let fork = ctx.fork();
            bind_iteration(&node.iter, index, item, &fork);
            Operation {
                index,
                steps: node.body.clone(),
                ctx: fork,
            }
        })
        .collect();
    let settled = run_bounded(operations, max_concurrency, timeout, fail_fast).await?;
    conclude(settled, fail_fast)
}

/// Start every operation and yield the value of the first to succeed.
#[tracing::instrument(skip_all, fields(operations = node.actions.len()), level = "debug")]
pub async fn run_race(node: &RaceNode, ctx: &ExecutionContext) -> EvalResult<Value> {
    let timeout = node.timeout.unwrap_or(ctx.config().race.timeout);
    let mut set = JoinSet::new();
    for (index, step) in node.actions.iter().enumerate() {
        let fork = ctx.fork();
        let steps = vec![step.clone()];
        set.spawn(async move { (index, run_operation(&steps, &fork, timeout).await) });
    }

    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(value))) => {
                debug!(index, "race won");
                set.abort_all();
                return Ok(value);
            }
            Ok((index, Err(err))) => failures.push(format!("operation {}: {}", index, err)),
            Err(err) => failures.push(err.to_string()),
        }
    }
    Err(EvalError::RaceExhausted { failures })
}

/// Chunks of `size` operations run concurrently, chunk after chunk, with
/// `delay` in between. A failing operation is retried up to `max_retries`
/// times, the pause starting at `retry_delay` and doubling each attempt.
/// Never raises for individual failures.
#[tracing::instrument(skip_all, fields(operations = node.actions.len()), level = "debug")]
pub async fn run_batch(node: &BatchNode, ctx: &ExecutionContext) -> EvalResult<Value> {
    let defaults = &ctx.config().batch;
    let size = node.size.unwrap_or(defaults.size).max(1);
    let delay = node.delay.unwrap_or(defaults.delay);
    let max_retries = node.max_retries.unwrap_or(defaults.max_retries);
    let retry_delay = node.retry_delay.unwrap_or(defaults.retry_delay);
    let timeout = ctx.config().parallel.timeout;

    let mut results = Vec::with_capacity(node.actions.len());
    for (chunk_index, chunk) in node.actions.chunks(size).enumerate() {
        if chunk_index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut handles = Vec::with_capacity(chunk.len());
        for (offset, step) in chunk.iter().enumerate() {
            let index = chunk_index * size + offset;
            let fork = ctx.fork();
            let steps = vec![step.clone()];
            let handle = tokio::spawn(async move {
                run_with_retry(index, &steps, &fork, timeout, max_retries, retry_delay).await
            });
            handles.push((index, handle));
        }
        for (index, handle) in handles {
            let settled = handle.await.unwrap_or_else(|err| {
                warn!(index, error = %err, "batch operation task failed");
                join_failure(index, err)
            });
            results.push(settled.result);
        }
    }

    let summary = ParallelSummary::new(results);
    debug!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "batch settled"
    );
    Ok(summary.to_value())
}

async fn run_with_retry(
    index: usize,
    steps: &[Step],
    ctx: &ExecutionContext,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
) -> Settled {
    let started = Instant::now();
    let mut backoff = retry_delay;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match run_operation(steps, ctx, timeout).await {
            Ok(value) => return Settled::new(index, Ok(value), attempts, started.elapsed()),
            Err(err) if attempts <= max_retries => {
                warn!(index, attempt = attempts, error = %err, "batch operation failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => return Settled::new(index, Err(err), attempts, started.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_steps;
    use crate::eval::interpreter::StepFlow;
    use pretty_assertions::assert_eq;

    async fn run(ctx: &ExecutionContext, steps: Value) -> EvalResult<Value> {
        execute_steps(&parse_steps(&steps).unwrap(), ctx)
            .await
            .map(StepFlow::into_value)
    }

    #[tokio::test]
    async fn test_parallel_collects_without_fail_fast() {
        let ctx = ExecutionContext::default();
        let value = run(
            &ctx,
            json!([{"parallel": {"failFast": false, "actions": [
                {"echo": 1},
                {"assert": "false"},
                {"echo": 3}
            ]}}]),
        )
        .await
        .unwrap();
        assert_eq!(value["total"], json!(3));
        assert_eq!(value["succeeded"], json!(2));
        assert_eq!(value["failed"], json!(1));
        assert_eq!(value["results"][1]["success"], json!(false));
        assert_eq!(value["results"][2]["value"], json!(3));
    }

    #[tokio::test]
    async fn test_parallel_fail_fast_raises() {
        let ctx = ExecutionContext::default();
        let err = run(
            &ctx,
            json!([{"parallel": [{"echo": 1}, {"assert": "false"}, {"echo": 3}]}]),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EvalError::Step { ref source, .. } if matches!(**source, EvalError::ParallelFailed { index: 1, .. })
        ));
        assert_eq!(err.kind(), "AssertionError");
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let ctx = ExecutionContext::default();
        let value = run(
            &ctx,
            json!([{"parallel": {"failFast": false, "timeout": 20, "actions": [{"sleep": 2000}, {"echo": "fast"}]}}]),
        )
        .await
        .unwrap();
        assert_eq!(value["failed"], json!(1));
        assert_eq!(value["results"][0]["error"], json!("operation timed out after 20ms"));
    }

    #[tokio::test]
    async fn test_writes_stay_in_forks() {
        let ctx = ExecutionContext::default();
        ctx.set_variable("x", json!(0));
        run(&ctx, json!([{"parallel": [{"set": {"x": 1}}, {"set": {"x": 2}}]}]))
            .await
            .unwrap();
        assert_eq!(ctx.get_variable("x"), Some(json!(0)));
    }

    #[tokio::test]
    async fn test_foreach_snapshots_item() {
        let ctx = ExecutionContext::default();
        let value = run(
            &ctx,
            json!([{"parallel": {"forEach": {"item": "n", "index": "i", "in": [10, 20, 30], "do": [
                {"sleep": "{{40 - n}}"},
                {"echo": "{{n}}@{{i}}"}
            ]}}}]),
        )
        .await
        .unwrap();
        let echoed: Vec<Value> = value["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["value"].clone())
            .collect();
        assert_eq!(echoed, vec![json!("10@0"), json!("20@1"), json!("30@2")]);
        assert_eq!(ctx.get_variable("n"), None);
    }

    #[tokio::test]
    async fn test_race_first_success_wins() {
        let ctx = ExecutionContext::default();
        let value = run(
            &ctx,
            json!([{"parallel": {"race": [
                {"assert": "false"},
                {"echo": "slow", "name": "slow"},
                {"echo": "fast"}
            ]}, "returns": "winner"}]),
        )
        .await
        .unwrap();
        assert!(value == json!("slow") || value == json!("fast"));
        assert_eq!(ctx.get_variable("winner"), Some(value));
    }

    #[tokio::test]
    async fn test_race_all_fail() {
        let ctx = ExecutionContext::default();
        let err = run(
            &ctx,
            json!([{"parallel": {"race": {"actions": [{"assert": "false"}, {"sleep": 1000}], "timeout": 10}}}]),
        )
        .await
        .unwrap_err();
        match err.root_cause() {
            EvalError::RaceExhausted { failures } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_batch_reports_failures_without_raising() {
        let ctx = ExecutionContext::default();
        let value = run(
            &ctx,
            json!([{"parallel": {"batch": {"size": 2, "delay": 1, "maxRetries": 1, "retryDelay": 1, "actions": [
                {"echo": "a"},
                {"assert": "false"},
                {"echo": "c"}
            ]}}}]),
        )
        .await
        .unwrap();
        assert_eq!(value["total"], json!(3));
        assert_eq!(value["failed"], json!(1));
        assert_eq!(value["results"][1]["attempts"], json!(2));
        assert_eq!(value["results"][2]["attempts"], json!(1));
    }
}
