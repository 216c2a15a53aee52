mod common;

use common::{engine_with, steps, FlakyHandler, TrackingHandler};
use pretty_assertions::assert_eq;
use scenario_engine::{execute_steps, EvalError};
use serde_json::{json, Value};

fn tracked(count: usize, delay: u64) -> Vec<Value> {
    (0..count)
        .map(|id| json!({"track": {"id": id, "delay": delay}}))
        .collect()
}

#[tokio::test]
async fn test_concurrency_bound() {
    let tracker = TrackingHandler::new();
    let engine = engine_with(tracker.clone());
    let ctx = engine.new_context();

    let value = execute_steps(
        &steps(json!([{"parallel": {"maxConcurrency": 3, "actions": tracked(8, 30)}}])),
        &ctx,
    )
    .await
    .unwrap()
    .into_value();

    assert_eq!(value["succeeded"], json!(8));
    assert!(tracker.peak() <= 3, "peak in flight was {}", tracker.peak());
    assert!(tracker.peak() > 1);
    // admission follows declaration order
    assert_eq!(tracker.started()[..3], [json!(0), json!(1), json!(2)]);
}

#[tokio::test]
async fn test_fail_fast_raises_after_admitted_settle() {
    let tracker = TrackingHandler::new();
    let engine = engine_with(tracker.clone());
    let ctx = engine.new_context();

    let err = execute_steps(
        &steps(json!([{"parallel": [
            {"track": {"id": "a", "delay": 40}},
            {"track": {"id": "b", "delay": 5, "fail": true}},
            {"track": {"id": "c", "delay": 40}}
        ]}])),
        &ctx,
    )
    .await
    .unwrap_err();

    match &err {
        EvalError::Step { source, .. } => {
            assert!(matches!(**source, EvalError::ParallelFailed { index: 1, .. }))
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(err.kind(), "ActionError");
    assert_eq!(tracker.started().len(), 3);
    // the successful operations still reached the result log
    let logged = ctx.results().await;
    assert_eq!(logged.iter().filter(|r| r.kind == "domain" && r.success).count(), 2);
}

#[tokio::test]
async fn test_fail_fast_stops_admission() {
    let tracker = TrackingHandler::new();
    let engine = engine_with(tracker.clone());
    let ctx = engine.new_context();

    let err = execute_steps(
        &steps(json!([{"parallel": {"maxConcurrency": 1, "actions": [
            {"track": {"id": 0, "delay": 5, "fail": true}},
            {"track": {"id": 1}},
            {"track": {"id": 2}}
        ]}}])),
        &ctx,
    )
    .await
    .unwrap_err();

    assert!(matches!(err.root_cause(), EvalError::Action(_)));
    assert_eq!(tracker.started(), vec![json!(0)]);
}

#[tokio::test]
async fn test_batch_retries_until_success() {
    let flaky = FlakyHandler::new(3);
    let engine = engine_with(flaky.clone());
    let ctx = engine.new_context();

    let value = execute_steps(
        &steps(json!([{"parallel": {"batch": {"maxRetries": 2, "retryDelay": 1, "actions": [{"flaky": {}}]}}}])),
        &ctx,
    )
    .await
    .unwrap()
    .into_value();

    assert_eq!(flaky.attempts(), 3);
    assert_eq!(value["succeeded"], json!(1));
    assert_eq!(value["results"][0]["attempts"], json!(3));
    assert_eq!(value["results"][0]["value"], json!(3));
}

#[tokio::test]
async fn test_batch_gives_up_after_max_retries() {
    let flaky = FlakyHandler::new(10);
    let engine = engine_with(flaky.clone());
    let ctx = engine.new_context();

    let value = execute_steps(
        &steps(json!([{"parallel": {"batch": {"maxRetries": 2, "retryDelay": 1, "actions": [{"flaky": {}}]}}}])),
        &ctx,
    )
    .await
    .unwrap()
    .into_value();

    assert_eq!(flaky.attempts(), 3);
    assert_eq!(value["failed"], json!(1));
}

#[tokio::test]
async fn test_batch_counts_panicked_operation() {
    let tracker = TrackingHandler::new();
    let engine = engine_with(tracker.clone());
    let ctx = engine.new_context();

    let value = execute_steps(
        &steps(json!([{"parallel": {"batch": {"maxRetries": 0, "actions": [
            {"track": {"id": "a", "delay": 1}},
            {"track": {"id": "b", "panic": true}},
            {"track": {"id": "c", "delay": 1}}
        ]}}}])),
        &ctx,
    )
    .await
    .unwrap()
    .into_value();

    assert_eq!(value["total"], json!(3));
    assert_eq!(value["succeeded"], json!(2));
    assert_eq!(value["failed"], json!(1));
    assert_eq!(value["results"][1]["index"], json!(1));
    assert_eq!(value["results"][1]["success"], json!(false));
}

#[tokio::test]
async fn test_parallel_foreach_bound() {
    let tracker = TrackingHandler::new();
    let engine = engine_with(tracker.clone());
    let ctx = engine.new_context();

    let value = execute_steps(
        &steps(json!([{"parallel": {"forEach": {"item": "account", "in": ["a", "b", "c", "d"], "maxConcurrency": 2, "do": [
            {"track": {"id": "{{account}}", "delay": 20}}
        ]}}, "returns": "summary"}])),
        &ctx,
    )
    .await
    .unwrap()
    .into_value();

    assert!(tracker.peak() <= 2);
    let ids: Vec<Value> = value["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["value"].clone())
        .collect();
    assert_eq!(ids, vec![json!("a"), json!("b"), json!("c"), json!("d")]);
    assert_eq!(ctx.get_variable("summary"), Some(value));
}
