//! End-to-end tests exercising the engine, middleware chain, retry
//! middleware, and recorders together.

use crate::middleware::{ResultBucketMiddleware, RetryMiddleware, RetryPolicy, SnapshotMiddleware};
use crate::pipeline::{Pipeline, RunOptions};
use crate::steps::FnStep;
use crate::testing::{FailingStep, FlakyStep, RecordingSleeper};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn retry_with_sleeper(
    max_retries: usize,
    initial_delay_ms: u64,
    backoff_factor: f64,
    sleeper: &RecordingSleeper,
) -> Arc<RetryMiddleware> {
    let policy = RetryPolicy::new()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(initial_delay_ms))
        .with_backoff_factor(backoff_factor);
    Arc::new(
        RetryMiddleware::new(policy)
            .unwrap()
            .with_sleeper(Arc::new(sleeper.clone())),
    )
}

#[tokio::test]
async fn test_flaky_steps_recover_under_retry() {
    // Both steps fail their first invocation (the engine's), then succeed
    // on the retry middleware's first attempt, so no backoff waits occur.
    let first = Arc::new(FlakyStep::new(1, "first hiccup", |v| {
        json!(v.as_i64().unwrap_or(0) + 1)
    }));
    let second = Arc::new(FlakyStep::new(1, "second hiccup", |v| {
        json!(v.as_i64().unwrap_or(0) + 1)
    }));

    let pipeline = Pipeline::builder()
        .step_arc("add_one", first.clone())
        .step_arc("add_one", second.clone())
        .build();

    let sleeper = RecordingSleeper::new();
    let options = RunOptions::new().with_middleware(retry_with_sleeper(3, 10, 2.0, &sleeper));

    let output = pipeline.run(json!(5), options).await.unwrap();

    assert_eq!(output.result, json!(7));
    assert_eq!(output.context.results(), vec![json!(6), json!(7)]);
    assert!(output.context.succeeded());
    assert!(sleeper.delays().is_empty());
    // Engine call plus one in-middleware attempt, per step.
    assert_eq!(first.calls(), 2);
    assert_eq!(second.calls(), 2);
}

#[tokio::test]
async fn test_always_failing_step_aborts_with_original_error() {
    let step = Arc::new(FailingStep::new("database unreachable"));
    let pipeline = Pipeline::builder().step_arc("load", step.clone()).build();

    let sleeper = RecordingSleeper::new();
    let options = RunOptions::new().with_middleware(retry_with_sleeper(3, 10, 2.0, &sleeper));

    let err = pipeline.run(json!(5), options).await.unwrap_err();

    assert_eq!(err.to_string(), "database unreachable");
    // Engine call plus the full retry budget.
    assert_eq!(step.calls(), 4);
    // maxRetries = 3 means two waits: 10ms, then 20ms.
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(10), Duration::from_millis(20)]
    );
}

#[tokio::test]
async fn test_failed_run_commits_nothing() {
    let pipeline = Pipeline::builder()
        .step("load", FailingStep::new("nope"))
        .build();

    let sleeper = RecordingSleeper::new();
    let snapshots = SnapshotMiddleware::new();
    let options = RunOptions::new()
        .with_middleware(retry_with_sleeper(2, 10, 2.0, &sleeper))
        .with_middleware(Arc::new(snapshots.clone()));

    assert!(pipeline.run(json!(5), options).await.is_err());
    // The retry middleware raised before the snapshot middleware ran, and
    // nothing was committed.
    assert!(snapshots.history().is_empty());
}

#[tokio::test]
async fn test_retry_backoff_sequence_until_success() {
    // Fails the engine call and three in-middleware attempts, succeeds on
    // the fourth: delays follow initial * factor^n with no trailing wait.
    let step = Arc::new(FlakyStep::new(4, "warming up", |v| v));
    let pipeline = Pipeline::builder().step_arc("warm", step.clone()).build();

    let sleeper = RecordingSleeper::new();
    let options = RunOptions::new().with_middleware(retry_with_sleeper(5, 10, 2.0, &sleeper));

    let output = pipeline.run(json!("ready"), options).await.unwrap();

    assert_eq!(output.result, json!("ready"));
    assert_eq!(
        sleeper.delays(),
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(40),
        ]
    );
    assert_eq!(step.calls(), 5);
}

#[tokio::test]
async fn test_recorders_observe_recovered_results() {
    let flaky = Arc::new(FlakyStep::new(1, "hiccup", |v| {
        json!(v.as_i64().unwrap_or(0) + 10)
    }));
    let pipeline = Pipeline::builder()
        .step(
            "double",
            FnStep::from_sync(|v, _| Ok(json!(v.as_i64().unwrap_or(0) * 2))),
        )
        .step_arc("add_ten", flaky)
        .build();

    let sleeper = RecordingSleeper::new();
    let buckets = ResultBucketMiddleware::new();
    let snapshots = SnapshotMiddleware::new();
    let options = RunOptions::new()
        .with_middleware(retry_with_sleeper(3, 10, 2.0, &sleeper))
        .with_middleware(Arc::new(buckets.clone()))
        .with_middleware(Arc::new(snapshots.clone()));

    let output = pipeline.run(json!(3), options).await.unwrap();

    assert_eq!(output.result, json!(16));
    assert_eq!(buckets.bucket("0:double"), Some(vec![json!(6)]));
    assert_eq!(buckets.bucket("1:add_ten"), Some(vec![json!(16)]));

    let history = snapshots.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|s| s.success));
    // Snapshots run before the engine commits, so the second snapshot sees
    // only the first committed result.
    assert_eq!(history[1].results, vec![json!(6)]);
}

#[tokio::test]
async fn test_positional_lookups_across_a_run() {
    let pipeline = Pipeline::builder()
        .step("a", FnStep::from_sync(|v, _| Ok(json!(v.as_i64().unwrap_or(0) + 1))))
        .step("b", FnStep::from_sync(|v, _| Ok(json!(v.as_i64().unwrap_or(0) + 1))))
        .step(
            "sum_first_and_last",
            FnStep::from_sync(|_, ctx| {
                let first = ctx.first(0).and_then(|v| v.as_i64()).unwrap_or(0);
                let last = ctx.previous(1).and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(first + last))
            }),
        )
        .build();

    let output = pipeline.run(json!(0), RunOptions::default()).await.unwrap();

    // first committed = 1, latest committed = 2
    assert_eq!(output.result, json!(3));
    assert_eq!(output.context.previous(1), Some(json!(3)));
    assert_eq!(output.context.previous(3), Some(json!(1)));
    assert_eq!(output.context.first(0), Some(json!(1)));
    assert_eq!(output.context.initial(), &json!(0));
}

#[tokio::test]
async fn test_runs_are_idempotent() {
    let build = || {
        Pipeline::builder()
            .step("add", FnStep::from_sync(|v, _| Ok(json!(v.as_i64().unwrap_or(0) + 2))))
            .step("mul", FnStep::from_sync(|v, _| Ok(json!(v.as_i64().unwrap_or(0) * 3))))
            .build()
    };

    let first = build().run(json!(5), RunOptions::default()).await.unwrap();
    let second = build().run(json!(5), RunOptions::default()).await.unwrap();

    assert_eq!(first.result, second.result);
    assert_eq!(first.context.results(), second.context.results());
}
