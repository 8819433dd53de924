//! Integration tests for the resilience engine
//!
//! Drives `RetryExecutor` end to end: retry budgets, classification,
//! fallbacks, dead letters, events and shared state under concurrency. Tests
//! that depend on delays run on a paused clock.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use rampart_common::resilience::{
    BackoffStrategy, ExecutionError, Fallback, OperationFailure, RetryConfig, RetryEvent,
    RetryExecutor,
};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn fixed_executor(name: &str, attempts: u32) -> RetryExecutor<String, OperationFailure> {
    init_tracing();
    let config = RetryConfig::new(name)
        .max_attempts(attempts)
        .fixed_backoff(Duration::from_millis(10))
        .no_jitter()
        .build()
        .expect("valid config");
    RetryExecutor::new(config).expect("valid executor")
}

fn connection_reset() -> OperationFailure {
    OperationFailure::new("ConnectionError", "socket closed").with_code("ECONNRESET")
}

/// Validates total exhaustion without fallbacks.
///
/// Assertions:
/// - The outcome fails with the original error after exactly 3 attempts.
/// - One dead letter is added and its id is reported on the outcome.
/// - The error-type tally counts the kind 3 times.
#[tokio::test(start_paused = true)]
async fn test_always_failing_operation_is_dead_lettered() {
    let executor = fixed_executor("inventory.sync", 3);

    let outcome = executor.execute(|| async { Err::<String, _>(connection_reset()) }).await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts, 3);
    assert!(!outcome.from_fallback);
    match outcome.error() {
        Some(ExecutionError::Operation(err)) => assert_eq!(err, &connection_reset()),
        other => panic!("expected the original operation error, got {other:?}"),
    }

    let records = executor.dead_letters();
    assert_eq!(records.len(), 1);
    assert_eq!(outcome.dead_letter_id.as_deref(), Some(records[0].id.as_str()));
    assert_eq!(records[0].attempt_count, 3);
    assert_eq!(records[0].error.code.as_deref(), Some("ECONNRESET"));

    let metrics = executor.metrics();
    assert_eq!(metrics.total_attempts, 3);
    assert_eq!(metrics.error_types.get("ConnectionError"), Some(&3));
    assert_eq!(metrics.dead_lettered, 1);
    assert!(metrics.last_failure.is_some());
}

/// Validates a fallback rescues an exhausted operation.
///
/// Assertions:
/// - The fallback value is returned with `from_fallback` set.
/// - Attempts still report the retry-phase count.
/// - No dead letter is created.
#[tokio::test(start_paused = true)]
async fn test_fallback_rescues_exhausted_operation() {
    let executor = fixed_executor("inventory.sync", 3);
    executor.add_fallback(Fallback::new("static-cache", 1, || async {
        Ok::<_, OperationFailure>("fallback-ok".to_string())
    }));

    let outcome = executor.execute(|| async { Err::<String, _>(connection_reset()) }).await;

    assert!(outcome.is_success());
    assert!(outcome.from_fallback);
    assert_eq!(outcome.fallback_used.as_deref(), Some("static-cache"));
    assert_eq!(outcome.value().map(String::as_str), Some("fallback-ok"));
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.dead_letter_id.is_none());
    assert!(executor.dead_letters().is_empty());

    let metrics = executor.metrics();
    assert_eq!(metrics.fallback_usage.get("static-cache"), Some(&1));
    assert_eq!(metrics.completed_operations, 1);
    assert!((metrics.average_attempts - 3.0).abs() < f64::EPSILON);
}

/// Validates success on the second attempt of a five-attempt budget.
#[tokio::test(start_paused = true)]
async fn test_success_on_second_attempt() {
    let executor = fixed_executor("inventory.sync", 5);
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let outcome = executor
        .execute(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call == 1 {
                    Err(connection_reset())
                } else {
                    Ok("synced".to_string())
                }
            }
        })
        .await;

    assert!(outcome.is_success());
    assert!(!outcome.from_fallback);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(executor.metrics().successful_retries, 1);
}

/// Validates a non-retryable error stops the loop after one attempt.
#[tokio::test(start_paused = true)]
async fn test_unauthorized_is_not_retried() {
    let executor = fixed_executor("crm.contacts", 5);
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let outcome = executor
        .execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>(OperationFailure::unauthorized("token expired")) }
        })
        .await;

    assert_eq!(outcome.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(executor.dead_letters().len(), 1);
}

/// Validates fallbacks run in descending priority and skip failed conditions.
///
/// Assertions:
/// - The conditional fallback is never invoked.
/// - Failing fallbacks are attempted in priority order before the winner.
#[tokio::test(start_paused = true)]
async fn test_fallbacks_run_in_priority_order() {
    let executor = fixed_executor("pricing", 1);
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let push = |label: &'static str, succeed: bool| {
        let order = Arc::clone(&order);
        move || {
            order.lock().push(label);
            async move {
                if succeed {
                    Ok(label.to_string())
                } else {
                    Err(OperationFailure::new("FallbackError", label))
                }
            }
        }
    };

    executor.add_fallback(Fallback::new("low", 1, push("low", true)));
    executor.add_fallback(Fallback::new("high", 10, push("high", false)));
    executor.add_fallback(
        Fallback::new("skipped", 20, push("skipped", true)).when(|error| error.is_timeout()),
    );
    executor.add_fallback(Fallback::new("mid", 5, push("mid", false)));

    let outcome = executor.execute(|| async { Err::<String, _>(connection_reset()) }).await;

    assert_eq!(outcome.value().map(String::as_str), Some("low"));
    assert_eq!(*order.lock(), vec!["high", "mid", "low"]);
    assert_eq!(executor.fallback_names(), vec!["skipped", "high", "mid", "low"]);
}

/// Validates exponential delays without jitter.
///
/// With initial 100ms, factor 2 and max 250ms the retry delays are 100, 200
/// and 250 (capped).
#[tokio::test(start_paused = true)]
async fn test_exponential_delays_are_capped() {
    let config = RetryConfig::new("reports")
        .max_attempts(4)
        .exponential_backoff(Duration::from_millis(100), 2.0)
        .max_delay(Duration::from_millis(250))
        .no_jitter()
        .build()
        .expect("valid config");
    let executor: RetryExecutor<(), OperationFailure> = RetryExecutor::new(config).unwrap();
    let mut events = executor.subscribe();

    let started = tokio::time::Instant::now();
    let outcome = executor.execute(|| async { Err(connection_reset()) }).await;

    assert_eq!(outcome.attempts, 4);
    assert_eq!(started.elapsed(), Duration::from_millis(550));

    let mut delays = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RetryEvent::AttemptFailed { next_delay, .. } = event {
            delays.push(next_delay);
        }
    }
    assert_eq!(
        delays,
        vec![
            Some(Duration::from_millis(100)),
            Some(Duration::from_millis(200)),
            Some(Duration::from_millis(250)),
            None,
        ]
    );
}

/// Validates a per-attempt timeout counts as a retryable failure.
#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_retried() {
    let config = RetryConfig::new("slow.api")
        .max_attempts(2)
        .fixed_backoff(Duration::from_millis(5))
        .no_jitter()
        .attempt_timeout(Duration::from_millis(50))
        .build()
        .expect("valid config");
    let executor: RetryExecutor<u32, OperationFailure> = RetryExecutor::new(config).unwrap();

    let outcome = executor
        .execute(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(1)
        })
        .await;

    assert_eq!(outcome.attempts, 2);
    let error = outcome.error().expect("timed out");
    assert!(error.is_timeout());
    assert_eq!(error.to_string(), "Operation timed out after 50ms");
    assert_eq!(executor.metrics().error_types.get("TimeoutError"), Some(&2));
}

/// Validates the event sequence of a fully failed operation.
#[tokio::test(start_paused = true)]
async fn test_event_sequence_for_total_failure() {
    let executor = fixed_executor("ledger", 2);
    executor.add_fallback(Fallback::new("replica", 1, || async {
        Err::<String, _>(OperationFailure::network("replica down"))
    }));
    let mut events = executor.subscribe();

    let outcome = executor.execute(|| async { Err::<String, _>(connection_reset()) }).await;
    let id = outcome.dead_letter_id.clone().expect("dead-lettered");

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.executor(), "ledger");
        if let RetryEvent::DeadLetterAdded { id: added, .. } = &event {
            assert_eq!(added, &id);
        }
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            "operation_start",
            "attempt_failed",
            "attempt_failed",
            "operation_failed",
            "fallback_failed",
            "dead_letter_added",
        ]
    );
}

/// Validates a fallback-rescued call still reports the exhausted retry
/// phase before the fallback result.
///
/// Assertions:
/// - `operation_failed` precedes `fallback_success`.
/// - `failed_retries` matches the one exhausted retry phase.
#[tokio::test(start_paused = true)]
async fn test_event_sequence_for_fallback_rescue() {
    let executor = fixed_executor("quotes", 2);
    executor.add_fallback(Fallback::new("stale-quote", 1, || async { Ok("stale".to_string()) }));
    let mut events = executor.subscribe();

    let outcome = executor.execute(|| async { Err::<String, _>(connection_reset()) }).await;
    assert!(outcome.from_fallback);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RetryEvent::OperationFailed { attempts, .. } = &event {
            assert_eq!(*attempts, 2);
        }
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            "operation_start",
            "attempt_failed",
            "attempt_failed",
            "operation_failed",
            "fallback_success",
        ]
    );
    assert_eq!(executor.metrics().failed_retries, 1);
}

/// Validates replaying a dead letter reuses the retained operation.
///
/// Assertions:
/// - A failed replay keeps the entry and bumps its replay count.
/// - A successful replay removes it without adding a new entry.
#[tokio::test(start_paused = true)]
async fn test_dead_letter_replay() {
    let executor = fixed_executor("billing", 1);
    let healthy = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&healthy);

    let outcome = executor
        .execute_described("charge invoice 42", move || {
            let ok = flag.load(Ordering::SeqCst);
            async move {
                if ok {
                    Ok("charged".to_string())
                } else {
                    Err(connection_reset())
                }
            }
        })
        .await;
    let id = outcome.dead_letter_id.expect("dead-lettered");
    assert_eq!(executor.dead_letter(&id).unwrap().descriptor, "charge invoice 42");

    let replay = executor.replay_dead_letter(&id).await.unwrap();
    assert!(!replay.is_success());
    let record = executor.dead_letter(&id).expect("still queued");
    assert_eq!(record.metadata.replay_count, 1);
    assert_eq!(record.attempt_count, 2);
    assert_eq!(executor.dead_letters().len(), 1);

    healthy.store(true, Ordering::SeqCst);
    let replay = executor.replay_dead_letter(&id).await.unwrap();
    assert_eq!(replay.into_result().unwrap(), "charged");
    assert!(executor.dead_letters().is_empty());

    assert!(executor.replay_dead_letter(&id).await.is_err());
}

/// Validates reset clears metrics but keeps dead letters and fallbacks.
#[tokio::test(start_paused = true)]
async fn test_reset_metrics_keeps_store_and_fallbacks() {
    let executor = fixed_executor("search", 1);
    executor.add_fallback(Fallback::new("empty", 1, || async {
        Err::<String, _>(OperationFailure::network("no index"))
    }));
    executor.execute(|| async { Err::<String, _>(connection_reset()) }).await;

    executor.reset_metrics();

    let metrics = executor.metrics();
    assert_eq!(metrics.total_attempts, 0);
    assert!(metrics.error_types.is_empty());
    assert!(metrics.fallback_usage.is_empty());
    assert_eq!(executor.dead_letters().len(), 1);
    assert_eq!(executor.fallback_names(), vec!["empty"]);
}

/// Validates a custom strategy without a delay function is rejected.
#[test]
fn test_custom_strategy_requires_delay_fn() {
    let result = RetryConfig::new("custom").strategy(BackoffStrategy::Custom).build();
    assert!(result.is_err());

    let config = RetryConfig::new("custom")
        .custom_backoff(|attempt| Duration::from_millis(u64::from(attempt) * 7))
        .no_jitter()
        .build()
        .expect("delay fn supplied");
    assert_eq!(config.delay_for(3).unwrap(), Duration::from_millis(21));
}

/// Validates concurrent callers share metrics without lost updates.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_executions_share_metrics() {
    let config = RetryConfig::new("fanout")
        .max_attempts(2)
        .fixed_backoff(Duration::from_millis(1))
        .no_jitter()
        .build()
        .expect("valid config");
    let executor = Arc::new(RetryExecutor::<u32, OperationFailure>::new(config).unwrap());

    let mut handles = Vec::new();
    for i in 0..50_u32 {
        let executor = Arc::clone(&executor);
        handles.push(tokio::spawn(async move {
            let tries = Arc::new(AtomicU32::new(0));
            executor
                .execute(move || {
                    let attempt = tries.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt == 0 && i % 2 == 0 {
                            Err(connection_reset())
                        } else {
                            Ok(i)
                        }
                    }
                })
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    let metrics = executor.metrics();
    assert_eq!(metrics.completed_operations, 50);
    assert_eq!(metrics.total_attempts, 75);
    assert_eq!(metrics.successful_retries, 25);
    assert!((metrics.average_attempts - 1.5).abs() < 1e-9);
}
