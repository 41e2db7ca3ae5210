//! Integration tests for the resilience layer
//!
//! End-to-end scenarios across retry, batch, circuit breaker, and metrics:
//! the paths a dashboard data hook actually exercises.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ledgerline_resilience::{
    BatchEntry, CircuitBreaker, CircuitBreakerConfig, CircuitState, MetricsRecorder, MockClock,
    Priority, RemoteError, RemoteResult, ResilienceError, RetryConfig, RetryExecutor,
};

fn fast_config(max_retries: u32) -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(max_retries)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(10))
}

/// Validates the documented recovery scenario: fail twice, then succeed.
///
/// A query against a briefly unavailable backend should recover without the
/// caller seeing any of the intermediate failures, and the metrics store
/// should show exactly one recovered sequence.
///
/// # Test Steps
/// 1. Configure retry with max_retries 2 and a short base delay
/// 2. Simulate an operation failing its first 2 attempts with 503
/// 3. Allow success on the 3rd attempt
/// 4. Confirm exactly 3 invocations and the final result returned
/// 5. Confirm one retry-success metric with attempt count 2
#[tokio::test(flavor = "multi_thread")]
async fn test_retry_recovers_after_two_failures() {
    let executor = RetryExecutor::new(MetricsRecorder::new());
    let attempt_count = Arc::new(AtomicU32::new(0));
    let attempt_count_clone = Arc::clone(&attempt_count);

    let config = RetryConfig::default()
        .with_max_retries(2)
        .with_base_delay(Duration::from_millis(2))
        .with_backoff_multiplier(2.0)
        .with_max_delay(Duration::from_millis(100));

    let result = executor
        .with_retry(
            || {
                let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(RemoteError::http(503, "backend warming up"))
                    } else {
                        Ok("client list")
                    }
                }
            },
            &config,
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(result.unwrap_or_default(), "client list");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);

    let snapshot = executor.metrics().snapshot();
    assert_eq!(snapshot.retry_totals.total, 1);
    assert_eq!(snapshot.retry_totals.succeeded, 1);
    assert_eq!(snapshot.retry_ops["unnamed"].attempts, 2);
}

/// Validates exhaustion surfaces the last attempt's failure.
///
/// # Test Steps
/// 1. Configure a budget of 2 retries
/// 2. Simulate persistent 500 failures
/// 3. Confirm 3 invocations and the final error propagated
/// 4. Confirm one retry-failure metric and 3 error-log entries
#[tokio::test(flavor = "multi_thread")]
async fn test_retry_exhaustion_propagates_failure() {
    let executor = RetryExecutor::new(MetricsRecorder::new());
    let attempt_count = Arc::new(AtomicU32::new(0));
    let attempt_count_clone = Arc::clone(&attempt_count);

    let result: RemoteResult<()> = executor
        .with_retry(
            || {
                attempt_count_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::http(500, "persistent failure")) }
            },
            &fast_config(2),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);

    let snapshot = executor.metrics().snapshot();
    assert_eq!(snapshot.retry_totals.failed, 1);
    assert_eq!(snapshot.network_errors.len(), 3);
}

/// Validates priority queries record latency under their operation key.
///
/// # Test Steps
/// 1. Run a high-priority named query that succeeds immediately
/// 2. Run a normal-priority named query that fails once then succeeds
/// 3. Confirm both keys have exactly one latency sample
/// 4. Confirm the intermediate failure was logged under its key
#[tokio::test(flavor = "multi_thread")]
async fn test_query_retry_keys_metrics_by_operation() {
    let executor = RetryExecutor::new(MetricsRecorder::new());

    let result = executor
        .with_query_retry("clients.list", Priority::High, || async { Ok(7u32) })
        .await;
    assert_eq!(result.unwrap_or_default(), 7);

    let flaked = Arc::new(AtomicU32::new(0));
    let flaked_clone = Arc::clone(&flaked);
    let result = executor
        .with_query_retry("invoices.summary", Priority::Normal, || {
            let count = flaked_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count == 0 {
                    Err(RemoteError::network("connection reset"))
                } else {
                    Ok(99u32)
                }
            }
        })
        .await;
    assert_eq!(result.unwrap_or_default(), 99);

    let snapshot = executor.metrics().snapshot();
    assert_eq!(snapshot.latency["clients.list"].len(), 1);
    assert_eq!(snapshot.latency["invoices.summary"].len(), 1);
    assert_eq!(snapshot.network_errors.len(), 1);
    assert_eq!(snapshot.network_errors[0].operation, "invoices.summary");
}

/// Validates batch execution over mixed outcomes.
///
/// One entry exhausts its retries while the rest succeed; the batch must
/// still return one outcome per entry, in input order.
///
/// # Test Steps
/// 1. Build a batch of 4 named entries, the second always failing
/// 2. Run the batch concurrently
/// 3. Confirm 4 outcomes in the original input order
/// 4. Confirm only the failing entry carries an error
#[tokio::test(flavor = "multi_thread")]
async fn test_batch_isolates_one_failing_entry() {
    let executor = RetryExecutor::new(MetricsRecorder::new());

    let entries = vec![
        BatchEntry::new("clients.list", || async { Ok(1u32) }),
        BatchEntry::new("contracts.detail", || async {
            Err(RemoteError::validation("contract id malformed"))
        }),
        BatchEntry::new("invoices.summary", || async { Ok(3u32) }).with_priority(Priority::High),
        BatchEntry::new("tasks.board", || async { Ok(4u32) }).with_priority(Priority::Low),
    ];

    let outcomes = executor.with_batch_retry(entries).await;

    assert_eq!(outcomes.len(), 4);
    let keys: Vec<&str> = outcomes.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["clients.list", "contracts.detail", "invoices.summary", "tasks.board"]);

    assert_eq!(outcomes[0].result.as_ref().copied().unwrap_or_default(), 1);
    assert!(outcomes[1].result.is_err());
    assert_eq!(outcomes[2].result.as_ref().copied().unwrap_or_default(), 3);
    assert_eq!(outcomes[3].result.as_ref().copied().unwrap_or_default(), 4);
}

/// Validates the threshold-2 breaker scenario.
///
/// # Test Steps
/// 1. Build a breaker with failure threshold 2 and a long cooldown
/// 2. Run two failing calls through it
/// 3. Confirm the circuit is open
/// 4. Make a third call and confirm it is rejected without invoking the
///    operation
#[tokio::test(flavor = "multi_thread")]
async fn test_breaker_short_circuits_after_threshold() {
    let metrics = MetricsRecorder::new();
    let config =
        CircuitBreakerConfig::new().with_failure_threshold(2).with_cooldown(Duration::from_secs(60));
    let breaker = CircuitBreaker::with_config(config, metrics.clone())
        .unwrap_or_else(|e| panic!("breaker config should validate: {e}"));

    for _ in 0..2 {
        let result: Result<(), _> =
            breaker.execute(|| async { Err(RemoteError::http(502, "bad gateway")) }).await;
        assert!(result.is_err());
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let invocations = Arc::new(AtomicU32::new(0));
    let invocations_clone = Arc::clone(&invocations);
    let result = breaker
        .execute(|| {
            invocations_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, RemoteError>(()) }
        })
        .await;

    assert!(matches!(result, Err(ResilienceError::CircuitOpen)));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.snapshot().circuit_state, CircuitState::Open);
}

/// Validates breaker recovery through a half-open probe.
///
/// Driven by a mock clock so no real cooldown is waited out.
///
/// # Test Steps
/// 1. Open a threshold-1 breaker with a 60s cooldown
/// 2. Advance the clock past the cooldown
/// 3. Run a succeeding call and confirm it was invoked as a probe
/// 4. Confirm the circuit is closed with zero failures
#[tokio::test(flavor = "multi_thread")]
async fn test_breaker_recovers_via_probe() {
    let clock = MockClock::new();
    let metrics = MetricsRecorder::new();
    let config =
        CircuitBreakerConfig::new().with_failure_threshold(1).with_cooldown(Duration::from_secs(60));
    let breaker = CircuitBreaker::with_clock(config, metrics, clock.clone())
        .unwrap_or_else(|e| panic!("breaker config should validate: {e}"));

    let result: Result<(), _> =
        breaker.execute(|| async { Err(RemoteError::network("unreachable")) }).await;
    assert!(result.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_secs(61));

    let invocations = Arc::new(AtomicU32::new(0));
    let invocations_clone = Arc::clone(&invocations);
    let result = breaker
        .execute(|| {
            invocations_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, RemoteError>("healthy again") }
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failures(), 0);
}

/// Validates resilient composition: the breaker wraps the whole sequence.
///
/// # Test Steps
/// 1. Wire an executor around a threshold-2 breaker
/// 2. Run two resilient calls that each exhaust a 2-retry budget
/// 3. Confirm 6 total invocations (3 per sequence) but only 2 breaker
///    failures, opening the circuit
/// 4. Confirm a third resilient call is rejected before any attempt
#[tokio::test(flavor = "multi_thread")]
async fn test_resilient_retry_opens_breaker_per_sequence() {
    let metrics = MetricsRecorder::new();
    let config =
        CircuitBreakerConfig::new().with_failure_threshold(2).with_cooldown(Duration::from_secs(60));
    let breaker = CircuitBreaker::with_config(config, metrics.clone())
        .unwrap_or_else(|e| panic!("breaker config should validate: {e}"));
    let executor = RetryExecutor::with_circuit_breaker(metrics, breaker);

    let invocations = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        let invocations_clone = Arc::clone(&invocations);
        let result: Result<(), _> = executor
            .with_resilient_retry(
                || {
                    invocations_clone.fetch_add(1, Ordering::SeqCst);
                    async { Err(RemoteError::http(500, "down")) }
                },
                &fast_config(2),
            )
            .await;
        assert!(matches!(result, Err(ResilienceError::Operation(_))));
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 6);
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Open);

    let invocations_clone = Arc::clone(&invocations);
    let result: Result<(), _> = executor
        .with_resilient_retry(
            || {
                invocations_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            &fast_config(2),
        )
        .await;

    assert!(matches!(result, Err(ResilienceError::CircuitOpen)));
    assert_eq!(invocations.load(Ordering::SeqCst), 6);
}

/// Validates the snapshot serializes for dashboard export.
///
/// # Test Steps
/// 1. Record activity across every metrics section
/// 2. Serialize the snapshot to JSON
/// 3. Confirm the sections and the derived hit ratio survive the round trip
#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_serializes_for_export() {
    let executor = RetryExecutor::new(MetricsRecorder::new());
    let metrics = executor.metrics();

    metrics.record_cache_hit("clients.list");
    metrics.record_cache_miss("clients.list", Duration::from_millis(30));

    let result = executor
        .with_query_retry("clients.list", Priority::Normal, || async { Ok(1u32) })
        .await;
    assert!(result.is_ok());

    let snapshot = metrics.snapshot();
    let json = serde_json::to_value(&snapshot)
        .unwrap_or_else(|e| panic!("snapshot should serialize: {e}"));

    assert_eq!(json["cache_hit_ratio"], 0.5);
    assert_eq!(json["cache"]["clients.list"]["hits"], 1);
    assert_eq!(json["circuit_state"], "closed");
    assert_eq!(json["latency"]["clients.list"].as_array().map(Vec::len), Some(1));
}

/// Validates `reset` restores both the metrics store and the breaker.
///
/// # Test Steps
/// 1. Drive failures through a resilient executor until the breaker opens
/// 2. Reset the breaker and the metrics store
/// 3. Confirm the breaker is closed with zero failures
/// 4. Confirm the snapshot is back to its initial empty state
#[tokio::test(flavor = "multi_thread")]
async fn test_reset_restores_initial_state() {
    let metrics = MetricsRecorder::new();
    let config =
        CircuitBreakerConfig::new().with_failure_threshold(1).with_cooldown(Duration::from_secs(60));
    let breaker = CircuitBreaker::with_config(config, metrics.clone())
        .unwrap_or_else(|e| panic!("breaker config should validate: {e}"));
    let executor = RetryExecutor::with_circuit_breaker(metrics.clone(), breaker);

    let result: Result<(), _> = executor
        .with_resilient_retry(
            || async { Err(RemoteError::network("unreachable")) },
            &fast_config(1),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Open);

    executor.circuit_breaker().reset();
    metrics.reset();

    assert_eq!(executor.circuit_breaker().state(), CircuitState::Closed);
    assert_eq!(executor.circuit_breaker().failures(), 0);

    let snapshot = metrics.snapshot();
    assert!(snapshot.network_errors.is_empty());
    assert!(snapshot.retry_ops.is_empty());
    assert_eq!(snapshot.circuit_state, CircuitState::Closed);
    assert!(snapshot.circuit_transitions.is_empty());
}
