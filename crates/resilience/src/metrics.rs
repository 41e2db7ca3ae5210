//! Execution metrics for remote operations
//!
//! Every path through the resilience layer reports here: cache accesses from
//! the data hooks, retry outcomes, operation latency, network errors, and
//! circuit-breaker transitions. Recording is fire-and-forget and never
//! surfaces an error to the hot path; the dashboard's diagnostics panel reads
//! point-in-time snapshots instead of live state.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::circuit_breaker::CircuitState;
use crate::clock::{Clock, SystemClock};
use crate::constants::{
    CIRCUIT_TRANSITION_LIMIT, LATENCY_HISTORY_LIMIT, NETWORK_ERROR_LIMIT, SLOW_OPERATION_LIMIT,
    SLOW_OPERATION_THRESHOLD,
};
use crate::error::RemoteError;

/// Cache access statistics for one operation key
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheOpStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Timestamp of the most recent access, milliseconds since epoch
    pub last_access_ms: u64,
    /// Average load duration over misses, in milliseconds
    pub avg_load_time_ms: f64,
}

impl CacheOpStats {
    /// Hit rate for this operation (0.0 when never accessed)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Retry statistics for one operation key
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetryOpStats {
    /// Retries performed across all recorded sequences
    pub attempts: u64,
    /// Sequences that recovered after at least one retry
    pub successes: u64,
    /// Sequences that gave up after at least one retry
    pub failures: u64,
    /// Average wall-clock duration of recorded sequences, in milliseconds
    pub avg_duration_ms: f64,
}

/// Aggregate retry counts across all operations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetryTotals {
    /// Retry sequences recorded
    pub total: u64,
    /// Sequences that ended in success
    pub succeeded: u64,
    /// Sequences that ended in failure
    pub failed: u64,
}

/// One latency sample for an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySample {
    /// Observed duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp of the sample, milliseconds since epoch
    pub recorded_at_ms: u64,
}

/// Operation that exceeded the slow threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowOperation {
    /// Operation key
    pub operation: String,
    /// Observed duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp of the event, milliseconds since epoch
    pub recorded_at_ms: u64,
}

/// Entry in the rolling network-error log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkErrorEvent {
    /// Operation key the failure was reported under
    pub operation: String,
    /// Rendered error message
    pub message: String,
    /// HTTP status, when the failure carried one
    pub status: Option<u16>,
    /// Whether the default classification considers the failure transient
    pub transient: bool,
    /// Timestamp of the event, milliseconds since epoch
    pub recorded_at_ms: u64,
}

/// Entry in the rolling circuit-breaker transition log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitTransition {
    /// State before the transition
    pub from: CircuitState,
    /// State after the transition
    pub to: CircuitState,
    /// Consecutive-failure count at the moment of transition
    pub failures: u32,
    /// Timestamp of the transition, milliseconds since epoch
    pub recorded_at_ms: u64,
}

/// Point-in-time view of everything the recorder has seen
///
/// Serializable for the dashboard's diagnostics export. The cache hit ratio
/// is derived across all operations and reads 0.0 when nothing was accessed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Global cache hit ratio across all operations
    pub cache_hit_ratio: f64,
    /// Per-operation cache statistics
    pub cache: HashMap<String, CacheOpStats>,
    /// Aggregate retry counts
    pub retry_totals: RetryTotals,
    /// Per-operation retry statistics
    pub retry_ops: HashMap<String, RetryOpStats>,
    /// Per-operation latency history, oldest sample first
    pub latency: HashMap<String, Vec<LatencySample>>,
    /// Most recent slow operations, oldest first
    pub slow_operations: Vec<SlowOperation>,
    /// Most recent network errors, oldest first
    pub network_errors: Vec<NetworkErrorEvent>,
    /// Current circuit-breaker state
    pub circuit_state: CircuitState,
    /// Most recent circuit-breaker transitions, oldest first
    pub circuit_transitions: Vec<CircuitTransition>,
}

#[derive(Debug, Default)]
struct MetricsState {
    cache: HashMap<String, CacheOpStats>,
    retry_totals: RetryTotals,
    retry_ops: HashMap<String, RetryOpStats>,
    latency: HashMap<String, VecDeque<LatencySample>>,
    slow_operations: VecDeque<SlowOperation>,
    network_errors: VecDeque<NetworkErrorEvent>,
    circuit_state: CircuitState,
    circuit_transitions: VecDeque<CircuitTransition>,
}

/// Thread-safe metrics recorder shared across the resilience layer
///
/// Explicitly constructed and passed by handle; clones share the same state.
/// All recording methods take `&self` and are safe to call concurrently.
///
/// # Example
/// ```no_run
/// use ledgerline_resilience::metrics::MetricsRecorder;
///
/// let metrics = MetricsRecorder::new();
/// metrics.record_cache_hit("clients.list");
/// let snapshot = metrics.snapshot();
/// println!("hit ratio: {:.2}", snapshot.cache_hit_ratio);
/// ```
pub struct MetricsRecorder {
    state: Arc<Mutex<MetricsState>>,
    clock: Arc<dyn Clock>,
}

impl MetricsRecorder {
    /// Create a recorder with zero initial state and the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a recorder with a custom time source (useful for testing)
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { state: Arc::new(Mutex::new(MetricsState::default())), clock }
    }

    /// Record a cache hit for an operation key
    pub fn record_cache_hit(&self, operation: &str) {
        let now_ms = self.clock.millis_since_epoch();
        let mut guard = self.lock_state();
        let stats = guard.cache.entry(operation.to_string()).or_default();
        stats.hits += 1;
        stats.last_access_ms = now_ms;
    }

    /// Record a cache miss and the load duration it cost
    pub fn record_cache_miss(&self, operation: &str, load_time: Duration) {
        let now_ms = self.clock.millis_since_epoch();
        let mut guard = self.lock_state();
        let stats = guard.cache.entry(operation.to_string()).or_default();
        stats.misses += 1;
        stats.last_access_ms = now_ms;

        // Running average: avg_new = (avg_old * count_old + new_value) / count_new
        let count = stats.misses as f64;
        let load_ms = load_time.as_secs_f64() * 1000.0;
        stats.avg_load_time_ms = ((stats.avg_load_time_ms * (count - 1.0)) + load_ms) / count;
    }

    /// Record a retry sequence that recovered after `attempts` retries
    pub fn record_retry_success(&self, operation: &str, attempts: u32, elapsed: Duration) {
        let mut guard = self.lock_state();
        guard.retry_totals.total += 1;
        guard.retry_totals.succeeded += 1;

        let stats = guard.retry_ops.entry(operation.to_string()).or_default();
        stats.attempts += u64::from(attempts);
        stats.successes += 1;
        update_duration_average(stats, elapsed);
    }

    /// Record a retry sequence that gave up after `attempts` retries
    pub fn record_retry_failure(&self, operation: &str, attempts: u32, elapsed: Duration) {
        let mut guard = self.lock_state();
        guard.retry_totals.total += 1;
        guard.retry_totals.failed += 1;

        let stats = guard.retry_ops.entry(operation.to_string()).or_default();
        stats.attempts += u64::from(attempts);
        stats.failures += 1;
        update_duration_average(stats, elapsed);
    }

    /// Record the wall-clock latency of a completed operation
    ///
    /// Samples above the slow threshold are additionally promoted into the
    /// slow-operation log.
    pub fn record_operation_latency(&self, operation: &str, elapsed: Duration) {
        let now_ms = self.clock.millis_since_epoch();
        let duration_ms = elapsed.as_millis() as u64;
        let mut guard = self.lock_state();

        let history = guard.latency.entry(operation.to_string()).or_default();
        history.push_back(LatencySample { duration_ms, recorded_at_ms: now_ms });
        trim_front(history, LATENCY_HISTORY_LIMIT);

        if elapsed > SLOW_OPERATION_THRESHOLD {
            guard.slow_operations.push_back(SlowOperation {
                operation: operation.to_string(),
                duration_ms,
                recorded_at_ms: now_ms,
            });
            trim_front(&mut guard.slow_operations, SLOW_OPERATION_LIMIT);
        }
    }

    /// Record a failed remote call in the rolling network-error log
    pub fn record_network_error(&self, operation: &str, error: &RemoteError) {
        let event = NetworkErrorEvent {
            operation: operation.to_string(),
            message: error.to_string(),
            status: error.status(),
            transient: error.is_transient(),
            recorded_at_ms: self.clock.millis_since_epoch(),
        };

        let mut guard = self.lock_state();
        guard.network_errors.push_back(event);
        trim_front(&mut guard.network_errors, NETWORK_ERROR_LIMIT);
    }

    /// Record a circuit-breaker state transition
    pub fn record_circuit_transition(&self, from: CircuitState, to: CircuitState, failures: u32) {
        let transition = CircuitTransition {
            from,
            to,
            failures,
            recorded_at_ms: self.clock.millis_since_epoch(),
        };

        let mut guard = self.lock_state();
        guard.circuit_state = to;
        guard.circuit_transitions.push_back(transition);
        trim_front(&mut guard.circuit_transitions, CIRCUIT_TRANSITION_LIMIT);
    }

    /// Consistent point-in-time snapshot of all recorded metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.lock_state();

        let (hits, misses) = guard
            .cache
            .values()
            .fold((0u64, 0u64), |(hits, misses), stats| (hits + stats.hits, misses + stats.misses));
        let accesses = hits + misses;
        let cache_hit_ratio = if accesses == 0 { 0.0 } else { hits as f64 / accesses as f64 };

        MetricsSnapshot {
            cache_hit_ratio,
            cache: guard.cache.clone(),
            retry_totals: guard.retry_totals.clone(),
            retry_ops: guard.retry_ops.clone(),
            latency: guard
                .latency
                .iter()
                .map(|(operation, history)| (operation.clone(), history.iter().cloned().collect()))
                .collect(),
            slow_operations: guard.slow_operations.iter().cloned().collect(),
            network_errors: guard.network_errors.iter().cloned().collect(),
            circuit_state: guard.circuit_state,
            circuit_transitions: guard.circuit_transitions.iter().cloned().collect(),
        }
    }

    /// Reset all metrics to the initial empty state
    ///
    /// Intended for tests and diagnostics, not for steady-state use.
    pub fn reset(&self) {
        let mut guard = self.lock_state();
        *guard = MetricsState::default();
    }

    fn lock_state(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("metrics state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsRecorder {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state), clock: Arc::clone(&self.clock) }
    }
}

impl fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRecorder").field("state", &self.state).finish_non_exhaustive()
    }
}

fn update_duration_average(stats: &mut RetryOpStats, elapsed: Duration) {
    let count = (stats.successes + stats.failures) as f64;
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    stats.avg_duration_ms = ((stats.avg_duration_ms * (count - 1.0)) + elapsed_ms) / count;
}

fn trim_front<T>(history: &mut VecDeque<T>, limit: usize) {
    while history.len() > limit {
        history.pop_front();
    }
}
