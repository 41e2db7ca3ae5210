//! Retry execution for remote operations
//!
//! [`RetryExecutor`] is the layer's entry point: data hooks and serverless
//! callers hand it a zero-argument async operation and get the operation's
//! result back, with transient failures retried under exponential backoff.
//! Named queries go through [`RetryExecutor::with_query_retry`] so their
//! latency and failures land in the metrics store under a stable key; batches
//! of independent queries run concurrently with per-entry fault isolation;
//! [`RetryExecutor::with_resilient_retry`] adds the circuit breaker around
//! the whole retry sequence.

use std::future::Future;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{debug, instrument, warn};

use crate::backoff::delay_for_attempt;
use crate::circuit_breaker::CircuitBreaker;
use crate::clock::{Clock, SystemClock};
use crate::config::{Priority, RetryConfig};
use crate::constants::UNNAMED_OPERATION;
use crate::error::{RemoteResult, ResilienceResult};
use crate::metrics::MetricsRecorder;

/// Boxed operation factory carried by a [`BatchEntry`]
type BatchOperation<T> = Box<dyn FnMut() -> BoxFuture<'static, RemoteResult<T>> + Send>;

/// One named operation in a batch
pub struct BatchEntry<T> {
    key: String,
    priority: Priority,
    operation: BatchOperation<T>,
}

impl<T> BatchEntry<T> {
    /// Create an entry with normal priority
    pub fn new<S, F, Fut>(key: S, mut operation: F) -> Self
    where
        S: Into<String>,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = RemoteResult<T>> + Send + 'static,
    {
        Self {
            key: key.into(),
            priority: Priority::default(),
            operation: Box::new(move || operation().boxed()),
        }
    }

    /// Override the entry's priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl<T> std::fmt::Debug for BatchEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEntry")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Per-entry outcome of a batch execution
///
/// The batch itself never fails; every input entry yields exactly one
/// outcome, in input order, carrying that entry's success or failure.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Operation key the entry was submitted under
    pub key: String,
    /// The entry's result after its own retry sequence
    pub result: RemoteResult<T>,
}

/// Executor running remote operations with retry, metrics, and breaker
///
/// Explicitly constructed and passed by reference; holds the metrics
/// recorder every outcome is reported to and the circuit breaker used by
/// [`Self::with_resilient_retry`]. Independent executors give
/// dependency-scoped breakers.
#[derive(Debug, Clone)]
pub struct RetryExecutor<C: Clock = SystemClock> {
    metrics: MetricsRecorder,
    breaker: CircuitBreaker<C>,
    clock: std::sync::Arc<C>,
}

impl RetryExecutor<SystemClock> {
    /// Create an executor with a default-configuration circuit breaker
    ///
    /// The breaker records its transitions into the same `metrics`.
    pub fn new(metrics: MetricsRecorder) -> Self {
        let breaker = CircuitBreaker::new(metrics.clone());
        Self::with_circuit_breaker(metrics, breaker)
    }
}

impl<C: Clock> RetryExecutor<C> {
    /// Create an executor around an existing circuit breaker
    pub fn with_circuit_breaker(metrics: MetricsRecorder, breaker: CircuitBreaker<C>) -> Self {
        let clock = breaker.clock_handle();
        Self { metrics, breaker, clock }
    }

    /// The metrics recorder this executor reports into
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// The circuit breaker guarding resilient calls
    pub fn circuit_breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    /// Run an operation with backoff retry under the given configuration
    ///
    /// Attempts are strictly sequential: the next one starts only after the
    /// previous failure and its backoff delay. The failure from the last
    /// attempt is returned unchanged; earlier failures are discarded. A
    /// `max_retries` of 0 degrades to a single attempt with no sleeps.
    #[instrument(skip(self, operation, config))]
    pub async fn with_retry<F, Fut, T>(
        &self,
        mut operation: F,
        config: &RetryConfig,
    ) -> RemoteResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        self.retry_keyed(UNNAMED_OPERATION, &mut operation, config).await
    }

    /// Run a named operation with the preset for its priority
    ///
    /// On success the total wall-clock time, retries included, is recorded
    /// against `key` in the latency history. Terminal failures propagate
    /// unchanged; each failure along the way is already in the network-error
    /// log under `key`.
    #[instrument(skip(self, operation), fields(operation = key, priority = %priority))]
    pub async fn with_query_retry<F, Fut, T>(
        &self,
        key: &str,
        priority: Priority,
        mut operation: F,
    ) -> RemoteResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let config = priority.retry_config();
        let started = self.clock.now();

        let result = self.retry_keyed(key, &mut operation, &config).await;
        if result.is_ok() {
            self.metrics.record_operation_latency(key, self.clock.now().duration_since(started));
        }
        result
    }

    /// Run a batch of named operations concurrently
    ///
    /// Every entry runs its own retry sequence through the query path; one
    /// entry's exhaustion never cancels or delays its siblings. The output
    /// preserves input order regardless of completion order and always has
    /// one outcome per entry.
    #[instrument(skip(self, entries), fields(batch_size = entries.len()))]
    pub async fn with_batch_retry<T>(&self, entries: Vec<BatchEntry<T>>) -> Vec<BatchOutcome<T>>
    where
        T: Send,
    {
        let tasks = entries.into_iter().map(|entry| {
            let BatchEntry { key, priority, operation } = entry;
            async move {
                let result = self.with_query_retry(&key, priority, operation).await;
                BatchOutcome { key, result }
            }
        });

        join_all(tasks).await
    }

    /// Run the whole retry sequence as one unit of work under the breaker
    ///
    /// An open breaker rejects before the first attempt runs; an exhausted
    /// retry sequence counts as a single breaker failure, a recovered one as
    /// a single success.
    #[instrument(skip(self, operation, config), fields(state = %self.breaker.state()))]
    pub async fn with_resilient_retry<F, Fut, T>(
        &self,
        operation: F,
        config: &RetryConfig,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        self.breaker.execute(|| self.with_retry(operation, config)).await
    }

    async fn retry_keyed<F, Fut, T>(
        &self,
        key: &str,
        operation: &mut F,
        config: &RetryConfig,
    ) -> RemoteResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let started = self.clock.now();
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        let elapsed = self.clock.now().duration_since(started);
                        self.metrics.record_retry_success(key, attempt, elapsed);
                        debug!(operation = key, attempts = attempt, "operation recovered after retries");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    // Every failure lands in the rolling error log, including
                    // ones the predicate refuses to retry.
                    self.metrics.record_network_error(key, &error);

                    let retryable =
                        attempt < config.max_retries && (config.should_retry)(&error, attempt);
                    if !retryable {
                        if attempt > 0 {
                            let elapsed = self.clock.now().duration_since(started);
                            self.metrics.record_retry_failure(key, attempt, elapsed);
                        }
                        warn!(
                            operation = key,
                            attempts = attempt + 1,
                            error = %error,
                            "operation failed terminally"
                        );
                        return Err(error);
                    }

                    let delay = delay_for_attempt(attempt, config);
                    debug!(
                        operation = key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
