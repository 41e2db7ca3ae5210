//! Resilient execution of remote operations for the Ledgerline dashboard.
//!
//! Every remote call the dashboard makes — data hooks querying the backend,
//! serverless callers reaching third-party services — goes through this
//! crate. It wraps arbitrary zero-argument async operations with exponential
//! backoff retry, priority-tuned retry budgets, a circuit breaker for
//! presumed-unhealthy dependencies, and a metrics store observing all of the
//! above. The layer knows nothing about the operations' business meaning:
//! results and failures pass through with their identity intact.
//!
//! # Usage
//!
//! ```no_run
//! use ledgerline_resilience::{MetricsRecorder, Priority, RemoteError, RetryExecutor};
//!
//! # async fn example() -> Result<(), RemoteError> {
//! let executor = RetryExecutor::new(MetricsRecorder::new());
//!
//! let invoices = executor
//!     .with_query_retry("invoices.summary", Priority::High, || async {
//!         // one remote call
//!         Ok::<_, RemoteError>(vec![1u64, 2, 3])
//!     })
//!     .await?;
//! # let _ = invoices;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod metrics;

// Re-export commonly used types for convenience
pub use backoff::{delay_for_attempt, exponential_delay};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{default_should_retry, Priority, RetryConfig, RetryPredicate};
pub use error::{
    ConfigError, ConfigResult, RemoteError, RemoteResult, ResilienceError, ResilienceResult,
};
pub use executor::{BatchEntry, BatchOutcome, RetryExecutor};
pub use metrics::{MetricsRecorder, MetricsSnapshot};
