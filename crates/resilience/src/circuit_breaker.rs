//! Circuit breaker guarding a remote dependency
//!
//! Counts consecutive failures and, once a threshold is reached, rejects
//! calls outright until a cooldown elapses. A single probe call is then
//! allowed through; its outcome decides whether the circuit closes again or
//! stays open for another cooldown. Transitions are recorded in the
//! [`MetricsRecorder`] the breaker is constructed with.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::constants::{DEFAULT_CIRCUIT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
use crate::error::{ConfigError, ConfigResult, RemoteError, ResilienceError, ResilienceResult};
use crate::metrics::MetricsRecorder;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    #[default]
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing a probe to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time to wait after the last failure before allowing a probe
    pub cooldown: std::time::Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: DEFAULT_FAILURE_THRESHOLD, cooldown: DEFAULT_CIRCUIT_COOLDOWN }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration with the documented defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the consecutive-failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Override the cooldown before a half-open probe
    pub fn with_cooldown(mut self, cooldown: std::time::Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.cooldown.is_zero() {
            return Err(ConfigError::Invalid {
                message: "cooldown must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Stateful guard around a remote dependency
///
/// Cheaply cloneable; clones share the same state, so one breaker can guard
/// every call site that talks to the same dependency. Independent instances
/// can be scoped to different dependencies, each with its own recorder.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<CircuitState>>,
    failures: Arc<AtomicU32>,
    last_failure: Arc<RwLock<Option<Instant>>>,
    metrics: MetricsRecorder,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("failures", &self.failures.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            failures: Arc::clone(&self.failures),
            last_failure: Arc::clone(&self.last_failure),
            metrics: self.metrics.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker with the default configuration and the system clock
    pub fn new(metrics: MetricsRecorder) -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            failures: Arc::new(AtomicU32::new(0)),
            last_failure: Arc::new(RwLock::new(None)),
            metrics,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a breaker with a custom configuration and the system clock
    pub fn with_config(config: CircuitBreakerConfig, metrics: MetricsRecorder) -> ConfigResult<Self> {
        Self::with_clock(config, metrics, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing cooldowns)
    pub fn with_clock(
        config: CircuitBreakerConfig,
        metrics: MetricsRecorder,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            failures: Arc::new(AtomicU32::new(0)),
            last_failure: Arc::new(RwLock::new(None)),
            metrics,
            clock: Arc::new(clock),
        })
    }

    /// Execute an operation under the breaker's protection
    ///
    /// Rejects with [`ResilienceError::CircuitOpen`] without invoking the
    /// operation while the circuit is open and the cooldown has not elapsed.
    /// Otherwise runs the operation and feeds its outcome into the state
    /// machine.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ResilienceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        if !self.can_execute() {
            debug!(state = %self.state(), "circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen);
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(ResilienceError::Operation(error))
            }
        }
    }

    /// Whether a call is currently allowed through
    ///
    /// An open circuit whose cooldown has elapsed transitions to half-open
    /// here, so the caller that observed the expiry proceeds as the probe.
    pub fn can_execute(&self) -> bool {
        match self.read_state() {
            CircuitState::Closed => true,
            // Probes are not serialized: several callers arriving after the
            // cooldown may each attempt one, and the first recorded outcome
            // decides the next transition.
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooldown_elapsed = self.read_last_failure().is_some_and(|failed_at| {
                    self.clock.now().duration_since(failed_at) > self.config.cooldown
                });
                if cooldown_elapsed {
                    self.transition(CircuitState::Open, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        match self.read_state() {
            CircuitState::Closed => {
                self.failures.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                self.failures.store(0, Ordering::Release);
                self.transition(CircuitState::HalfOpen, CircuitState::Closed);
                info!("circuit breaker closed after successful probe");
            }
            CircuitState::Open => {
                warn!("success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        self.write_last_failure(Some(self.clock.now()));

        match self.read_state() {
            CircuitState::Closed => {
                if failures >= self.config.failure_threshold {
                    self.transition(CircuitState::Closed, CircuitState::Open);
                    warn!(failures, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                self.transition(CircuitState::HalfOpen, CircuitState::Open);
                warn!(failures, "circuit breaker reopened after failed probe");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state of the circuit
    pub fn state(&self) -> CircuitState {
        self.read_state()
    }

    /// Current consecutive-failure count
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Force the breaker back to closed, clearing all failure state
    ///
    /// Administrative recovery; bypasses the normal transition rules.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Release);
        self.write_last_failure(None);

        let previous = {
            let mut guard = match self.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    warn!("circuit breaker state lock poisoned during reset");
                    poisoned.into_inner()
                }
            };
            std::mem::replace(&mut *guard, CircuitState::Closed)
        };

        if previous != CircuitState::Closed {
            self.metrics.record_circuit_transition(previous, CircuitState::Closed, 0);
        }
        info!("circuit breaker manually reset to closed state");
    }

    pub(crate) fn clock_handle(&self) -> Arc<C> {
        Arc::clone(&self.clock)
    }

    /// Swap `from` for `to`, recording the transition when it actually
    /// happened. A concurrent transition that got there first wins.
    fn transition(&self, from: CircuitState, to: CircuitState) {
        {
            let mut guard = match self.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    warn!("circuit breaker state lock poisoned during transition");
                    poisoned.into_inner()
                }
            };
            if *guard != from {
                return;
            }
            *guard = to;
        }

        self.metrics.record_circuit_transition(from, to, self.failures.load(Ordering::Acquire));
    }

    fn read_state(&self) -> CircuitState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!("circuit breaker state lock poisoned during read");
                *poisoned.into_inner()
            }
        }
    }

    fn read_last_failure(&self) -> Option<Instant> {
        match self.last_failure.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!("circuit breaker failure-time lock poisoned during read");
                *poisoned.into_inner()
            }
        }
    }

    fn write_last_failure(&self, value: Option<Instant>) {
        match self.last_failure.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => {
                warn!("circuit breaker failure-time lock poisoned during write");
                *poisoned.into_inner() = value;
            }
        }
    }
}
