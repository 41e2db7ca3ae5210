// Tunable defaults for the resilience layer
use std::time::Duration;

/// Default number of retries after the initial attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default ceiling applied to the computed delay, jitter included
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default exponential backoff multiplier
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Jitter factor: delays gain a uniform random 0..30% of the exponential term
pub const JITTER_FACTOR: f64 = 0.3;

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Operation key used when the caller did not name the operation
pub const UNNAMED_OPERATION: &str = "unnamed";

/// Circuit breaker: consecutive failures required to open the circuit
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Circuit breaker: cooldown before an open circuit allows a half-open probe
pub const DEFAULT_CIRCUIT_COOLDOWN: Duration = Duration::from_millis(60_000);

/// High priority preset: retries after the initial attempt
pub const HIGH_PRIORITY_MAX_RETRIES: u32 = 4;

/// High priority preset: base delay
pub const HIGH_PRIORITY_BASE_DELAY: Duration = Duration::from_millis(500);

/// High priority preset: delay ceiling
pub const HIGH_PRIORITY_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Normal priority preset: retries after the initial attempt
pub const NORMAL_PRIORITY_MAX_RETRIES: u32 = 3;

/// Normal priority preset: base delay
pub const NORMAL_PRIORITY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Normal priority preset: delay ceiling
pub const NORMAL_PRIORITY_MAX_DELAY: Duration = Duration::from_millis(20_000);

/// Low priority preset: retries after the initial attempt
pub const LOW_PRIORITY_MAX_RETRIES: u32 = 2;

/// Low priority preset: base delay
pub const LOW_PRIORITY_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Low priority preset: delay ceiling
pub const LOW_PRIORITY_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Latency above this duration is promoted into the slow-operation log
pub const SLOW_OPERATION_THRESHOLD: Duration = Duration::from_millis(2000);

/// Latency samples retained per operation
pub const LATENCY_HISTORY_LIMIT: usize = 20;

/// Slow-operation entries retained across all operations
pub const SLOW_OPERATION_LIMIT: usize = 50;

/// Network-error entries retained across all operations
pub const NETWORK_ERROR_LIMIT: usize = 100;

/// Circuit-breaker transition entries retained
pub const CIRCUIT_TRANSITION_LIMIT: usize = 50;
