//! Error types for the resilience layer
//!
//! Remote failures arrive as [`RemoteError`], a closed set of tagged variants
//! produced where Ledgerline talks to the outside world (data hooks and the
//! serverless API callers). Retry decisions match on the variant, never on
//! message text. [`ResilienceError`] is the outward-facing failure for
//! circuit-breaker composed calls and keeps the original error reachable.

use std::time::Duration;

use thiserror::Error;

/// Result type for remote operations run through the layer
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for circuit-breaker composed operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Simple configuration error for validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Failure reported by a remote operation
///
/// The variant set is closed on purpose: every failure a data hook or API
/// caller can surface maps onto exactly one tag, and the default retry
/// classification reads the tag instead of sniffing message strings.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Socket-level connectivity failure (refused, reset, DNS)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Upstream returned a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Upstream signalled explicit rate limiting
    #[error("Rate limited by upstream service")]
    RateLimited { retry_after: Option<Duration> },

    /// Caller-enforced deadline expired
    #[error("Operation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Request rejected before leaving the client
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Unexpected fault with no remote cause
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RemoteError {
    /// Create a network connectivity error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network { message: message.into() }
    }

    /// Create an HTTP status error
    pub fn http<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Http { status, message: message.into() }
    }

    /// Create a rate-limit error, optionally carrying the upstream hint
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Create a timeout error
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether the failure is worth retrying under the default policy
    ///
    /// Network faults, timeouts, and rate limiting are always transient;
    /// HTTP failures are transient for 429 and the 5xx range. Validation and
    /// internal faults never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Validation { .. } | Self::Internal { .. } => false,
        }
    }

    /// HTTP status associated with the failure, when one exists
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Upstream-provided retry hint, when one exists
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors surfaced by circuit-breaker composed operations
///
/// `CircuitOpen` means the operation was never invoked; `Operation` wraps a
/// terminal [`RemoteError`] with its identity intact so callers can keep
/// matching on the original variant.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Circuit breaker is open, rejecting calls
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// The underlying operation failed after exhausting its retries
    #[error(transparent)]
    Operation(#[from] RemoteError),
}
