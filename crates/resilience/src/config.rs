//! Retry configuration and urgency presets
//!
//! [`RetryConfig`] is a plain value: callers start from [`Default`] and
//! override the fields they care about. [`Priority`] names the three tuned
//! presets the dashboard's data hooks use, so call sites state urgency
//! instead of repeating numbers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES,
    HIGH_PRIORITY_BASE_DELAY, HIGH_PRIORITY_MAX_DELAY, HIGH_PRIORITY_MAX_RETRIES,
    LOW_PRIORITY_BASE_DELAY, LOW_PRIORITY_MAX_DELAY, LOW_PRIORITY_MAX_RETRIES,
    NORMAL_PRIORITY_BASE_DELAY, NORMAL_PRIORITY_MAX_DELAY, NORMAL_PRIORITY_MAX_RETRIES,
};
use crate::error::RemoteError;

/// Decision function consulted before each retry
///
/// Receives the failure and the zero-based index of the attempt that just
/// failed. Returning `false` stops the retry sequence immediately.
pub type RetryPredicate = Arc<dyn Fn(&RemoteError, u32) -> bool + Send + Sync>;

/// Default retry classification: retry exactly the transient failures
pub fn default_should_retry(error: &RemoteError, _attempt: u32) -> bool {
    error.is_transient()
}

/// Configuration for a retry sequence
///
/// `max_retries` counts retries after the initial attempt, so a value of 3
/// allows up to 4 invocations. The delay for retry `n` is
/// `min(base_delay * multiplier^n + jitter, max_delay)`.
#[derive(Clone)]
pub struct RetryConfig {
    /// Retries allowed after the initial attempt
    pub max_retries: u32,
    /// Base delay before the first retry
    pub base_delay: Duration,
    /// Ceiling applied to every computed delay, jitter included
    pub max_delay: Duration,
    /// Exponential growth factor between consecutive delays
    pub backoff_multiplier: f64,
    /// Predicate deciding whether a given failure is retried
    pub should_retry: RetryPredicate,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            should_retry: Arc::new(default_should_retry),
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl RetryConfig {
    /// Create a configuration with the documented defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the base delay
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Override the delay ceiling
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Override the exponential growth factor
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Override the retry predicate
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RemoteError, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }
}

/// Urgency of a query, mapping to a tuned retry preset
///
/// Urgent data (the numbers a user is staring at) retries sooner and gives
/// up against a lower ceiling so failures surface fast; background data
/// waits longer between fewer attempts to stay out of the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// User-blocking data: 4 retries, 500ms base, 10s ceiling
    High,
    /// Standard dashboard queries: 3 retries, 1s base, 20s ceiling
    #[default]
    Normal,
    /// Background refreshes: 2 retries, 2s base, 30s ceiling
    Low,
}

impl Priority {
    /// Resolve the preset retry configuration for this urgency
    pub fn retry_config(self) -> RetryConfig {
        match self {
            Self::High => RetryConfig::default()
                .with_max_retries(HIGH_PRIORITY_MAX_RETRIES)
                .with_base_delay(HIGH_PRIORITY_BASE_DELAY)
                .with_max_delay(HIGH_PRIORITY_MAX_DELAY),
            Self::Normal => RetryConfig::default()
                .with_max_retries(NORMAL_PRIORITY_MAX_RETRIES)
                .with_base_delay(NORMAL_PRIORITY_BASE_DELAY)
                .with_max_delay(NORMAL_PRIORITY_MAX_DELAY),
            Self::Low => RetryConfig::default()
                .with_max_retries(LOW_PRIORITY_MAX_RETRIES)
                .with_base_delay(LOW_PRIORITY_BASE_DELAY)
                .with_max_delay(LOW_PRIORITY_MAX_DELAY),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}
