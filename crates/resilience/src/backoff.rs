//! Backoff delay computation
//!
//! Pure functions over a [`RetryConfig`]: an exponential curve, a uniform
//! additive jitter of up to 30% of the exponential term, and a hard ceiling
//! applied after jitter. Jitter is never subtracted, so the computed delay
//! never undershoots the exponential curve (until the ceiling flattens it).

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::constants::{JITTER_FACTOR, MAX_BACKOFF_EXPONENT};

/// Exponential delay for a zero-based attempt index, without jitter
///
/// Computes `base_delay * backoff_multiplier^attempt` in millisecond
/// precision. The exponent is capped to keep the arithmetic finite for
/// adversarial attempt counts; the cast saturates instead of wrapping.
pub fn exponential_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_millis = config.base_delay.as_millis() as f64;

    // Cap exponent to prevent overflow
    let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
    let delay_millis = base_millis * config.backoff_multiplier.powi(exponent as i32);

    Duration::from_millis(delay_millis as u64)
}

/// Delay to sleep before the retry following a zero-based attempt index
///
/// `min(exponential + jitter, max_delay)`, where jitter is drawn uniformly
/// from `[0, 0.3 * exponential)`. The ceiling is applied after jitter, so a
/// saturated curve yields exactly `max_delay`.
pub fn delay_for_attempt(attempt: u32, config: &RetryConfig) -> Duration {
    let exponential = exponential_delay(attempt, config);
    apply_jitter(exponential).min(config.max_delay)
}

/// Add random jitter to prevent thundering herd
fn apply_jitter(delay: Duration) -> Duration {
    let delay_millis = delay.as_millis() as f64;
    if delay_millis == 0.0 {
        return delay;
    }

    let mut rng = rand::thread_rng();
    let jitter = rng.gen_range(0.0..JITTER_FACTOR) * delay_millis;

    Duration::from_millis((delay_millis + jitter) as u64)
}
