//! Reconnect delay policy
//!
//! A watcher that loses its container waits before trying to attach again.
//! [`BackoffPolicy::Fixed`] waits the same interval on every attempt, which is
//! the default. [`BackoffPolicy::Exponential`] grows the delay by `factor` per
//! consecutive attempt up to `max`, for deployments where a target may stay
//! absent for a long time.

use std::time::Duration;

use crate::constants::DEFAULT_POLL_INTERVAL_SECS;

/// Delay policy applied when a watcher enters backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffPolicy {
    /// Constant delay regardless of the attempt count
    Fixed { interval: Duration },
    /// `first × factor^(attempt - 1)`, clamped to `max`
    Exponential {
        first: Duration,
        max: Duration,
        factor: f64,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::fixed(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))
    }
}

impl BackoffPolicy {
    pub fn fixed(interval: Duration) -> Self {
        BackoffPolicy::Fixed { interval }
    }

    pub fn exponential(first: Duration, max: Duration, factor: f64) -> Self {
        BackoffPolicy::Exponential { first, max, factor }
    }

    /// Delay before the attach that follows backoff number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            BackoffPolicy::Fixed { interval } => interval,
            BackoffPolicy::Exponential { first, max, factor } => {
                let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let factor = if factor.is_finite() && factor >= 1.0 { factor } else { 1.0 };
                let secs = first.as_secs_f64() * factor.powi(exp);

                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackoffPolicy::Fixed { .. } => "fixed",
            BackoffPolicy::Exponential { .. } => "exponential",
        }
    }
}
