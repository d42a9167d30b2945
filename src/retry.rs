//! Exponential backoff with jitter.

use rand::prelude::*;
use std::time::Duration;

use crate::config::RetryPolicy;

/// Computes retry delays for a [`RetryPolicy`].
///
/// Backoff formula: `initial * multiplier^(retry - 1)`, capped at
/// `max_backoff`, then spread by `+/- jitter` of the capped delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            initial: policy.initial_backoff(),
            max: policy.max_backoff(),
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max.as_nanos() as f64 {
            return self.max;
        }
        Duration::from_nanos(scaled.round() as u64)
    }

    /// Delay before retry number `retry` (1-based), with jitter applied.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let base_ns = base.as_nanos() as f64;
        let spread = base_ns * self.jitter;
        let offset = rand::rng().random_range(-spread..=spread);
        Duration::from_nanos((base_ns + offset).max(0.0).round() as u64)
    }

    /// Sum of the unjittered delays for the first `retries` retries.
    pub fn schedule_total(&self, retries: u32) -> Duration {
        (1..=retries).map(|retry| self.base_delay(retry)).sum()
    }
}
