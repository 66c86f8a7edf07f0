//! Retry backoff computation
//!
//! Delay schedules for per-resource propagation policies. Jitter for the
//! random strategy is derived deterministically from the attempt counter so
//! that schedules are reproducible.

use std::time::Duration;

use crate::resource::{BackoffStrategy, PropagationPolicy};

/// The delay to wait after the given failed attempt (1-based) before the
/// next one.
pub fn backoff_delay(policy: &PropagationPolicy, attempt: u32) -> Duration {
    let initial = policy.initial_interval_ms.max(1);

    let millis = match policy.backoff_strategy {
        BackoffStrategy::Fixed => initial,
        BackoffStrategy::Exponential => scaled(initial, policy.multiplier, attempt),
        BackoffStrategy::Random => {
            let base = scaled(initial, policy.multiplier, attempt);
            // Spread the delay over [base, 2*base) using the attempt counter,
            // keeping concurrent retries from lining up.
            base + base * u64::from(attempt % 7) / 7
        }
    };

    let capped = match policy.max_interval_ms {
        Some(max) => millis.min(max),
        None => millis,
    };

    Duration::from_millis(capped)
}

fn scaled(initial: u64, multiplier: f64, attempt: u32) -> u64 {
    let factor = multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
    let millis = (initial as f64) * factor;
    if millis >= u64::MAX as f64 {
        u64::MAX
    } else {
        millis as u64
    }
}
