// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry with exponential backoff and jitter.
//!
//! The policy owns its PRNG so the jitter stream is deterministic under a
//! configured seed; tests pin the seed and assert exact schedules.

use crate::spec::RetryConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::Duration;

/// Decides whether and when a failed attempt is retried.
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: f64,
    max_delay: f64,
    jitter: f64,
    retryable_exit_codes: HashSet<i32>,
    rng: StdRng,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay_seconds.max(0.0),
            max_delay: config.max_delay_seconds.max(0.0),
            jitter: config.jitter_seconds.max(0.0),
            retryable_exit_codes: config.retryable_exit_codes.iter().copied().collect(),
            rng,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the given failed attempt (1-based) should be retried.
    ///
    /// With an empty retryable set, any non-zero exit is retryable. With a
    /// configured set, only listed codes are; an attempt that produced no
    /// exit code at all (killed, timed out) only retries under the empty-set
    /// default.
    pub fn should_retry(&self, attempt: u32, exit_code: Option<i32>) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match exit_code {
            Some(0) => false,
            Some(code) => {
                self.retryable_exit_codes.is_empty()
                    || self.retryable_exit_codes.contains(&code)
            }
            None => self.retryable_exit_codes.is_empty(),
        }
    }

    /// Backoff before the attempt after `attempt` (1-based):
    /// `min(maxDelay, baseDelay · 2^(attempt-1)) + uniform(0, jitter)`.
    pub fn delay_for(&mut self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let backoff = self.base_delay * 2f64.powi(exponent);
        let mut delay = backoff.min(self.max_delay);
        if self.jitter > 0.0 {
            delay += self.rng.random_range(0.0..self.jitter);
        }
        Duration::from_secs_f64(delay.max(0.0))
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
