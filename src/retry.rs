//! Bounded retries with linear backoff.
//!
//! Used by batch import (transient database errors) and by the rewrite
//! assistant (text service failures). The delay before attempt `n + 1` is
//! `base_delay * n`. Scheduling and sleeping are left to `backon`;
//! [`RetryPolicy`] is the backoff builder.

use std::cell::Cell;
use std::fmt::Display;
use std::thread;
use std::time::Duration;

use backon::{BackoffBuilder, BlockingRetryable};
use tracing::warn;

/// Retry bound and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; zero is treated as one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. `op` receives the 1-based attempt number.
    ///
    /// Returns the last error on failure.
    pub fn run<T, E, F, R>(&self, label: &str, mut op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let attempt = Cell::new(0);
        let max_attempts = self.max_attempts;
        (|| {
            attempt.set(attempt.get() + 1);
            op(attempt.get())
        })
        .retry(*self)
        .sleep(thread::sleep)
        .when(retryable)
        .notify(|err: &E, delay: Duration| {
            warn!(
                operation = label,
                attempt = attempt.get(),
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying"
            );
        })
        .call()
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = LinearBackoff;

    fn build(self) -> LinearBackoff {
        LinearBackoff {
            policy: self,
            failed: 0,
        }
    }
}

/// Delays `base, 2 * base, ...`, one per allowed retry.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    policy: RetryPolicy,
    failed: u32,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.failed + 1 >= self.policy.max_attempts {
            return None;
        }
        self.failed += 1;
        Some(self.policy.delay_after(self.failed))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}
