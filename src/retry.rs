//! Bounded retry with exponential backoff, shared by source fetching and
//! proxy validation.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of attempts per operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default exponential backoff base
pub const DEFAULT_BACKOFF_BASE: u32 = 2;

/// Default unit the backoff power is multiplied by
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Retry policy: how many attempts, and how long to wait between them.
///
/// The wait after failed attempt `n` (1-based) is `backoff_unit * backoff_base^n`,
/// so the defaults give 2s then 4s. Nothing is slept after the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: u32,
    pub backoff_unit: Duration,
    /// Log failed attempts at warn instead of debug
    pub warn_on_failure: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            warn_on_failure: false,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_base(mut self, base: u32) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Report every failed attempt at warn level. Used for list sources,
    /// where a failure is worth seeing at the default filter.
    pub fn with_failure_warnings(mut self) -> Self {
        self.warn_on_failure = true;
        self
    }

    /// Delay slept after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_base.saturating_pow(attempt);
        self.backoff_unit.saturating_mul(factor)
    }

    /// Run `operation` until it succeeds or `max_attempts` is reached.
    ///
    /// Only the calling task sleeps between attempts. The last error is
    /// returned once attempts are exhausted.
    pub async fn execute<F, Fut, T, E>(&self, target: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    if self.warn_on_failure {
                        warn!(target_id = target, attempt, max_attempts, error = %e, "attempt failed, giving up");
                    } else {
                        debug!(target_id = target, attempt, max_attempts, error = %e, "attempt failed, giving up");
                    }
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    let delay_ms = delay.as_millis() as u64;
                    if self.warn_on_failure {
                        warn!(target_id = target, attempt, max_attempts, delay_ms, error = %e, "attempt failed, backing off");
                    } else {
                        debug!(target_id = target, attempt, max_attempts, delay_ms, error = %e, "attempt failed, backing off");
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
