use std::time::Duration;

use crate::common::{Result, ShutdownSignal, WebdeskError};

/// Bounded retry with an optional multiplicative back-off between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    interval: Duration,
    backoff: f64,
    max_interval: Duration,
}

/// Outcome of a single attempt.
pub enum Attempt<T> {
    Done(T),
    Retry(String),
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts,
            interval,
            backoff: 1.0,
            max_interval: interval,
        }
    }

    pub fn with_backoff(mut self, backoff: f64, max_interval: Duration) -> Self {
        self.backoff = backoff.max(1.0);
        self.max_interval = max_interval.max(self.interval);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay slept after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.interval.as_millis() as f64 * factor).round() as u64;
        Duration::from_millis(millis).min(self.max_interval)
    }

    /// Runs `operation` until it returns `Attempt::Done` or the attempts are exhausted.
    /// Sleeping between attempts is interrupted by the shutdown signal.
    ///
    /// # Returns
    /// * `Ok(Some(value))` on success, `Ok(None)` once every attempt failed (each failure reason
    ///   is logged at debug level), `Err(Interrupted)` if shutdown was requested.
    pub fn run<T, F>(&self, signal: &ShutdownSignal, mut operation: F) -> Result<Option<T>>
        where F: FnMut(u32) -> Result<Attempt<T>> {
        for attempt in 1..=self.attempts {
            if signal.is_triggered() {
                return Err(WebdeskError::Interrupted);
            }

            match operation(attempt)? {
                Attempt::Done(value) => return Ok(Some(value)),
                Attempt::Retry(reason) => {
                    debug!("Attempt {}/{} failed: {}", attempt, self.attempts, reason);
                }
            }

            if attempt < self.attempts && signal.wait_timeout(self.delay_after(attempt)) {
                return Err(WebdeskError::Interrupted);
            }
        }
        Ok(None)
    }
}
