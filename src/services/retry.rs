//! Retry-with-backoff for outbound platform calls.
//!
//! Local resiliency for individual network requests, distinct from the
//! worker's job-level retry budget: every call to the platform or
//! comparison service is attempted up to a fixed ceiling with
//! exponential delays (fixed base, no jitter) before the failure
//! surfaces to the caller.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Backoff configuration shared by all outbound calls of one client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, counting the initial one.
    pub max_attempts: u32,
    /// First delay; each subsequent delay doubles.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retrying after the given 0-indexed attempt.
    /// Computed with a checked shift so large attempt numbers saturate
    /// instead of overflowing.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
    }

    /// Run `op` until it succeeds or the attempt ceiling is reached,
    /// sleeping between attempts. The last error is returned verbatim.
    pub async fn run<F, Fut, T, E>(&self, what: &str, op: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 >= self.max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        call = what,
                        attempt = attempt + 1,
                        max = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
