//! Retry-with-backoff around rate-limited oracle calls.
//!
//! Only throttling is retried (see [`Error::is_rate_limited`]); every other
//! failure is returned on the spot. Running out of attempts while still
//! throttled yields [`Error::QuotaExceeded`].

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base, ...
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(label, attempts = attempt, "oracle call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_rate_limited() => {
                    if attempt >= max_attempts {
                        tracing::error!(label, attempts = attempt, error = %err, "oracle rate limit persisted; giving up");
                        return Err(Error::QuotaExceeded {
                            attempts: attempt,
                            message: err.to_string(),
                        });
                    }

                    let delay = self.delay_before_retry(attempt);
                    tracing::warn!(
                        label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "oracle rate limited; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
