//! Exponential backoff for transient service errors.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::ConfigError;
use crate::domain::models::RetryConfig;

/// Retry policy with exponential backoff
///
/// Attempt `n` (1-indexed) that fails with a retryable error waits
/// `base_delay * 2^(n-1)` before attempt `n + 1`. After `max_attempts`
/// attempts the last error is returned unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    max_attempts: u32,
    /// Delay after the first failed attempt
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// Both values must be positive; anything else is rejected here rather
    /// than on first use.
    ///
    /// # Example
    /// ```
    /// use neon_testing::infrastructure::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(5, 1_000).unwrap();
    /// assert_eq!(policy.max_attempts(), 5);
    /// ```
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidRetryPolicy("max_attempts"));
        }
        if base_delay_ms == 0 {
            return Err(ConfigError::InvalidRetryPolicy("base_delay_ms"));
        }

        Ok(Self {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
        })
    }

    pub fn from_config(config: &RetryConfig) -> Result<Self, ConfigError> {
        Self::new(config.max_attempts, config.base_delay_ms)
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation`, retrying while `is_retryable` accepts the error.
    ///
    /// # Example
    /// ```no_run
    /// # use neon_testing::infrastructure::retry::RetryPolicy;
    /// # use neon_testing::domain::ApiError;
    /// # async fn example() -> Result<u32, ApiError> {
    /// let policy = RetryPolicy::new(3, 100).unwrap();
    ///
    /// let value = policy
    ///     .execute(|| async { Ok::<_, ApiError>(42) }, ApiError::is_locked)
    ///     .await?;
    /// # Ok(value)
    /// # }
    /// ```
    pub async fn execute<F, Fut, T, E, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retrying");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if attempt >= self.max_attempts || !is_retryable(&err) {
                        if attempt >= self.max_attempts {
                            warn!(attempts = attempt, error = %err, "Giving up after retries");
                        } else {
                            debug!(error = %err, "Permanent error, not retrying");
                        }
                        return Err(err);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient error, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Delay after the given failed attempt (1-indexed).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1_000),
        }
    }
}
