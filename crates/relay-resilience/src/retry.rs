//! Bounded retry with exponential backoff.
//!
//! The executor repeats one attempt function; admission checks (breaker,
//! limiter) run inside the attempt, so their rejections follow the same
//! backoff schedule as transport failures instead of retrying in a hot loop.

use relay_core::{ErrorCategory, ProviderId, RelayError};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Error categories the executor recovers from
    pub retry_on: Vec<ErrorCategory>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
            retry_on: ErrorCategory::default_retryable(),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before attempt `attempt` (1-based; attempt 0 has none).
    ///
    /// Pure exponential: `min(base × multiplier^(attempt−1), max)`, no jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32).max(0.0);
        let max_ms = self.max_delay.as_millis() as f64;
        // Clamp in f64 space so large attempt indices cannot overflow
        let delay_ms = (self.base_delay.as_millis() as f64 * factor).min(max_ms);
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether the executor recovers from this error
    #[must_use]
    pub fn is_retryable(&self, error: &RelayError) -> bool {
        self.retry_on.contains(&error.category())
    }
}

/// Retry executor
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor;

impl RetryExecutor {
    /// Run the attempt function under the policy's retry budget.
    ///
    /// The attempt function receives the 0-based attempt index. Success
    /// returns immediately; a non-retryable failure or an exhausted budget
    /// propagates the last error.
    ///
    /// # Errors
    /// Returns the last attempt's error on exhaustion or non-retryable failure
    pub async fn run<T, F, Fut>(
        policy: &RetryPolicy,
        provider: &ProviderId,
        mut attempt: F,
    ) -> Result<T, RelayError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RelayError>>,
    {
        let mut last_error: Option<RelayError> = None;

        for index in 0..=policy.max_retries {
            if index > 0 {
                let delay = policy.delay_for(index);
                debug!(
                    provider = %provider,
                    attempt = index + 1,
                    delay_ms = delay.as_millis(),
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match attempt(index).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let retryable = policy.is_retryable(&error);
                    if !retryable || index == policy.max_retries {
                        warn!(
                            provider = %provider,
                            attempt = index + 1,
                            category = %error.category(),
                            retryable,
                            "Attempt failed, giving up"
                        );
                        return Err(error);
                    }
                    debug!(
                        provider = %provider,
                        attempt = index + 1,
                        category = %error.category(),
                        "Attempt failed, will retry"
                    );
                    last_error = Some(error);
                }
            }
        }

        // Loop always returns from its last iteration; kept for totality.
        Err(last_error
            .unwrap_or_else(|| RelayError::configuration("retry budget of zero attempts")))
    }
}
