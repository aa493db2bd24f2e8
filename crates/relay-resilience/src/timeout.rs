//! Deadline enforcement for single attempts.
//!
//! The guard races one attempt against its deadline. Losing the race drops
//! the attempt future, which aborts the underlying HTTP call rather than
//! leaving it in flight.

use relay_core::{ProviderId, RelayError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Timeout guard for one attempt
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    timeout: Duration,
}

impl TimeoutGuard {
    /// Default attempt deadline
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300_000);

    /// Create a guard with the given deadline; zero disables the guard
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Create a guard with the default deadline
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }

    /// The configured deadline
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one attempt under the deadline.
    ///
    /// A zero timeout awaits the attempt directly.
    ///
    /// # Errors
    /// Returns `RelayError::Timeout` when the deadline wins the race
    pub async fn run<T, F>(&self, provider: &ProviderId, attempt: F) -> Result<T, RelayError>
    where
        F: Future<Output = Result<T, RelayError>>,
    {
        if self.timeout.is_zero() {
            return attempt.await;
        }

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    provider = %provider,
                    timeout_ms = self.timeout.as_millis(),
                    "Attempt timed out"
                );
                Err(RelayError::timeout(provider.clone(), self.timeout))
            }
        }
    }
}

impl Default for TimeoutGuard {
    fn default() -> Self {
        Self::with_defaults()
    }
}
