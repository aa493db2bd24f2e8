//! Sliding-window rate limiting.
//!
//! Admission counts attempt timestamps within a trailing window rather than
//! a fixed bucket reset. Burst pressure produces a bounded wait; sustained
//! overload fails fast with the wait that would be required.

use dashmap::DashMap;
use parking_lot::Mutex;
use relay_core::{ProviderId, RelayError};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Requests admitted per rolling window
    pub requests_per_window: u32,
    /// In-window count at which admission starts waiting
    pub burst_ceiling: u32,
    /// Window duration
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            burst_ceiling: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Per-provider sliding-window rate limiter
pub struct RateLimiter {
    windows: DashMap<ProviderId, Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with empty windows
    #[must_use]
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Admit one attempt for a provider.
    ///
    /// Two checks, in order:
    /// 1. Burst check — at/above the burst ceiling, suspend until the oldest
    ///    in-window timestamp falls outside the window, then re-check.
    /// 2. Rate check — still at/above the per-window ceiling, fail
    ///    immediately with the wait that would be required.
    ///
    /// On admission the current timestamp joins the provider's window.
    ///
    /// # Errors
    /// Returns `RelayError::RateLimited` on sustained overload
    pub async fn admit(
        &self,
        provider: &ProviderId,
        policy: &RateLimitPolicy,
    ) -> Result<(), RelayError> {
        loop {
            let wait = {
                let entry = self
                    .windows
                    .entry(provider.clone())
                    .or_insert_with(|| Mutex::new(VecDeque::new()));
                let mut window = entry.lock();
                Self::trim(&mut window, policy.window);

                if (window.len() as u32) < policy.burst_ceiling {
                    None
                } else {
                    window
                        .front()
                        .map(|oldest| (*oldest + policy.window).saturating_duration_since(Instant::now()))
                }
            };

            match wait {
                None => break,
                Some(wait) => {
                    debug!(
                        provider = %provider,
                        wait_ms = wait.as_millis(),
                        "Burst ceiling reached, waiting for window to slide"
                    );
                    // Lock released above; suspend without blocking peers.
                    tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                }
            }
        }

        let entry = self
            .windows
            .entry(provider.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut window = entry.lock();
        Self::trim(&mut window, policy.window);

        if (window.len() as u32) >= policy.requests_per_window {
            let retry_after = window
                .front()
                .map(|oldest| (*oldest + policy.window).saturating_duration_since(Instant::now()));
            warn!(
                provider = %provider,
                in_window = window.len(),
                limit = policy.requests_per_window,
                "Rate limit exceeded"
            );
            return Err(RelayError::rate_limited(
                provider.clone(),
                retry_after,
                Some(policy.requests_per_window),
            ));
        }

        window.push_back(Instant::now());
        Ok(())
    }

    /// Number of attempts currently inside a provider's trailing window
    #[must_use]
    pub fn in_window(&self, provider: &ProviderId, window: Duration) -> usize {
        self.windows.get(provider).map_or(0, |entry| {
            let mut timestamps = entry.lock();
            Self::trim(&mut timestamps, window);
            timestamps.len()
        })
    }

    /// Providers with recorded state
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderId> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }

    fn trim(window: &mut VecDeque<Instant>, span: Duration) {
        let now = Instant::now();
        while window
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= span)
        {
            window.pop_front();
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
