//! Per-call options and policy resolution.
//!
//! Callers supply partial overrides; the facade overlays them onto its
//! defaults so an override changes only the fields it names.

use crate::fallback::FallbackPolicy;
use relay_config::ResilienceSettings;
use relay_core::ErrorCategory;
use relay_resilience::{CircuitBreakerPolicy, RateLimitPolicy, RetryPolicy, TimeoutGuard};
use std::time::Duration;

/// Orchestrator-wide policy defaults
#[derive(Debug, Clone)]
pub struct OrchestratorDefaults {
    /// Retry policy
    pub retry: RetryPolicy,
    /// Circuit breaker policy
    pub circuit_breaker: CircuitBreakerPolicy,
    /// Rate limit policy
    pub rate_limit: RateLimitPolicy,
    /// Attempt deadline; zero disables the timeout guard
    pub request_timeout: Duration,
}

impl Default for OrchestratorDefaults {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerPolicy::default(),
            rate_limit: RateLimitPolicy::default(),
            request_timeout: TimeoutGuard::DEFAULT_TIMEOUT,
        }
    }
}

impl From<&ResilienceSettings> for OrchestratorDefaults {
    fn from(settings: &ResilienceSettings) -> Self {
        Self {
            retry: settings.retry.to_policy(),
            circuit_breaker: settings.circuit_breaker.to_policy(),
            rate_limit: settings.rate_limit.to_policy(),
            request_timeout: settings.request_timeout,
        }
    }
}

/// Partial retry override
#[derive(Debug, Clone, Default)]
pub struct RetryOverride {
    /// Retries after the initial attempt
    pub max_retries: Option<u32>,
    /// Delay before the first retry
    pub base_delay: Option<Duration>,
    /// Ceiling for any single delay
    pub max_delay: Option<Duration>,
    /// Backoff multiplier
    pub multiplier: Option<f64>,
    /// Error categories to recover from
    pub retry_on: Option<Vec<ErrorCategory>>,
}

impl RetryOverride {
    fn overlay(&self, base: &RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            base_delay: self.base_delay.unwrap_or(base.base_delay),
            max_delay: self.max_delay.unwrap_or(base.max_delay),
            multiplier: self.multiplier.unwrap_or(base.multiplier),
            retry_on: self.retry_on.clone().unwrap_or_else(|| base.retry_on.clone()),
        }
    }
}

/// Partial circuit breaker override
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerOverride {
    /// Consecutive-failure count that opens the breaker
    pub failure_threshold: Option<u32>,
    /// How long the breaker stays open before admitting a probe
    pub recovery_timeout: Option<Duration>,
    /// Informational monitoring window
    pub monitoring_window: Option<Duration>,
}

impl CircuitBreakerOverride {
    fn overlay(&self, base: &CircuitBreakerPolicy) -> CircuitBreakerPolicy {
        CircuitBreakerPolicy {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            recovery_timeout: self.recovery_timeout.unwrap_or(base.recovery_timeout),
            monitoring_window: self.monitoring_window.unwrap_or(base.monitoring_window),
        }
    }
}

/// Partial rate limit override
#[derive(Debug, Clone, Default)]
pub struct RateLimitOverride {
    /// Requests admitted per rolling window
    pub requests_per_window: Option<u32>,
    /// In-window count at which admission starts waiting
    pub burst_ceiling: Option<u32>,
    /// Window duration
    pub window: Option<Duration>,
}

impl RateLimitOverride {
    fn overlay(&self, base: &RateLimitPolicy) -> RateLimitPolicy {
        RateLimitPolicy {
            requests_per_window: self.requests_per_window.unwrap_or(base.requests_per_window),
            burst_ceiling: self.burst_ceiling.unwrap_or(base.burst_ceiling),
            window: self.window.unwrap_or(base.window),
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Retry override
    pub retry: Option<RetryOverride>,
    /// Circuit breaker override
    pub circuit_breaker: Option<CircuitBreakerOverride>,
    /// Rate limit override
    pub rate_limit: Option<RateLimitOverride>,
    /// Fallback chain for the blocking path
    pub fallback: Option<FallbackPolicy>,
    /// Attempt deadline override; zero disables the guard
    pub request_timeout: Option<Duration>,
}

impl CallOptions {
    /// Create empty options (defaults apply everywhere)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry override
    #[must_use]
    pub fn with_retry(mut self, retry: RetryOverride) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the circuit breaker override
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerOverride) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Set the rate limit override
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitOverride) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Set the fallback chain
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Set the attempt deadline
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Overlay these options onto the defaults
    #[must_use]
    pub(crate) fn resolve(&self, defaults: &OrchestratorDefaults) -> ResolvedPolicies {
        ResolvedPolicies {
            retry: self
                .retry
                .as_ref()
                .map_or_else(|| defaults.retry.clone(), |o| o.overlay(&defaults.retry)),
            circuit_breaker: self.circuit_breaker.as_ref().map_or_else(
                || defaults.circuit_breaker.clone(),
                |o| o.overlay(&defaults.circuit_breaker),
            ),
            rate_limit: self.rate_limit.as_ref().map_or_else(
                || defaults.rate_limit.clone(),
                |o| o.overlay(&defaults.rate_limit),
            ),
            timeout: TimeoutGuard::new(self.request_timeout.unwrap_or(defaults.request_timeout)),
        }
    }
}

/// Effective policies for one call
#[derive(Debug, Clone)]
pub(crate) struct ResolvedPolicies {
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerPolicy,
    pub rate_limit: RateLimitPolicy,
    pub timeout: TimeoutGuard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_options_keep_defaults() {
        let defaults = OrchestratorDefaults::default();
        let resolved = CallOptions::new().resolve(&defaults);

        assert_eq!(resolved.retry.max_retries, 3);
        assert_eq!(resolved.circuit_breaker.failure_threshold, 5);
        assert_eq!(resolved.rate_limit.requests_per_window, 60);
        assert_eq!(resolved.timeout.timeout(), Duration::from_millis(300_000));
    }

    #[test]
    fn test_partial_override_changes_named_fields_only() {
        let defaults = OrchestratorDefaults::default();
        let options = CallOptions::new()
            .with_retry(RetryOverride {
                max_retries: Some(1),
                ..RetryOverride::default()
            })
            .with_circuit_breaker(CircuitBreakerOverride {
                failure_threshold: Some(2),
                ..CircuitBreakerOverride::default()
            });

        let resolved = options.resolve(&defaults);
        assert_eq!(resolved.retry.max_retries, 1);
        // Unnamed retry fields keep defaults
        assert_eq!(resolved.retry.base_delay, Duration::from_millis(1_000));
        assert_eq!(resolved.retry.multiplier, 2.0);

        assert_eq!(resolved.circuit_breaker.failure_threshold, 2);
        assert_eq!(
            resolved.circuit_breaker.recovery_timeout,
            Duration::from_millis(60_000)
        );
    }

    #[test]
    fn test_timeout_override() {
        let defaults = OrchestratorDefaults::default();
        let resolved = CallOptions::new()
            .with_request_timeout(Duration::ZERO)
            .resolve(&defaults);
        assert!(resolved.timeout.timeout().is_zero());
    }

    #[test]
    fn test_defaults_from_settings() {
        let mut settings = ResilienceSettings::default();
        settings.retry.max_retries = 9;
        let defaults = OrchestratorDefaults::from(&settings);
        assert_eq!(defaults.retry.max_retries, 9);
    }
}
