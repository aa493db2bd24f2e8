//! Configuration schema definitions.
//!
//! All sections carry defaults so a partial file (or none at all) yields a
//! working configuration.

use relay_core::{ApiKey, ErrorCategory, ProviderId, ProviderKind, RelayError};
use relay_providers::ProviderSpec;
use relay_resilience::{CircuitBreakerPolicy, RateLimitPolicy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::logging::LoggingConfig;

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RelayConfig {
    /// Provider declarations
    #[validate(nested)]
    pub providers: Vec<ProviderSettings>,

    /// Resilience policy defaults
    pub resilience: ResilienceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns validation errors if configuration is invalid
    pub fn validate_config(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()
    }

    /// Get a provider config by ID
    #[must_use]
    pub fn get_provider(&self, id: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Get all enabled providers
    #[must_use]
    pub fn enabled_providers(&self) -> Vec<&ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled).collect()
    }
}

/// One provider declaration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderSettings {
    /// Unique provider identity
    #[validate(length(min = 1, max = 64))]
    pub id: String,

    /// Wire-protocol kind
    pub kind: ProviderKind,

    /// API key (commonly an env reference like `${OPENAI_API_KEY}`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Endpoint override
    #[serde(default)]
    pub base_url: Option<String>,

    /// HTTP client timeout
    #[serde(default = "default_provider_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Whether the provider is eligible for requests
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_true() -> bool {
    true
}

impl ProviderSettings {
    /// Convert to the registry's spec shape
    ///
    /// # Errors
    /// Returns a configuration error if the ID or key is malformed
    pub fn to_spec(&self) -> Result<ProviderSpec, RelayError> {
        let id = ProviderId::new(self.id.clone())?;
        let mut spec = ProviderSpec::new(id, self.kind).with_timeout(self.timeout);
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            spec = spec.with_api_key(ApiKey::new(key.clone())?);
        }
        if let Some(base_url) = &self.base_url {
            spec = spec.with_base_url(base_url.clone());
        }
        Ok(spec)
    }
}

/// Resilience policy defaults, overridable per call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Retry defaults
    pub retry: RetrySettings,
    /// Circuit breaker defaults
    pub circuit_breaker: CircuitBreakerSettings,
    /// Rate limit defaults
    pub rate_limit: RateLimitSettings,
    /// Attempt deadline; zero disables the timeout guard
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl ResilienceSettings {
    /// Default attempt deadline
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300_000);
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            rate_limit: RateLimitSettings::default(),
            request_timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// Retry section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Ceiling for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Error categories to recover from; absent uses the built-in set
    pub retry_on: Option<Vec<ErrorCategory>>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
            multiplier: policy.multiplier,
            retry_on: None,
        }
    }
}

impl RetrySettings {
    /// Materialize the retry policy
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            retry_on: self
                .retry_on
                .clone()
                .unwrap_or_else(ErrorCategory::default_retryable),
        }
    }
}

/// Circuit breaker section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive-failure count that opens the breaker
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a probe
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
    /// Informational monitoring window
    #[serde(with = "humantime_serde")]
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let policy = CircuitBreakerPolicy::default();
        Self {
            failure_threshold: policy.failure_threshold,
            recovery_timeout: policy.recovery_timeout,
            monitoring_window: policy.monitoring_window,
        }
    }
}

impl CircuitBreakerSettings {
    /// Materialize the breaker policy
    #[must_use]
    pub fn to_policy(&self) -> CircuitBreakerPolicy {
        CircuitBreakerPolicy {
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout,
            monitoring_window: self.monitoring_window,
        }
    }
}

/// Rate limit section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests admitted per rolling window
    pub requests_per_window: u32,
    /// In-window count at which admission starts waiting
    pub burst_ceiling: u32,
    /// Window duration
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let policy = RateLimitPolicy::default();
        Self {
            requests_per_window: policy.requests_per_window,
            burst_ceiling: policy.burst_ceiling,
            window: policy.window,
        }
    }
}

impl RateLimitSettings {
    /// Materialize the rate limit policy
    #[must_use]
    pub fn to_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            requests_per_window: self.requests_per_window,
            burst_ceiling: self.burst_ceiling,
            window: self.window,
        }
    }
}
