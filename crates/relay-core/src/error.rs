//! Error types and handling for the relay.
//!
//! Every failure a caller can observe is a [`RelayError`]. Each variant maps
//! to an [`ErrorCategory`] used by the retry executor's classifier; the
//! circuit breaker counts failures regardless of category.

use crate::types::{ProviderId, ValidationError};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `RelayError`
pub type RelayResult<T> = Result<T, RelayError>;

/// Coarse error category used by the retry classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Attempt did not resolve within its deadline
    Timeout,
    /// Provider or local limiter refused on rate grounds
    RateLimited,
    /// Provider judged unavailable (breaker open, 503)
    ServiceUnavailable,
    /// Upstream returned a bad-gateway class failure (502)
    BadGateway,
    /// Connection-level failure (reset, DNS)
    ConnectionReset,
    /// Missing or invalid configuration; never retried
    Configuration,
    /// Anything the classifier could not place
    Unclassified,
}

impl ErrorCategory {
    /// Categories the default retry policy treats as transient.
    #[must_use]
    pub fn default_retryable() -> Vec<Self> {
        vec![
            Self::Timeout,
            Self::RateLimited,
            Self::ServiceUnavailable,
            Self::BadGateway,
            Self::ConnectionReset,
        ]
    }

    /// Classify a raw provider error by message substrings and status code.
    ///
    /// Mirrors the matching order used when normalizing transport failures:
    /// timeout, rate limit (429), 503, 502, connection reset/DNS.
    #[must_use]
    pub fn classify(message: &str, status_code: Option<u16>) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("timeout") || lowered.contains("timed out") {
            Self::Timeout
        } else if lowered.contains("rate limit") || status_code == Some(429) || lowered.contains("429") {
            Self::RateLimited
        } else if status_code == Some(503) || lowered.contains("503") {
            Self::ServiceUnavailable
        } else if status_code == Some(502) || lowered.contains("502") {
            Self::BadGateway
        } else if lowered.contains("econnreset")
            || lowered.contains("enotfound")
            || lowered.contains("connection reset")
        {
            Self::ConnectionReset
        } else {
            Self::Unclassified
        }
    }

    /// Whether this category is transient by default.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration | Self::Unclassified)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::BadGateway => write!(f, "bad_gateway"),
            Self::ConnectionReset => write!(f, "connection_reset"),
            Self::Configuration => write!(f, "configuration"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Relay error covering every failure surfaced to callers.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or invalid configuration (fails before any attempt)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Attempt exceeded its deadline
    #[error("Request to {provider} timed out after {duration:?}")]
    Timeout {
        /// Provider the attempt targeted
        provider: ProviderId,
        /// Deadline that was exceeded
        duration: Duration,
    },

    /// Local limiter or upstream refused on rate grounds
    #[error("Rate limit exceeded for provider {provider}")]
    RateLimited {
        /// Provider whose window is full
        provider: ProviderId,
        /// Wait that would be required before the next admission
        retry_after: Option<Duration>,
        /// The limit that was exceeded, if known
        limit: Option<u32>,
    },

    /// Circuit breaker refused the attempt
    #[error("Circuit breaker open for provider {provider}")]
    BreakerOpen {
        /// Provider with the open breaker
        provider: ProviderId,
    },

    /// Raw provider/transport failure
    #[error("Provider error: {provider} - {message}")]
    Provider {
        /// Provider that returned the error
        provider: ProviderId,
        /// Error message
        message: String,
        /// HTTP status from the provider, if any
        status_code: Option<u16>,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// Failure inside an established stream
    #[error("Streaming error from {provider}: {message}")]
    Streaming {
        /// Provider whose stream failed
        provider: ProviderId,
        /// Error message
        message: String,
    },
}

impl RelayError {
    /// Get the error category used by the retry classifier.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::BreakerOpen { .. } => ErrorCategory::ServiceUnavailable,
            Self::Provider {
                message, status_code, ..
            } => ErrorCategory::classify(message, *status_code),
            Self::Streaming { message, .. } => ErrorCategory::classify(message, None),
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Configuration { .. } => false,
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::BreakerOpen { .. } => true,
            Self::Streaming { .. } => self.category().is_retryable(),
        }
    }

    /// Get the HTTP status code equivalent for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Provider { status_code, .. } => status_code
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Streaming { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Provider this error is attributed to, when there is one.
    #[must_use]
    pub fn provider(&self) -> Option<&ProviderId> {
        match self {
            Self::Configuration { .. } => None,
            Self::Timeout { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::BreakerOpen { provider }
            | Self::Provider { provider, .. }
            | Self::Streaming { provider, .. } => Some(provider),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(provider: ProviderId, duration: Duration) -> Self {
        Self::Timeout { provider, duration }
    }

    /// Create a rate limit error
    #[must_use]
    pub fn rate_limited(
        provider: ProviderId,
        retry_after: Option<Duration>,
        limit: Option<u32>,
    ) -> Self {
        Self::RateLimited {
            provider,
            retry_after,
            limit,
        }
    }

    /// Create a breaker-open error
    #[must_use]
    pub fn breaker_open(provider: ProviderId) -> Self {
        Self::BreakerOpen { provider }
    }

    /// Create a provider error
    #[must_use]
    pub fn provider_error(
        provider: ProviderId,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create a streaming error
    #[must_use]
    pub fn streaming(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::Streaming {
            provider,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for RelayError {
    fn from(err: ValidationError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}
