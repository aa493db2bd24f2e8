//! Validated domain newtypes.
//!
//! Domain values use newtype wrappers with runtime validation so malformed
//! input fails before any network attempt.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use thiserror::Error;

/// Validation error for domain types
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Temperature value out of range
    #[error("Invalid temperature {value}: must be between {min} and {max}")]
    InvalidTemperature {
        /// The invalid value provided
        value: f32,
        /// Minimum allowed value
        min: f32,
        /// Maximum allowed value
        max: f32,
    },

    /// Max tokens value out of range
    #[error("Invalid max_tokens {value}: must be between {min} and {max}")]
    InvalidMaxTokens {
        /// The invalid value provided
        value: u32,
        /// Minimum allowed value
        min: u32,
        /// Maximum allowed value
        max: u32,
    },

    /// Provider ID validation failed
    #[error("Invalid provider_id: {reason}")]
    InvalidProviderId {
        /// Reason for validation failure
        reason: String,
    },

    /// API key validation failed
    #[error("Invalid api_key: {reason}")]
    InvalidApiKey {
        /// Reason for validation failure
        reason: String,
    },

    /// Request shape validation failed
    #[error("Invalid request: {reason}")]
    InvalidRequest {
        /// Reason for validation failure
        reason: String,
    },
}

/// Provider identifier — the key for all per-provider state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    /// Maximum length for provider ID
    pub const MAX_LENGTH: usize = 64;

    /// Create a new provider ID with validation
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidProviderId` if empty or exceeds max length
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::InvalidProviderId {
                reason: "provider_id cannot be empty".to_string(),
            });
        }
        if value.len() > Self::MAX_LENGTH {
            return Err(ValidationError::InvalidProviderId {
                reason: format!("provider_id exceeds maximum length of {}", Self::MAX_LENGTH),
            });
        }
        Ok(Self(value))
    }

    /// Get the inner value as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProviderId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Temperature for sampling (0.0 to 2.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Temperature(f32);

impl Temperature {
    /// Minimum allowed temperature
    pub const MIN: f32 = 0.0;
    /// Maximum allowed temperature
    pub const MAX: f32 = 2.0;

    /// Create a new temperature value with validation
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidTemperature` if value is outside [0.0, 2.0]
    pub fn new(value: f32) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidTemperature {
                value,
                min: Self::MIN,
                max: Self::MAX,
            })
        }
    }

    /// Get the inner value
    #[must_use]
    pub fn value(&self) -> f32 {
        self.0
    }
}

impl TryFrom<f32> for Temperature {
    type Error = ValidationError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Temperature> for f32 {
    fn from(temp: Temperature) -> Self {
        temp.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum tokens to generate (1 to 128,000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MaxTokens(NonZeroU32);

impl MaxTokens {
    /// Minimum allowed max_tokens
    pub const MIN: u32 = 1;
    /// Maximum allowed max_tokens
    pub const MAX: u32 = 128_000;

    /// Create a new max_tokens value with validation
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidMaxTokens` if value is outside [1, 128000]
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ValidationError::InvalidMaxTokens {
                value,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        NonZeroU32::new(value)
            .map(Self)
            .ok_or(ValidationError::InvalidMaxTokens {
                value,
                min: Self::MIN,
                max: Self::MAX,
            })
    }

    /// Get the inner value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for MaxTokens {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MaxTokens> for u32 {
    fn from(tokens: MaxTokens) -> Self {
        tokens.value()
    }
}

impl fmt::Display for MaxTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// API key (sensitive, never logged)
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Create a new API key
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidApiKey` if the key is empty
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::InvalidApiKey {
                reason: "api_key cannot be empty".to_string(),
            });
        }
        Ok(Self(SecretString::new(value)))
    }

    /// Expose the secret value (use sparingly)
    #[must_use]
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ApiKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Never serialize the actual key
        serializer.serialize_str("[REDACTED]")
    }
}
