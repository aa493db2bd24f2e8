//! # Relay Config
//!
//! Configuration for the modelrelay orchestrator:
//! - Schema with defaults for providers, resilience policies, and logging
//! - Loader for YAML/TOML/JSON sources with env substitution and overrides
//! - Structured-logging initialization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod loader;
pub mod logging;
pub mod schema;

pub use loader::{load_config, ConfigError, ConfigLoader, ConfigSource};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use schema::{
    CircuitBreakerSettings, ProviderSettings, RateLimitSettings, RelayConfig,
    ResilienceSettings, RetrySettings,
};
