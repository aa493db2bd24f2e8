//! Structured logging configuration.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json or pretty)
    pub format: LogFormat,
    /// Extra filter directives (e.g., "hyper=warn,reqwest=info")
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Pretty,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Set the log level
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enable JSON format
    #[must_use]
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Build the env filter for this configuration
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let directives = match &self.filter {
            Some(filter) => format!("{},{}", self.level, filter),
            None => self.level.clone(),
        };
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (structured)
    Json,
    /// Pretty format (human-readable)
    #[default]
    Pretty,
}

/// Initialize the global tracing subscriber from configuration.
///
/// Subsequent calls are no-ops; a subscriber can only be installed once per
/// process.
pub fn init_logging(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::default();
        assert!(config.enabled);
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_builders() {
        let config = LoggingConfig::default().with_level("debug").json();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_parse() {
        let yaml = "level: warn\nformat: json\n";
        let config: LoggingConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.enabled);
    }

    #[test]
    fn test_filter_directives() {
        let config = LoggingConfig::default().with_level("debug");
        // An invalid directive set falls back rather than panicking
        let bad = LoggingConfig {
            level: ":::".to_string(),
            ..LoggingConfig::default()
        };
        let _ = config.env_filter();
        let _ = bad.env_filter();
    }
}
