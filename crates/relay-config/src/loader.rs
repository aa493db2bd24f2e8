//! Configuration loading from files and environment.
//!
//! Supports YAML, TOML, and JSON sources with `${VAR}` / `${VAR:-default}`
//! environment substitution, merged in order, plus prefixed env overrides.

use crate::schema::RelayConfig;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// The path to the file that was not found
        path: String,
    },

    /// IO error
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// Unsupported format
    #[error("Unsupported configuration format: {extension}")]
    UnsupportedFormat {
        /// The file extension that was not supported
        extension: String,
    },
}

/// Configuration source
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path
    File(String),
    /// Raw YAML string
    Yaml(String),
    /// Raw TOML string
    Toml(String),
    /// Raw JSON string
    Json(String),
    /// Default configuration
    Default,
}

/// Configuration loader
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            env_prefix: None,
        }
    }

    /// Add a configuration source
    #[must_use]
    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    #[must_use]
    pub fn with_file(self, path: impl Into<String>) -> Self {
        self.with_source(ConfigSource::File(path.into()))
    }

    /// Set environment variable prefix for overrides
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Load configuration from all sources
    ///
    /// # Errors
    /// Returns error if any source fails to load or validate
    pub async fn load(self) -> Result<RelayConfig, ConfigError> {
        let mut config = RelayConfig::default();

        for source in self.sources {
            let source_config = Self::load_source(&source).await?;
            config = Self::merge_configs(config, source_config);
        }

        if let Some(ref prefix) = self.env_prefix {
            config = Self::apply_env_overrides(config, prefix);
        }

        config
            .validate_config()
            .map_err(|e| ConfigError::Validation(format!("{e:?}")))?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    async fn load_source(source: &ConfigSource) -> Result<RelayConfig, ConfigError> {
        match source {
            ConfigSource::File(path) => Self::load_file(path).await,
            ConfigSource::Yaml(content) => Self::parse_yaml(&Self::substitute_env_vars(content)),
            ConfigSource::Toml(content) => Self::parse_toml(&Self::substitute_env_vars(content)),
            ConfigSource::Json(content) => Self::parse_json(&Self::substitute_env_vars(content)),
            ConfigSource::Default => Ok(RelayConfig::default()),
        }
    }

    async fn load_file(path: &str) -> Result<RelayConfig, ConfigError> {
        let path = Path::new(path);

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        let content = Self::substitute_env_vars(&content);

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        debug!("Loading configuration from {} (format: {})", path.display(), extension);

        match extension.as_str() {
            "yaml" | "yml" => Self::parse_yaml(&content),
            "toml" => Self::parse_toml(&content),
            "json" => Self::parse_json(&content),
            ext => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }

    fn parse_yaml(content: &str) -> Result<RelayConfig, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn parse_toml(content: &str) -> Result<RelayConfig, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn parse_json(content: &str) -> Result<RelayConfig, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Substitute environment variables in content.
    ///
    /// Supports `${VAR}` and `${VAR:-default}` syntax. Missing variables
    /// without a default are left in place and warned about.
    ///
    /// # Panics
    /// Panics if the regex is invalid (static pattern, cannot happen)
    #[allow(clippy::expect_used)]
    fn substitute_env_vars(content: &str) -> String {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("valid regex");
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = cap.get(0).expect("match exists").as_str();
            let var_spec = cap.get(1).expect("group exists").as_str();

            let (var_name, default) = if let Some(idx) = var_spec.find(":-") {
                (&var_spec[..idx], Some(&var_spec[idx + 2..]))
            } else {
                (var_spec, None)
            };

            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(full_match, &value);
                }
                Err(_) => {
                    if let Some(default_val) = default {
                        result = result.replace(full_match, default_val);
                    } else {
                        warn!("Environment variable not found: {}", var_name);
                    }
                }
            }
        }

        result
    }

    /// Merge two configurations (later overrides earlier)
    fn merge_configs(base: RelayConfig, overlay: RelayConfig) -> RelayConfig {
        RelayConfig {
            providers: if overlay.providers.is_empty() {
                base.providers
            } else {
                overlay.providers
            },
            resilience: overlay.resilience,
            logging: overlay.logging,
        }
    }

    fn apply_env_overrides(mut config: RelayConfig, prefix: &str) -> RelayConfig {
        if let Ok(level) = std::env::var(format!("{prefix}_LOG_LEVEL")) {
            config.logging.level = level;
        }

        if let Ok(retries) = std::env::var(format!("{prefix}_MAX_RETRIES")) {
            if let Ok(retries) = retries.parse() {
                config.resilience.retry.max_retries = retries;
            }
        }

        config
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load configuration from default locations.
///
/// Looks for configuration in order:
/// 1. Path from `RELAY_CONFIG_PATH` environment variable
/// 2. ./relay.yaml
/// 3. ./config/relay.yaml
///
/// # Errors
/// Returns error if a found file fails to parse or validate
pub async fn load_config() -> Result<RelayConfig, ConfigError> {
    let config_path = std::env::var("RELAY_CONFIG_PATH").ok();

    let search_paths = if let Some(ref path) = config_path {
        vec![path.as_str()]
    } else {
        vec!["relay.yaml", "relay.yml", "config/relay.yaml"]
    };

    for path in &search_paths {
        if Path::new(path).exists() {
            info!("Loading configuration from: {}", path);
            return ConfigLoader::new()
                .with_file(*path)
                .with_env_prefix("RELAY")
                .load()
                .await;
        }
    }

    warn!("No configuration file found, using defaults");
    Ok(RelayConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("RELAY_TEST_VAR", "test_value");

        let content = "key: ${RELAY_TEST_VAR}";
        assert_eq!(ConfigLoader::substitute_env_vars(content), "key: test_value");

        std::env::remove_var("RELAY_TEST_VAR");
    }

    #[test]
    fn test_env_var_with_default() {
        let content = "key: ${RELAY_NONEXISTENT_VAR:-fallback}";
        assert_eq!(ConfigLoader::substitute_env_vars(content), "key: fallback");
    }

    #[tokio::test]
    async fn test_load_yaml_content() {
        let yaml = r#"
providers:
  - id: openai-main
    kind: openai
    api_key: sk-test
resilience:
  retry:
    max_retries: 1
"#;

        let config = ConfigLoader::new()
            .with_source(ConfigSource::Yaml(yaml.to_string()))
            .load()
            .await
            .expect("load config");

        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].id, "openai-main");
        assert_eq!(config.resilience.retry.max_retries, 1);
        // Unspecified sections keep defaults
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);
    }

    #[tokio::test]
    async fn test_load_default_config() {
        let config = ConfigLoader::new()
            .with_source(ConfigSource::Default)
            .load()
            .await
            .expect("load config");

        assert!(config.providers.is_empty());
        assert_eq!(config.resilience.rate_limit.requests_per_window, 60);
    }

    #[tokio::test]
    async fn test_env_overrides() {
        std::env::set_var("RELAY_TEST_PREFIX_MAX_RETRIES", "7");

        let config = ConfigLoader::new()
            .with_source(ConfigSource::Default)
            .with_env_prefix("RELAY_TEST_PREFIX")
            .load()
            .await
            .expect("load config");

        assert_eq!(config.resilience.retry.max_retries, 7);

        std::env::remove_var("RELAY_TEST_PREFIX_MAX_RETRIES");
    }

    #[tokio::test]
    async fn test_overlay_merge() {
        let base = r#"
providers:
  - id: openai-main
    kind: openai
logging:
  level: debug
"#;
        let overlay = r#"
logging:
  level: warn
"#;

        let config = ConfigLoader::new()
            .with_source(ConfigSource::Yaml(base.to_string()))
            .with_source(ConfigSource::Yaml(overlay.to_string()))
            .load()
            .await
            .expect("load config");

        // Overlay wins for logging; providers survive from the base
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.providers.len(), 1);
    }
}
