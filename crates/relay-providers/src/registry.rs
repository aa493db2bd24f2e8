//! Provider registry.
//!
//! Maps a provider identity to the transport that serves it. Construction is
//! pure: a spec names the wire-protocol kind plus credentials/endpoint, and
//! the registry builds the matching transport. Per-request overrides are
//! honored by the transports themselves, so lookups never mutate the
//! registry.

use crate::anthropic::{AnthropicConfig, AnthropicTransport};
use crate::openai::{OpenAiConfig, OpenAiTransport};
use dashmap::DashMap;
use relay_core::{ApiKey, ModelRequest, ProviderId, ProviderKind, ProviderTransport, RelayError};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Declarative description of one provider
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Provider identity
    pub id: ProviderId,
    /// Wire-protocol kind
    pub kind: ProviderKind,
    /// Default API key; absent for keyless self-hosted endpoints
    pub api_key: Option<ApiKey>,
    /// Endpoint override; absent uses the kind's public endpoint
    pub base_url: Option<String>,
    /// HTTP client timeout
    pub timeout: Duration,
}

impl ProviderSpec {
    /// Create a spec with the kind's defaults
    #[must_use]
    pub fn new(id: ProviderId, kind: ProviderKind) -> Self {
        Self {
            id,
            kind,
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Set the default API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Set the endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the HTTP client timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

struct RegistryEntry {
    transport: Arc<dyn ProviderTransport>,
    has_credentials: bool,
}

/// Registry of provider transports keyed by identity
pub struct ProviderRegistry {
    entries: DashMap<ProviderId, RegistryEntry>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Build and register a transport from a spec
    ///
    /// # Errors
    /// Returns error if the ID is already registered or construction fails
    pub fn register_spec(&self, spec: ProviderSpec) -> Result<(), RelayError> {
        let has_credentials = spec.api_key.is_some();
        let key = spec
            .api_key
            .as_ref()
            .map_or(String::new(), |k| k.expose_secret().to_string());

        let transport: Arc<dyn ProviderTransport> = match spec.kind {
            ProviderKind::OpenAi => {
                let mut config = OpenAiConfig::new(spec.id.clone(), key).with_timeout(spec.timeout);
                if let Some(base_url) = spec.base_url {
                    config = config.with_base_url(base_url);
                }
                Arc::new(OpenAiTransport::new(config)?)
            }
            ProviderKind::Anthropic => {
                let mut config =
                    AnthropicConfig::new(spec.id.clone(), key).with_timeout(spec.timeout);
                if let Some(base_url) = spec.base_url {
                    config = config.with_base_url(base_url);
                }
                Arc::new(AnthropicTransport::new(config)?)
            }
        };

        self.register(transport, has_credentials)
    }

    /// Register an already-constructed transport
    ///
    /// # Errors
    /// Returns error if the ID is already registered
    pub fn register(
        &self,
        transport: Arc<dyn ProviderTransport>,
        has_credentials: bool,
    ) -> Result<(), RelayError> {
        let id = transport.id().clone();

        if self.entries.contains_key(&id) {
            return Err(RelayError::configuration(format!(
                "Provider already registered: {id}"
            )));
        }

        self.entries.insert(
            id.clone(),
            RegistryEntry {
                transport,
                has_credentials,
            },
        );

        info!(provider = %id, "Provider registered");
        Ok(())
    }

    /// Remove a provider
    pub fn deregister(&self, id: &ProviderId) -> Option<Arc<dyn ProviderTransport>> {
        self.entries.remove(id).map(|(_, entry)| {
            info!(provider = %id, "Provider deregistered");
            entry.transport
        })
    }

    /// Look up the transport for a provider
    #[must_use]
    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn ProviderTransport>> {
        self.entries.get(id).map(|e| Arc::clone(&e.transport))
    }

    /// Resolve the transport serving a request
    ///
    /// # Errors
    /// Returns a configuration error for an unknown provider
    pub fn resolve(&self, request: &ModelRequest) -> Result<Arc<dyn ProviderTransport>, RelayError> {
        self.get(&request.provider).ok_or_else(|| {
            RelayError::configuration(format!("Unknown provider: {}", request.provider))
        })
    }

    /// Whether a request has usable credentials: a per-request override or a
    /// key registered with the provider.
    #[must_use]
    pub fn has_credentials(&self, request: &ModelRequest) -> bool {
        if request.api_key.is_some() {
            return true;
        }
        self.entries
            .get(&request.provider)
            .is_some_and(|e| e.has_credentials)
    }

    /// All registered provider identities
    #[must_use]
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
