//! Provider transport abstraction.
//!
//! A transport owns everything provider-specific: request shaping, wire
//! protocol, credential headers, and usage-field naming. The orchestrator
//! depends only on this trait.

use crate::error::RelayError;
use crate::request::ModelRequest;
use crate::response::ModelResponse;
use crate::streaming::ChunkStream;
use crate::types::ProviderId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability interface every provider kind implements
#[async_trait]
pub trait ProviderTransport: Send + Sync + 'static {
    /// Provider identity this transport serves
    fn id(&self) -> &ProviderId;

    /// Provider kind (wire protocol family)
    fn kind(&self) -> ProviderKind;

    /// Endpoint the transport talks to
    fn base_url(&self) -> &str;

    /// Execute one blocking generation call
    ///
    /// # Errors
    /// Returns `RelayError` on transport or provider failure
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, RelayError>;

    /// Establish one streaming generation call
    ///
    /// # Errors
    /// Returns `RelayError` if the stream cannot be established; failures
    /// after establishment surface as stream items
    async fn invoke_stream(&self, request: &ModelRequest) -> Result<ChunkStream, RelayError>;
}

/// Provider wire-protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat-completions API (bearer token)
    OpenAi,
    /// Anthropic messages API (x-api-key, distinct event grammar)
    Anthropic,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(format!("Unknown provider kind: {s}")),
        }
    }
}
