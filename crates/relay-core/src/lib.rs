//! # Relay Core
//!
//! Canonical types for the modelrelay orchestrator:
//! - Provider-independent request/response/chunk shapes
//! - The `ProviderTransport` capability trait
//! - The error taxonomy shared by all crates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod request;
pub mod response;
pub mod streaming;
pub mod transport;
pub mod types;

pub use error::{ErrorCategory, RelayError, RelayResult};
pub use request::{ChatMessage, MessageRole, ModelRequest, ModelRequestBuilder};
pub use response::{ModelResponse, Usage};
pub use streaming::{ChunkStream, ResponseChunk};
pub use transport::{ProviderKind, ProviderTransport};
pub use types::{ApiKey, MaxTokens, ProviderId, Temperature, ValidationError};
