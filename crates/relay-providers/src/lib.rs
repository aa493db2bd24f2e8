//! # Relay Providers
//!
//! Concrete provider transports and the registry that maps provider
//! identities to them:
//! - OpenAI-compatible chat-completions transport
//! - Anthropic messages transport
//! - `ProviderRegistry` for identity → transport resolution

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic;
pub mod openai;
pub mod registry;

pub use anthropic::{AnthropicConfig, AnthropicTransport};
pub use openai::{OpenAiConfig, OpenAiTransport};
pub use registry::{ProviderRegistry, ProviderSpec};
