//! # Relay Orchestrator
//!
//! The resilient multi-provider generation facade. Wraps a logical
//! "generate text" or "stream text" call with timeout enforcement, bounded
//! retry with backoff, per-provider circuit breaking, per-provider rate
//! limiting, and ordered fallback across providers.
//!
//! ```no_run
//! use relay_core::{ChatMessage, ModelRequest, ProviderId};
//! use relay_orchestrator::{CallOptions, Orchestrator};
//! use relay_providers::ProviderRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), relay_core::RelayError> {
//! let registry = Arc::new(ProviderRegistry::new());
//! let orchestrator = Orchestrator::new(registry);
//!
//! let request = ModelRequest::builder()
//!     .provider(ProviderId::new("openai")?)
//!     .model("gpt-4o")
//!     .message(ChatMessage::user("Summarize this clause."))
//!     .build()?;
//!
//! let response = orchestrator.generate(&request, &CallOptions::new()).await?;
//! println!("{}", response.text);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod facade;
pub mod fallback;
pub mod health;
pub mod options;

pub use facade::Orchestrator;
pub use fallback::{FallbackCandidate, FallbackPolicy};
pub use health::ProviderHealth;
pub use options::{
    CallOptions, CircuitBreakerOverride, OrchestratorDefaults, RateLimitOverride, RetryOverride,
};
