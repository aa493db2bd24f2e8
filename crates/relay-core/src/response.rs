//! Canonical response types.

use crate::types::ProviderId;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Token usage statistics, normalized across providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,

    /// Number of tokens in the completion
    pub completion_tokens: u32,

    /// Total number of tokens used
    pub total_tokens: u32,
}

impl Usage {
    /// Create a new usage record
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Add another usage record to this one
    pub fn add(&mut self, other: &Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Canonical text-generation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Unique response identifier
    pub id: String,

    /// Creation timestamp (Unix epoch seconds)
    pub created: i64,

    /// Model that produced the response
    pub model: String,

    /// Provider that served the request
    pub provider: ProviderId,

    /// Produced text
    pub text: String,

    /// Token usage, when the provider reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelResponse {
    /// Create a new response
    #[must_use]
    pub fn new(
        provider: ProviderId,
        model: impl Into<String>,
        text: impl Into<String>,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            id: format!("gen-{}", uuid::Uuid::new_v4()),
            created: Utc::now().timestamp(),
            model: model.into(),
            provider,
            text: text.into(),
            usage,
        }
    }

    /// Replace the generated response id with an upstream one
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
