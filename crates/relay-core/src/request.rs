//! Canonical request types.
//!
//! A [`ModelRequest`] is the provider-independent shape every transport
//! consumes. It is built once per logical call and treated as immutable for
//! each attempt; fallback derives sibling requests from it.

use crate::types::{ApiKey, MaxTokens, ProviderId, Temperature, ValidationError};
use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction
    System,
    /// End-user input
    User,
    /// Model output
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role
    pub role: MessageRole,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Canonical text-generation request
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Target provider
    pub provider: ProviderId,
    /// Target model name
    pub model: String,
    /// Optional deployment alias (Azure-style deployment-addressed endpoints)
    pub deployment: Option<String>,
    /// Ordered conversation messages
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: Option<Temperature>,
    /// Output token ceiling
    pub max_tokens: Option<MaxTokens>,
    /// Per-request API key override
    pub api_key: Option<ApiKey>,
    /// Per-request endpoint override
    pub base_url: Option<String>,
}

impl ModelRequest {
    /// Create a new request builder
    #[must_use]
    pub fn builder() -> ModelRequestBuilder {
        ModelRequestBuilder::default()
    }

    /// Whether the caller supplied explicit credential/endpoint overrides
    #[must_use]
    pub fn has_overrides(&self) -> bool {
        self.api_key.is_some() || self.base_url.is_some()
    }

    /// Derive a sibling request targeting a different provider/model.
    ///
    /// Explicit api-key/base-url overrides carry over only because the
    /// original caller set them; registry defaults are re-resolved for the
    /// new provider.
    #[must_use]
    pub fn for_candidate(&self, provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            deployment: self.deployment.clone(),
            messages: self.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

/// Builder for `ModelRequest`
#[derive(Debug, Default)]
pub struct ModelRequestBuilder {
    provider: Option<ProviderId>,
    model: Option<String>,
    deployment: Option<String>,
    messages: Vec<ChatMessage>,
    temperature: Option<Temperature>,
    max_tokens: Option<MaxTokens>,
    api_key: Option<ApiKey>,
    base_url: Option<String>,
}

impl ModelRequestBuilder {
    /// Set the target provider
    #[must_use]
    pub fn provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the target model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the deployment alias
    #[must_use]
    pub fn deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    /// Append a message
    #[must_use]
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Set all messages at once
    #[must_use]
    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn temperature(mut self, temperature: Temperature) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token ceiling
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: MaxTokens) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set a per-request API key override
    #[must_use]
    pub fn api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Set a per-request endpoint override
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidRequest` if the provider, model, or
    /// messages are missing
    pub fn build(self) -> Result<ModelRequest, ValidationError> {
        let provider = self.provider.ok_or(ValidationError::InvalidRequest {
            reason: "provider is required".to_string(),
        })?;
        let model = self.model.ok_or(ValidationError::InvalidRequest {
            reason: "model is required".to_string(),
        })?;
        if model.is_empty() {
            return Err(ValidationError::InvalidRequest {
                reason: "model cannot be empty".to_string(),
            });
        }
        if self.messages.is_empty() {
            return Err(ValidationError::InvalidRequest {
                reason: "at least one message is required".to_string(),
            });
        }

        Ok(ModelRequest {
            provider,
            model,
            deployment: self.deployment,
            messages: self.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            api_key: self.api_key,
            base_url: self.base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ProviderId {
        ProviderId::new(s).expect("valid provider id")
    }

    #[test]
    fn test_builder() {
        let request = ModelRequest::builder()
            .provider(pid("openai"))
            .model("gpt-4o")
            .message(ChatMessage::system("You are terse."))
            .message(ChatMessage::user("Hello"))
            .temperature(Temperature::new(0.2).unwrap())
            .max_tokens(MaxTokens::new(256).unwrap())
            .build()
            .expect("valid request");

        assert_eq!(request.provider.as_str(), "openai");
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages.len(), 2);
        assert!(!request.has_overrides());
    }

    #[test]
    fn test_builder_missing_fields() {
        assert!(ModelRequest::builder().build().is_err());
        assert!(ModelRequest::builder().provider(pid("openai")).build().is_err());
        assert!(ModelRequest::builder()
            .provider(pid("openai"))
            .model("gpt-4o")
            .build()
            .is_err());
    }

    #[test]
    fn test_for_candidate_carries_overrides() {
        let request = ModelRequest::builder()
            .provider(pid("openai"))
            .model("gpt-4o")
            .message(ChatMessage::user("Hi"))
            .base_url("https://proxy.internal")
            .build()
            .expect("valid request");

        let candidate = request.for_candidate(pid("anthropic"), "claude-3-5-sonnet");
        assert_eq!(candidate.provider.as_str(), "anthropic");
        assert_eq!(candidate.model, "claude-3-5-sonnet");
        assert_eq!(candidate.base_url.as_deref(), Some("https://proxy.internal"));
        assert_eq!(candidate.messages, request.messages);
    }

    #[test]
    fn test_message_helpers() {
        assert_eq!(ChatMessage::system("x").role, MessageRole::System);
        assert_eq!(ChatMessage::user("x").role, MessageRole::User);
        assert_eq!(ChatMessage::assistant("x").role, MessageRole::Assistant);
    }
}
