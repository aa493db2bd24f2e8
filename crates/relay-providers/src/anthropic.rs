//! Anthropic messages-API transport.
//!
//! Structurally different from the OpenAI shape: `x-api-key` auth header,
//! the system prompt travels outside the message list, `max_tokens` is
//! mandatory, usage fields are named `input_tokens`/`output_tokens`, and the
//! SSE grammar is typed events rather than a single chunk shape.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use relay_core::{
    ChunkStream, MessageRole, ModelRequest, ModelResponse, ProviderId, ProviderKind,
    ProviderTransport, RelayError, ResponseChunk, Usage,
};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4_096;

/// Anthropic transport configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Provider identity this transport serves
    pub id: ProviderId,
    /// API key
    pub api_key: SecretString,
    /// Base URL (default: <https://api.anthropic.com>)
    pub base_url: String,
    /// Request timeout applied at the HTTP client
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(id: ProviderId, api_key: impl Into<String>) -> Self {
        Self {
            id,
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.anthropic.com".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the HTTP client timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Anthropic transport
pub struct AnthropicTransport {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicTransport {
    /// Create a new transport
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: AnthropicConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| {
                RelayError::configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    fn messages_url(&self, request: &ModelRequest) -> String {
        let base = request.base_url.as_deref().unwrap_or(&self.config.base_url);
        format!("{}/v1/messages", base.trim_end_matches('/'))
    }

    fn api_key(&self, request: &ModelRequest) -> String {
        request
            .api_key
            .as_ref()
            .map_or_else(|| self.config.api_key.expose_secret().to_string(), |k| {
                k.expose_secret().to_string()
            })
    }

    /// System messages move out of the list; the rest keep their order.
    fn wire_request(request: &ModelRequest, stream: bool) -> WireRequest {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut messages = Vec::new();

        for message in &request.messages {
            match message.role {
                MessageRole::System => system_parts.push(&message.content),
                MessageRole::User | MessageRole::Assistant => messages.push(WireMessage {
                    role: message.role.to_string(),
                    content: message.content.clone(),
                }),
            }
        }

        WireRequest {
            model: request.model.clone(),
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            messages,
            max_tokens: request
                .max_tokens
                .map_or(DEFAULT_MAX_TOKENS, |t| t.value()),
            temperature: request.temperature.map(|t| t.value()),
            stream,
        }
    }
}

#[async_trait]
impl ProviderTransport for AnthropicTransport {
    fn id(&self) -> &ProviderId {
        &self.config.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, RelayError> {
        let wire = Self::wire_request(request, false);

        debug!(
            provider = %self.config.id,
            model = %request.model,
            "Sending messages request"
        );

        let response = self
            .client
            .post(self.messages_url(request))
            .header("x-api-key", self.api_key(request))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&wire)
            .send()
            .await
            .map_err(|e| {
                RelayError::provider_error(
                    self.config.id.clone(),
                    format!("Request failed: {e}"),
                    None,
                    e.is_timeout() || e.is_connect(),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retryable = status.as_u16() >= 500 || status.as_u16() == 429;
            error!(
                provider = %self.config.id,
                status = %status,
                error = %body,
                "Anthropic API error"
            );
            return Err(RelayError::provider_error(
                self.config.id.clone(),
                body,
                Some(status.as_u16()),
                retryable,
            ));
        }

        let wire_response: WireResponse = response.json().await.map_err(|e| {
            RelayError::provider_error(
                self.config.id.clone(),
                format!("Failed to parse response: {e}"),
                None,
                false,
            )
        })?;

        let text = wire_response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect::<String>();
        // input/output token names normalize to the canonical usage shape
        let usage = wire_response
            .usage
            .map(|u| Usage::new(u.input_tokens.unwrap_or(0), u.output_tokens.unwrap_or(0)));

        Ok(
            ModelResponse::new(self.config.id.clone(), &request.model, text, usage)
                .with_id(wire_response.id),
        )
    }

    async fn invoke_stream(&self, request: &ModelRequest) -> Result<ChunkStream, RelayError> {
        let wire = Self::wire_request(request, true);

        debug!(
            provider = %self.config.id,
            model = %request.model,
            "Starting streaming messages request"
        );

        let request_builder = self
            .client
            .post(self.messages_url(request))
            .header("x-api-key", self.api_key(request))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&wire);

        let provider_id = self.config.id.clone();

        let stream = try_stream! {
            let es = EventSource::new(request_builder).map_err(|e| {
                RelayError::streaming(provider_id.clone(), format!("Failed to create event source: {e}"))
            })?;

            let mut es = Box::pin(es);
            let mut input_tokens = 0u32;
            let mut output_tokens = 0u32;
            let mut saw_usage = false;

            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {
                        trace!(provider = %provider_id, "SSE connection opened");
                    }
                    Ok(Event::Message(message)) => match message.event.as_str() {
                        "ping" => {}
                        "message_start" => {
                            if let Ok(start) = serde_json::from_str::<WireMessageStart>(&message.data) {
                                if let Some(usage) = start.message.usage {
                                    input_tokens = usage.input_tokens.unwrap_or(0);
                                    saw_usage = true;
                                }
                            }
                        }
                        "content_block_delta" => {
                            match serde_json::from_str::<WireBlockDelta>(&message.data) {
                                Ok(delta) => {
                                    if let Some(text) = delta.delta.text {
                                        if !text.is_empty() {
                                            yield ResponseChunk::delta(text);
                                        }
                                    }
                                }
                                Err(e) => {
                                    warn!(provider = %provider_id, error = %e, "Failed to parse delta");
                                }
                            }
                        }
                        "message_delta" => {
                            if let Ok(delta) = serde_json::from_str::<WireMessageDelta>(&message.data) {
                                if let Some(usage) = delta.usage {
                                    output_tokens = usage.output_tokens.unwrap_or(0);
                                    saw_usage = true;
                                }
                            }
                        }
                        "message_stop" => {
                            trace!(provider = %provider_id, "Received message_stop event");
                            break;
                        }
                        "error" => {
                            error!(provider = %provider_id, data = %message.data, "Stream error event");
                            Err(RelayError::streaming(provider_id.clone(), message.data.clone()))?;
                        }
                        other => {
                            trace!(provider = %provider_id, event = other, "Ignoring event");
                        }
                    },
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        error!(provider = %provider_id, error = %e, "SSE error");
                        Err(RelayError::streaming(provider_id.clone(), format!("SSE error: {e}")))?;
                    }
                }
            }

            if saw_usage {
                yield ResponseChunk::final_with_usage(Usage::new(input_tokens, output_tokens));
            } else {
                yield ResponseChunk::final_empty();
            }
        };

        Ok(Box::pin(stream))
    }
}

// Anthropic wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: String,
    content: Vec<WireContentBlock>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireMessageStart {
    message: WireStartedMessage,
}

#[derive(Debug, Deserialize)]
struct WireStartedMessage {
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireBlockDelta {
    delta: WireTextDelta,
}

#[derive(Debug, Deserialize)]
struct WireTextDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessageDelta {
    usage: Option<WireUsage>,
}
