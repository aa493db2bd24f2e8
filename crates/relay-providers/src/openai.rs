//! OpenAI-compatible transport.
//!
//! Speaks the bearer-token chat-completions wire shape shared by OpenAI and
//! the many services that imitate it.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use relay_core::{
    ChatMessage, ChunkStream, ModelRequest, ModelResponse, ProviderId, ProviderKind, RelayError,
    ProviderTransport, ResponseChunk, Usage,
};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// OpenAI transport configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Provider identity this transport serves
    pub id: ProviderId,
    /// API key
    pub api_key: SecretString,
    /// Base URL (default: <https://api.openai.com>)
    pub base_url: String,
    /// Request timeout applied at the HTTP client
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(id: ProviderId, api_key: impl Into<String>) -> Self {
        Self {
            id,
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.openai.com".to_string(),
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

/// OpenAI-compatible transport
pub struct OpenAiTransport {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiTransport {
    /// Create a new transport
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: OpenAiConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| {
                RelayError::configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    fn completions_url(&self, request: &ModelRequest) -> String {
        let base = request.base_url.as_deref().unwrap_or(&self.config.base_url);
        format!("{}/v1/chat/completions", base.trim_end_matches('/'))
    }

    fn bearer_token(&self, request: &ModelRequest) -> String {
        let key = request
            .api_key
            .as_ref()
            .map_or_else(|| self.config.api_key.expose_secret().to_string(), |k| {
                k.expose_secret().to_string()
            });
        format!("Bearer {key}")
    }

    fn wire_request(request: &ModelRequest, stream: bool) -> WireRequest {
        WireRequest {
            model: request
                .deployment
                .clone()
                .unwrap_or_else(|| request.model.clone()),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature.map(|t| t.value()),
            max_tokens: request.max_tokens.map(|t| t.value()),
            stream,
            stream_options: stream.then_some(WireStreamOptions { include_usage: true }),
        }
    }

    async fn handle_error_response(
        &self,
        response: reqwest::Response,
    ) -> RelayError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let retryable = status.as_u16() >= 500 || status.as_u16() == 429;

        error!(
            provider = %self.config.id,
            status = %status,
            error = %body,
            "OpenAI API error"
        );

        RelayError::provider_error(self.config.id.clone(), body, Some(status.as_u16()), retryable)
    }
}

#[async_trait]
impl ProviderTransport for OpenAiTransport {
    fn id(&self) -> &ProviderId {
        &self.config.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, RelayError> {
        let wire = Self::wire_request(request, false);

        debug!(
            provider = %self.config.id,
            model = %request.model,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.completions_url(request))
            .header("Authorization", self.bearer_token(request))
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

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
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
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = wire_response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));

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
            "Starting streaming chat completion"
        );

        let request_builder = self
            .client
            .post(self.completions_url(request))
            .header("Authorization", self.bearer_token(request))
            .header("Content-Type", "application/json")
            .json(&wire);

        let provider_id = self.config.id.clone();

        let stream = try_stream! {
            let es = EventSource::new(request_builder).map_err(|e| {
                RelayError::streaming(provider_id.clone(), format!("Failed to create event source: {e}"))
            })?;

            let mut es = Box::pin(es);
            let mut usage: Option<Usage> = None;

            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {
                        trace!(provider = %provider_id, "SSE connection opened");
                    }
                    Ok(Event::Message(message)) => {
                        let data = message.data.trim();
                        if data == "[DONE]" {
                            trace!(provider = %provider_id, "SSE stream done");
                            break;
                        }

                        match serde_json::from_str::<WireChunk>(data) {
                            Ok(chunk) => {
                                if let Some(u) = chunk.usage {
                                    usage = Some(Usage::new(u.prompt_tokens, u.completion_tokens));
                                }
                                let delta = chunk
                                    .choices
                                    .into_iter()
                                    .next()
                                    .and_then(|c| c.delta.content);
                                if let Some(delta) = delta {
                                    if !delta.is_empty() {
                                        yield ResponseChunk::delta(delta);
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(provider = %provider_id, error = %e, "Failed to parse chunk");
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        error!(provider = %provider_id, error = %e, "SSE error");
                        Err(RelayError::streaming(provider_id.clone(), format!("SSE error: {e}")))?;
                    }
                }
            }

            match usage {
                Some(usage) => yield ResponseChunk::final_with_usage(usage),
                None => yield ResponseChunk::final_empty(),
            }
        };

        Ok(Box::pin(stream))
    }
}

// OpenAI wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<WireStreamOptions>,
}

#[derive(Debug, Serialize)]
struct WireStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: String,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    choices: Vec<WireChunkChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChunkChoice {
    delta: WireDelta,
}

#[derive(Debug, Deserialize, Default)]
struct WireDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{MaxTokens, Temperature};

    fn pid(s: &str) -> ProviderId {
        ProviderId::new(s).expect("valid provider id")
    }

    fn request() -> ModelRequest {
        ModelRequest::builder()
            .provider(pid("openai"))
            .model("gpt-4o")
            .message(ChatMessage::user("Hello"))
            .temperature(Temperature::new(0.3).unwrap())
            .max_tokens(MaxTokens::new(128).unwrap())
            .build()
            .expect("valid request")
    }

    #[test]
    fn test_transport_creation() {
        let transport = OpenAiTransport::new(OpenAiConfig::new(pid("openai"), "sk-test"));
        assert!(transport.is_ok());
        let transport = transport.unwrap();
        assert_eq!(transport.id().as_str(), "openai");
        assert_eq!(transport.kind(), ProviderKind::OpenAi);
    }

    #[test]
    fn test_wire_request_shape() {
        let wire = OpenAiTransport::wire_request(&request(), false);
        assert_eq!(wire.model, "gpt-4o");
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "user");
        assert_eq!(wire.temperature, Some(0.3));
        assert_eq!(wire.max_tokens, Some(128));
        assert!(!wire.stream);
        assert!(wire.stream_options.is_none());
    }

    #[test]
    fn test_wire_request_streaming_asks_for_usage() {
        let wire = OpenAiTransport::wire_request(&request(), true);
        assert!(wire.stream);
        assert!(wire.stream_options.is_some());
    }

    #[test]
    fn test_deployment_alias_replaces_model() {
        let request = ModelRequest::builder()
            .provider(pid("azure"))
            .model("gpt-4o")
            .deployment("prod-gpt4o")
            .message(ChatMessage::user("Hi"))
            .build()
            .expect("valid request");

        let wire = OpenAiTransport::wire_request(&request, false);
        assert_eq!(wire.model, "prod-gpt4o");
    }

    #[test]
    fn test_url_and_key_overrides() {
        let transport =
            OpenAiTransport::new(OpenAiConfig::new(pid("openai"), "sk-default")).unwrap();

        let mut request = request();
        assert_eq!(
            transport.completions_url(&request),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(transport.bearer_token(&request), "Bearer sk-default");

        request.base_url = Some("https://proxy.internal/".to_string());
        request.api_key = Some(relay_core::ApiKey::new("sk-override").unwrap());
        assert_eq!(
            transport.completions_url(&request),
            "https://proxy.internal/v1/chat/completions"
        );
        assert_eq!(transport.bearer_token(&request), "Bearer sk-override");
    }

    #[test]
    fn test_parse_wire_response() {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [{"message": {"role": "assistant", "content": "Hi!"}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        }"#;
        let parsed: WireResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hi!"));
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 9);
    }

    #[test]
    fn test_parse_wire_chunk() {
        let json = r#"{"choices": [{"delta": {"content": "He"}}]}"#;
        let parsed: WireChunk = serde_json::from_str(json).expect("parse");
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("He"));
    }
}
