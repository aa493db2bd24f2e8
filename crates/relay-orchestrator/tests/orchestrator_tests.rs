//! Integration tests for the orchestrator facade.
//!
//! Uses scripted mock transports with call counters to assert the retry,
//! breaker, fallback, and streaming contracts without touching the network.

use async_trait::async_trait;
use futures_util::StreamExt;
use relay_core::{
    ChatMessage, ChunkStream, ModelRequest, ModelResponse, ProviderId, ProviderKind,
    ProviderTransport, RelayError, ResponseChunk, Usage,
};
use relay_orchestrator::{
    CallOptions, CircuitBreakerOverride, FallbackCandidate, FallbackPolicy, Orchestrator,
    RateLimitOverride, RetryOverride,
};
use relay_providers::ProviderRegistry;
use relay_resilience::CircuitPhase;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn pid(s: &str) -> ProviderId {
    ProviderId::new(s).expect("valid provider id")
}

/// How a mock transport serves streaming calls
#[derive(Clone)]
enum StreamPlan {
    /// Yield these deltas, then a final chunk with usage
    Chunks(Vec<&'static str>),
    /// Fail the first N establishment calls, then stream the deltas
    FailEstablish(u32, Vec<&'static str>),
    /// Yield these deltas, then fail mid-stream
    MidStreamError(Vec<&'static str>),
}

struct MockTransport {
    id: ProviderId,
    reply: String,
    fail_times: u32,
    invoke_calls: AtomicU32,
    stream_calls: AtomicU32,
    plan: StreamPlan,
}

impl MockTransport {
    fn new(id: &str, reply: &str) -> Self {
        Self {
            id: pid(id),
            reply: reply.to_string(),
            fail_times: 0,
            invoke_calls: AtomicU32::new(0),
            stream_calls: AtomicU32::new(0),
            plan: StreamPlan::Chunks(vec![]),
        }
    }

    fn with_fail_times(mut self, times: u32) -> Self {
        self.fail_times = times;
        self
    }

    fn with_plan(mut self, plan: StreamPlan) -> Self {
        self.plan = plan;
        self
    }

    fn invoke_count(&self) -> u32 {
        self.invoke_calls.load(Ordering::SeqCst)
    }

    fn stream_count(&self) -> u32 {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

fn chunk_stream(deltas: Vec<&'static str>) -> ChunkStream {
    let mut items: Vec<Result<ResponseChunk, RelayError>> = deltas
        .into_iter()
        .map(|d| Ok(ResponseChunk::delta(d)))
        .collect();
    items.push(Ok(ResponseChunk::final_with_usage(Usage::new(5, 7))));
    Box::pin(futures::stream::iter(items))
}

#[async_trait]
impl ProviderTransport for MockTransport {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn base_url(&self) -> &str {
        "mock://local"
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, RelayError> {
        let n = self.invoke_calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_times {
            return Err(RelayError::provider_error(
                self.id.clone(),
                "503 service unavailable",
                Some(503),
                true,
            ));
        }
        Ok(ModelResponse::new(
            self.id.clone(),
            &request.model,
            &self.reply,
            Some(Usage::new(5, 7)),
        ))
    }

    async fn invoke_stream(&self, _request: &ModelRequest) -> Result<ChunkStream, RelayError> {
        let n = self.stream_calls.fetch_add(1, Ordering::SeqCst);
        match &self.plan {
            StreamPlan::Chunks(deltas) => Ok(chunk_stream(deltas.clone())),
            StreamPlan::FailEstablish(times, deltas) => {
                if n < *times {
                    Err(RelayError::provider_error(
                        self.id.clone(),
                        "503 service unavailable",
                        Some(503),
                        true,
                    ))
                } else {
                    Ok(chunk_stream(deltas.clone()))
                }
            }
            StreamPlan::MidStreamError(deltas) => {
                let mut items: Vec<Result<ResponseChunk, RelayError>> = deltas
                    .iter()
                    .map(|d| Ok(ResponseChunk::delta(*d)))
                    .collect();
                items.push(Err(RelayError::streaming(
                    self.id.clone(),
                    "connection reset by peer (ECONNRESET)",
                )));
                Ok(Box::pin(futures::stream::iter(items)))
            }
        }
    }
}

fn orchestrator_with(transports: Vec<Arc<MockTransport>>) -> Orchestrator {
    let registry = ProviderRegistry::new();
    for transport in transports {
        registry
            .register(transport as Arc<dyn ProviderTransport>, true)
            .expect("register mock");
    }
    Orchestrator::new(Arc::new(registry))
}

fn request_for(provider: &str) -> ModelRequest {
    ModelRequest::builder()
        .provider(pid(provider))
        .model("test-model")
        .message(ChatMessage::user("Hello"))
        .build()
        .expect("valid request")
}

/// Options with sub-millisecond-scale backoff so tests stay fast
fn fast_options(max_retries: u32) -> CallOptions {
    CallOptions::new().with_retry(RetryOverride {
        max_retries: Some(max_retries),
        base_delay: Some(Duration::from_millis(5)),
        max_delay: Some(Duration::from_millis(20)),
        ..RetryOverride::default()
    })
}

#[tokio::test]
async fn test_generate_success() {
    let transport = Arc::new(MockTransport::new("openai", "Hello world"));
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let response = orchestrator
        .generate(&request_for("openai"), &fast_options(0))
        .await
        .expect("success");

    assert_eq!(response.text, "Hello world");
    assert_eq!(response.provider.as_str(), "openai");
    assert_eq!(response.usage, Some(Usage::new(5, 7)));
    assert_eq!(transport.invoke_count(), 1);
}

#[tokio::test]
async fn test_unknown_provider_fails_fast() {
    let orchestrator = orchestrator_with(vec![]);

    let err = orchestrator
        .generate(&request_for("nope"), &fast_options(3))
        .await
        .expect_err("unknown provider");

    assert!(matches!(err, RelayError::Configuration { .. }));
}

#[tokio::test]
async fn test_missing_credentials_fail_before_any_attempt() {
    let transport = Arc::new(MockTransport::new("keyless", "hi"));
    let registry = ProviderRegistry::new();
    registry
        .register(Arc::clone(&transport) as Arc<dyn ProviderTransport>, false)
        .expect("register");
    let orchestrator = Orchestrator::new(Arc::new(registry));

    let err = orchestrator
        .generate(&request_for("keyless"), &fast_options(3))
        .await
        .expect_err("no credentials");

    assert!(matches!(err, RelayError::Configuration { .. }));
    assert_eq!(transport.invoke_count(), 0);
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failures() {
    let transport = Arc::new(MockTransport::new("openai", "recovered").with_fail_times(2));
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let response = orchestrator
        .generate(&request_for("openai"), &fast_options(3))
        .await
        .expect("recovered after retries");

    assert_eq!(response.text, "recovered");
    assert_eq!(transport.invoke_count(), 3);
}

#[tokio::test]
async fn test_retry_budget_is_max_retries_plus_one() {
    let transport = Arc::new(MockTransport::new("openai", "never").with_fail_times(u32::MAX));
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let err = orchestrator
        .generate(&request_for("openai"), &fast_options(2))
        .await
        .expect_err("exhausted");

    assert!(matches!(err, RelayError::Provider { .. }));
    assert_eq!(transport.invoke_count(), 3);
}

#[tokio::test]
async fn test_breaker_short_circuits_without_invoking_transport() {
    let transport = Arc::new(MockTransport::new("flaky", "never").with_fail_times(u32::MAX));
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let options = fast_options(0).with_circuit_breaker(CircuitBreakerOverride {
        failure_threshold: Some(2),
        recovery_timeout: Some(Duration::from_secs(60)),
        ..CircuitBreakerOverride::default()
    });

    // Two transport failures open the breaker
    for _ in 0..2 {
        let _ = orchestrator.generate(&request_for("flaky"), &options).await;
    }
    assert_eq!(transport.invoke_count(), 2);

    // Third call is refused before reaching the transport
    let err = orchestrator
        .generate(&request_for("flaky"), &options)
        .await
        .expect_err("breaker open");
    assert!(matches!(err, RelayError::BreakerOpen { .. }));
    assert_eq!(transport.invoke_count(), 2);

    let health = orchestrator.provider_health(&pid("flaky"));
    assert_eq!(health.breaker_phase, CircuitPhase::Open);
    assert_eq!(health.failure_count, 2);
}

#[tokio::test]
async fn test_breaker_probe_recovers_after_recovery_timeout() {
    // First invocation fails, everything after succeeds
    let transport = Arc::new(MockTransport::new("healing", "ok again").with_fail_times(1));
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let options = fast_options(0).with_circuit_breaker(CircuitBreakerOverride {
        failure_threshold: Some(1),
        recovery_timeout: Some(Duration::from_millis(40)),
        ..CircuitBreakerOverride::default()
    });

    let _ = orchestrator.generate(&request_for("healing"), &options).await;
    assert_eq!(
        orchestrator.provider_health(&pid("healing")).breaker_phase,
        CircuitPhase::Open
    );

    // Still refused inside the recovery window
    assert!(matches!(
        orchestrator.generate(&request_for("healing"), &options).await,
        Err(RelayError::BreakerOpen { .. })
    ));

    tokio::time::sleep(Duration::from_millis(60)).await;

    // The probe is admitted and closes the breaker
    let response = orchestrator
        .generate(&request_for("healing"), &options)
        .await
        .expect("probe succeeded");
    assert_eq!(response.text, "ok again");

    let health = orchestrator.provider_health(&pid("healing"));
    assert_eq!(health.breaker_phase, CircuitPhase::Closed);
    assert_eq!(health.failure_count, 0);
}

#[tokio::test]
async fn test_rate_limit_rejection_surfaces() {
    let transport = Arc::new(MockTransport::new("busy", "ok"));
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let options = fast_options(0).with_rate_limit(RateLimitOverride {
        requests_per_window: Some(1),
        burst_ceiling: Some(10),
        window: Some(Duration::from_secs(60)),
    });

    orchestrator
        .generate(&request_for("busy"), &options)
        .await
        .expect("first admitted");

    let err = orchestrator
        .generate(&request_for("busy"), &options)
        .await
        .expect_err("second rejected");
    assert!(matches!(err, RelayError::RateLimited { .. }));
    assert_eq!(transport.invoke_count(), 1);
}

#[tokio::test]
async fn test_fallback_tries_candidates_in_priority_order() {
    let primary = Arc::new(MockTransport::new("primary", "never").with_fail_times(u32::MAX));
    let first = Arc::new(MockTransport::new("first-choice", "from first"));
    let second = Arc::new(MockTransport::new("second-choice", "from second"));
    let orchestrator = orchestrator_with(vec![
        Arc::clone(&primary),
        Arc::clone(&first),
        Arc::clone(&second),
    ]);

    let options = fast_options(1).with_fallback(FallbackPolicy::new(vec![
        FallbackCandidate::new(pid("second-choice"), "backup-model", 2),
        FallbackCandidate::new(pid("first-choice"), "backup-model", 1),
    ]));

    let response = orchestrator
        .generate(&request_for("primary"), &options)
        .await
        .expect("fallback succeeded");

    assert_eq!(response.text, "from first");
    assert_eq!(response.provider.as_str(), "first-choice");
    // Primary used its full budget; the lower-priority candidate was never touched
    assert_eq!(primary.invoke_count(), 2);
    assert_eq!(first.invoke_count(), 1);
    assert_eq!(second.invoke_count(), 0);
}

#[tokio::test]
async fn test_fallback_exhaustion_returns_last_error() {
    let primary = Arc::new(MockTransport::new("primary", "never").with_fail_times(u32::MAX));
    let backup = Arc::new(MockTransport::new("backup", "never").with_fail_times(u32::MAX));
    let orchestrator = orchestrator_with(vec![Arc::clone(&primary), Arc::clone(&backup)]);

    let options = fast_options(0).with_fallback(FallbackPolicy::new(vec![
        FallbackCandidate::new(pid("backup"), "backup-model", 1),
    ]));

    let err = orchestrator
        .generate(&request_for("primary"), &options)
        .await
        .expect_err("everything failed");

    // The most recent error wins, attributed to the last candidate tried
    assert_eq!(err.provider().map(ProviderId::as_str), Some("backup"));
    assert_eq!(primary.invoke_count(), 1);
    assert_eq!(backup.invoke_count(), 1);
}

#[tokio::test]
async fn test_fallback_respects_max_candidates() {
    let primary = Arc::new(MockTransport::new("primary", "never").with_fail_times(u32::MAX));
    let near = Arc::new(MockTransport::new("near", "never").with_fail_times(u32::MAX));
    let far = Arc::new(MockTransport::new("far", "would succeed"));
    let orchestrator =
        orchestrator_with(vec![Arc::clone(&primary), Arc::clone(&near), Arc::clone(&far)]);

    let options = fast_options(0).with_fallback(
        FallbackPolicy::new(vec![
            FallbackCandidate::new(pid("near"), "m", 1),
            FallbackCandidate::new(pid("far"), "m", 2),
        ])
        .with_max_candidates(1),
    );

    let err = orchestrator
        .generate(&request_for("primary"), &options)
        .await
        .expect_err("capped chain exhausted");

    assert_eq!(err.provider().map(ProviderId::as_str), Some("near"));
    assert_eq!(far.invoke_count(), 0);
}

#[tokio::test]
async fn test_stream_content_matches_blocking_generate() {
    let transport = Arc::new(
        MockTransport::new("openai", "Hello world")
            .with_plan(StreamPlan::Chunks(vec!["Hel", "lo", " world"])),
    );
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let blocking = orchestrator
        .generate(&request_for("openai"), &fast_options(0))
        .await
        .expect("blocking response");

    let mut stream = orchestrator
        .generate_stream(&request_for("openai"), &fast_options(0))
        .await
        .expect("stream established");

    let mut text = String::new();
    let mut finals = 0;
    let mut final_usage = None;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.expect("chunk ok");
        if chunk.is_final {
            finals += 1;
            final_usage = chunk.usage;
        } else {
            text.push_str(&chunk.delta);
        }
    }

    assert_eq!(text, "Hello world");
    assert_eq!(text, blocking.text);
    assert_eq!(finals, 1, "exactly one final chunk");
    assert_eq!(final_usage, Some(Usage::new(5, 7)));
}

#[tokio::test]
async fn test_stream_establishment_failure_is_retried() {
    let transport = Arc::new(
        MockTransport::new("openai", "ignored")
            .with_plan(StreamPlan::FailEstablish(1, vec!["after", " retry"])),
    );
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let stream = orchestrator
        .generate_stream(&request_for("openai"), &fast_options(2))
        .await
        .expect("stream established");

    let chunks: Vec<_> = stream.collect().await;
    let text: String = chunks
        .iter()
        .filter_map(|c| c.as_ref().ok())
        .filter(|c| !c.is_final)
        .map(|c| c.delta.as_str())
        .collect();

    assert_eq!(text, "after retry");
    assert_eq!(transport.stream_count(), 2);
}

#[tokio::test]
async fn test_stream_not_retried_after_first_yielded_chunk() {
    let transport = Arc::new(
        MockTransport::new("openai", "ignored")
            .with_plan(StreamPlan::MidStreamError(vec!["partial"])),
    );
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let stream = orchestrator
        .generate_stream(&request_for("openai"), &fast_options(3))
        .await
        .expect("stream established");

    let items: Vec<_> = stream.collect().await;

    // One observed chunk, then the terminal error; no silent restart
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().delta, "partial");
    assert!(items[1].is_err());
    assert_eq!(transport.stream_count(), 1);
}

#[tokio::test]
async fn test_stream_admission_checked_per_attempt() {
    let transport = Arc::new(
        MockTransport::new("down", "ignored")
            .with_plan(StreamPlan::FailEstablish(u32::MAX, vec![])),
    );
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let options = fast_options(0).with_circuit_breaker(CircuitBreakerOverride {
        failure_threshold: Some(1),
        recovery_timeout: Some(Duration::from_secs(60)),
        ..CircuitBreakerOverride::default()
    });

    // First stream attempt fails at establishment and opens the breaker
    let stream = orchestrator
        .generate_stream(&request_for("down"), &options)
        .await
        .expect("stream produced");
    let items: Vec<_> = stream.collect().await;
    assert!(items.last().unwrap().is_err());
    assert_eq!(transport.stream_count(), 1);

    // Second stream is refused by the breaker without reaching the transport
    let stream = orchestrator
        .generate_stream(&request_for("down"), &options)
        .await
        .expect("stream produced");
    let items: Vec<_> = stream.collect().await;
    assert!(matches!(
        items.first().unwrap(),
        Err(RelayError::BreakerOpen { .. })
    ));
    assert_eq!(transport.stream_count(), 1);
}

#[tokio::test]
async fn test_stream_usage_normalized_on_final_chunk() {
    let transport = Arc::new(
        MockTransport::new("openai", "x").with_plan(StreamPlan::Chunks(vec!["x"])),
    );
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    let stream = orchestrator
        .generate_stream(&request_for("openai"), &fast_options(0))
        .await
        .expect("stream established");
    let items: Vec<_> = stream.collect().await;

    let last = items.last().unwrap().as_ref().unwrap();
    assert!(last.is_final);
    assert_eq!(last.usage, Some(Usage::new(5, 7)));
}

#[tokio::test]
async fn test_health_reports_registered_and_observed_providers() {
    let transport = Arc::new(MockTransport::new("openai", "hi"));
    let orchestrator = orchestrator_with(vec![Arc::clone(&transport)]);

    orchestrator
        .generate(&request_for("openai"), &fast_options(0))
        .await
        .expect("success");

    let health = orchestrator.health();
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].provider.as_str(), "openai");
    assert_eq!(health[0].breaker_phase, CircuitPhase::Closed);
    assert_eq!(health[0].in_window_requests, 1);
}
