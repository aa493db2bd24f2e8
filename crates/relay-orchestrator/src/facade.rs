//! Orchestrator facade.
//!
//! Composes the resilience primitives around provider transports for two
//! public operations: blocking [`Orchestrator::generate`] and incremental
//! [`Orchestrator::generate_stream`]. Both apply the same admission checks
//! (rate limiter, circuit breaker), timeout guard, and retry schedule; the
//! blocking path additionally walks an ordered fallback chain.

use crate::fallback::FallbackPolicy;
use crate::health::ProviderHealth;
use crate::options::{CallOptions, OrchestratorDefaults, ResolvedPolicies};
use async_stream::try_stream;
use futures_util::StreamExt;
use relay_config::RelayConfig;
use relay_core::{
    ChunkStream, ModelRequest, ModelResponse, ProviderId, RelayError, ResponseChunk, Usage,
};
use relay_providers::ProviderRegistry;
use relay_resilience::{CircuitBreaker, RateLimiter, RetryExecutor};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resilient multi-provider generation orchestrator
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    defaults: OrchestratorDefaults,
}

impl Orchestrator {
    /// Create an orchestrator with default policies
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::with_defaults(registry, OrchestratorDefaults::default())
    }

    /// Create an orchestrator with explicit policy defaults
    #[must_use]
    pub fn with_defaults(registry: Arc<ProviderRegistry>, defaults: OrchestratorDefaults) -> Self {
        Self {
            registry,
            breaker: Arc::new(CircuitBreaker::new()),
            limiter: Arc::new(RateLimiter::new()),
            defaults,
        }
    }

    /// Build an orchestrator from configuration: registers every enabled
    /// provider and adopts the configured resilience defaults.
    ///
    /// # Errors
    /// Returns a configuration error if a provider declaration is malformed
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let registry = ProviderRegistry::new();
        for settings in config.enabled_providers() {
            registry.register_spec(settings.to_spec()?)?;
        }
        info!(providers = registry.len(), "Orchestrator configured");
        Ok(Self::with_defaults(
            Arc::new(registry),
            OrchestratorDefaults::from(&config.resilience),
        ))
    }

    /// The provider registry backing this orchestrator
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Execute a blocking generation call.
    ///
    /// Overlays per-call options onto the defaults, fails fast when the
    /// target provider has no credentials, retries the primary under the
    /// resolved policy, then walks the fallback chain (each candidate also
    /// retried, without nested fallback). The first success wins; total
    /// exhaustion surfaces the most recent error.
    ///
    /// # Errors
    /// Returns the terminal `RelayError` once every avenue is exhausted
    pub async fn generate(
        &self,
        request: &ModelRequest,
        options: &CallOptions,
    ) -> Result<ModelResponse, RelayError> {
        let resolved = options.resolve(&self.defaults);

        // Missing credentials fail before any attempt and before fallback.
        self.ensure_credentials(request)?;

        match self.attempt_with_retries(request, &resolved).await {
            Ok(response) => Ok(response),
            Err(primary_error) => {
                let Some(fallback) = options.fallback.as_ref().filter(|f| !f.is_empty()) else {
                    return Err(primary_error);
                };
                self.run_fallback(request, fallback, &resolved, primary_error)
                    .await
            }
        }
    }

    /// Walk the fallback chain after primary exhaustion.
    async fn run_fallback(
        &self,
        request: &ModelRequest,
        fallback: &FallbackPolicy,
        resolved: &ResolvedPolicies,
        primary_error: RelayError,
    ) -> Result<ModelResponse, RelayError> {
        warn!(
            provider = %request.provider,
            error = %primary_error,
            candidates = fallback.candidates.len(),
            "Primary exhausted, walking fallback chain"
        );

        let mut last_error = primary_error;
        for candidate in fallback.ordered() {
            let candidate_request =
                request.for_candidate(candidate.provider.clone(), &candidate.model);

            if let Err(error) = self.ensure_credentials(&candidate_request) {
                warn!(provider = %candidate.provider, error = %error, "Skipping candidate");
                last_error = error;
                continue;
            }

            debug!(
                provider = %candidate.provider,
                model = %candidate.model,
                priority = candidate.priority,
                "Trying fallback candidate"
            );

            match self.attempt_with_retries(&candidate_request, resolved).await {
                Ok(response) => {
                    info!(
                        provider = %candidate.provider,
                        "Fallback candidate succeeded"
                    );
                    return Ok(response);
                }
                Err(error) => {
                    warn!(provider = %candidate.provider, error = %error, "Candidate exhausted");
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }

    /// Retry one provider under the resolved policies.
    ///
    /// Admission checks run inside each attempt, so a breaker or limiter
    /// rejection follows the same backoff schedule as a transport failure.
    /// Breaker outcomes are recorded only for attempts that passed
    /// admission; local rejections never reach the transport.
    async fn attempt_with_retries(
        &self,
        request: &ModelRequest,
        resolved: &ResolvedPolicies,
    ) -> Result<ModelResponse, RelayError> {
        self.ensure_credentials(request)?;
        let transport = self.registry.resolve(request)?;
        let breaker = &self.breaker;
        let limiter = &self.limiter;

        RetryExecutor::run(&resolved.retry, &request.provider, |_attempt| {
            let transport = Arc::clone(&transport);
            async move {
                breaker.check(&request.provider, &resolved.circuit_breaker)?;
                limiter.admit(&request.provider, &resolved.rate_limit).await?;

                let result = resolved
                    .timeout
                    .run(&request.provider, transport.invoke(request))
                    .await;

                match &result {
                    Ok(_) => breaker.record_success(&request.provider),
                    Err(_) => breaker.record_failure(&request.provider, &resolved.circuit_breaker),
                }
                result
            }
        })
        .await
    }

    /// Execute a streaming generation call.
    ///
    /// Admission checks run once per retry attempt, not per chunk. Chunks
    /// forward to the caller as they arrive; after the transport stream
    /// completes, exactly one final chunk carries aggregated usage (or empty
    /// content when none was reported). Retry covers establishment and the
    /// window before the first chunk reaches the caller; once partial output
    /// has been observed, a mid-stream failure terminates the stream instead
    /// of silently restarting the sequence. Fallback is not composed into
    /// this path; callers re-invoke against an alternate provider.
    ///
    /// # Errors
    /// Returns a configuration error before the stream is produced; later
    /// failures surface as stream items
    pub async fn generate_stream(
        &self,
        request: &ModelRequest,
        options: &CallOptions,
    ) -> Result<ChunkStream, RelayError> {
        let resolved = options.resolve(&self.defaults);
        self.ensure_credentials(request)?;
        let transport = self.registry.resolve(request)?;

        let breaker = Arc::clone(&self.breaker);
        let limiter = Arc::clone(&self.limiter);
        let request = request.clone();

        let stream = try_stream! {
            let provider = request.provider.clone();
            let mut attempt = 0u32;

            'attempts: loop {
                if attempt > 0 {
                    let delay = resolved.retry.delay_for(attempt);
                    debug!(
                        provider = %provider,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "Backing off before stream retry"
                    );
                    tokio::time::sleep(delay).await;
                }

                let established = async {
                    breaker.check(&provider, &resolved.circuit_breaker)?;
                    limiter.admit(&provider, &resolved.rate_limit).await?;
                    resolved
                        .timeout
                        .run(&provider, transport.invoke_stream(&request))
                        .await
                }
                .await;

                let mut inner = match established {
                    Ok(inner) => inner,
                    Err(error) => {
                        if !is_local_rejection(&error) {
                            breaker.record_failure(&provider, &resolved.circuit_breaker);
                        }
                        if resolved.retry.is_retryable(&error) && attempt < resolved.retry.max_retries {
                            attempt += 1;
                            continue 'attempts;
                        }
                        Err(error)?;
                        break 'attempts;
                    }
                };

                let mut yielded = false;
                let mut usage: Option<Usage> = None;

                loop {
                    match inner.next().await {
                        Some(Ok(chunk)) => {
                            if chunk.is_final {
                                usage = chunk.usage;
                                break;
                            }
                            yielded = true;
                            yield chunk;
                        }
                        Some(Err(error)) => {
                            breaker.record_failure(&provider, &resolved.circuit_breaker);
                            // Retried streams would replace already-observed
                            // output, so retry stops at the first yield.
                            if !yielded
                                && resolved.retry.is_retryable(&error)
                                && attempt < resolved.retry.max_retries
                            {
                                attempt += 1;
                                continue 'attempts;
                            }
                            Err(error)?;
                        }
                        None => break,
                    }
                }

                breaker.record_success(&provider);
                match usage {
                    Some(usage) => yield ResponseChunk::final_with_usage(usage),
                    None => yield ResponseChunk::final_empty(),
                }
                break 'attempts;
            }
        };

        Ok(Box::pin(stream))
    }

    /// Health snapshot for one provider
    #[must_use]
    pub fn provider_health(&self, provider: &ProviderId) -> ProviderHealth {
        let snapshot = self.breaker.snapshot(provider);
        ProviderHealth {
            provider: provider.clone(),
            breaker_phase: snapshot.phase,
            failure_count: snapshot.failure_count,
            in_window_requests: self
                .limiter
                .in_window(provider, self.defaults.rate_limit.window),
        }
    }

    /// Health snapshots for every registered or observed provider
    #[must_use]
    pub fn health(&self) -> Vec<ProviderHealth> {
        let mut providers: BTreeSet<String> = BTreeSet::new();
        for id in self.registry.provider_ids() {
            providers.insert(id.as_str().to_string());
        }
        for id in self.breaker.providers() {
            providers.insert(id.as_str().to_string());
        }
        for id in self.limiter.providers() {
            providers.insert(id.as_str().to_string());
        }

        providers
            .into_iter()
            .filter_map(|id| ProviderId::new(id).ok())
            .map(|id| self.provider_health(&id))
            .collect()
    }

    fn ensure_credentials(&self, request: &ModelRequest) -> Result<(), RelayError> {
        if self.registry.get(&request.provider).is_none() {
            return Err(RelayError::configuration(format!(
                "Unknown provider: {}",
                request.provider
            )));
        }
        if !self.registry.has_credentials(request) {
            return Err(RelayError::configuration(format!(
                "No API key configured for provider {}",
                request.provider
            )));
        }
        Ok(())
    }
}

/// Breaker and limiter rejections are synthesized locally and never reach
/// the transport, so they must not count as breaker outcomes.
fn is_local_rejection(error: &RelayError) -> bool {
    matches!(
        error,
        RelayError::BreakerOpen { .. } | RelayError::RateLimited { .. }
    )
}
