//! Per-provider circuit breaker.
//!
//! # States
//! - Closed: normal operation; success decays the failure count toward zero,
//!   failure increments it
//! - Open: attempts refused until the recovery timeout elapses
//! - HalfOpen: exactly one probing attempt admitted; its outcome is decisive
//!
//! State for each provider is created lazily on first use and lives for the
//! lifetime of the breaker. Entries are mutated behind a per-provider mutex,
//! so concurrent call chains observe committed failure counts.

use dashmap::DashMap;
use parking_lot::Mutex;
use relay_core::{ProviderId, RelayError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerPolicy {
    /// Consecutive-failure count that opens the breaker
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a probe
    pub recovery_timeout: Duration,
    /// Informational monitoring window for operators
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_millis(60_000),
            monitoring_window: Duration::from_millis(60_000),
        }
    }
}

/// Breaker phase for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPhase {
    /// Attempts pass through
    Closed,
    /// Attempts refused until the recovery timeout elapses
    Open,
    /// One probing attempt in flight
    HalfOpen,
}

impl std::fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Per-provider breaker state
#[derive(Debug)]
struct BreakerState {
    phase: CircuitPhase,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_after: Option<Instant>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            failure_count: 0,
            last_failure: None,
            probe_after: None,
        }
    }
}

/// Read-only breaker snapshot for operational visibility
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CircuitSnapshot {
    /// Current phase
    pub phase: CircuitPhase,
    /// Current failure count
    pub failure_count: u32,
}

/// Per-provider circuit breaker registry
pub struct CircuitBreaker {
    states: DashMap<ProviderId, Mutex<BreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with no per-provider history
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Admission check, performed before every attempt.
    ///
    /// Open transitions to HalfOpen once the recovery timeout has elapsed,
    /// admitting exactly one probe; further attempts are refused until the
    /// probe's outcome is recorded.
    ///
    /// # Errors
    /// Returns `RelayError::BreakerOpen` when the attempt is refused
    pub fn check(
        &self,
        provider: &ProviderId,
        policy: &CircuitBreakerPolicy,
    ) -> Result<(), RelayError> {
        let entry = self
            .states
            .entry(provider.clone())
            .or_insert_with(|| Mutex::new(BreakerState::new()));
        let mut state = entry.lock();

        match state.phase {
            CircuitPhase::Closed => Ok(()),
            CircuitPhase::Open => {
                let ready = state
                    .probe_after
                    .is_some_and(|probe_after| Instant::now() >= probe_after);
                if ready {
                    state.phase = CircuitPhase::HalfOpen;
                    debug!(
                        provider = %provider,
                        recovery_ms = policy.recovery_timeout.as_millis(),
                        "Circuit breaker half-open, admitting probe"
                    );
                    Ok(())
                } else {
                    Err(RelayError::breaker_open(provider.clone()))
                }
            }
            // Probe already in flight
            CircuitPhase::HalfOpen => Err(RelayError::breaker_open(provider.clone())),
        }
    }

    /// Record a successful attempt.
    ///
    /// Closed decrements the failure count toward zero (decaying-failure
    /// model, so isolated successes do not immediately forgive a bad
    /// streak); HalfOpen closes the breaker and resets the count.
    pub fn record_success(&self, provider: &ProviderId) {
        let entry = self
            .states
            .entry(provider.clone())
            .or_insert_with(|| Mutex::new(BreakerState::new()));
        let mut state = entry.lock();

        match state.phase {
            CircuitPhase::Closed => {
                state.failure_count = state.failure_count.saturating_sub(1);
            }
            CircuitPhase::HalfOpen => {
                debug!(provider = %provider, "Probe succeeded, closing circuit breaker");
                state.phase = CircuitPhase::Closed;
                state.failure_count = 0;
                state.probe_after = None;
            }
            // Success while Open can only come from an attempt admitted
            // before the breaker tripped; the refusal rules are unaffected.
            CircuitPhase::Open => {}
        }
    }

    /// Record a failed attempt, regardless of retryability.
    pub fn record_failure(&self, provider: &ProviderId, policy: &CircuitBreakerPolicy) {
        let entry = self
            .states
            .entry(provider.clone())
            .or_insert_with(|| Mutex::new(BreakerState::new()));
        let mut state = entry.lock();

        let now = Instant::now();
        state.last_failure = Some(now);

        match state.phase {
            CircuitPhase::Closed => {
                state.failure_count += 1;
                if state.failure_count >= policy.failure_threshold {
                    state.phase = CircuitPhase::Open;
                    state.probe_after = Some(now + policy.recovery_timeout);
                    warn!(
                        provider = %provider,
                        failures = state.failure_count,
                        recovery_ms = policy.recovery_timeout.as_millis(),
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitPhase::HalfOpen => {
                state.phase = CircuitPhase::Open;
                state.probe_after = Some(now + policy.recovery_timeout);
                warn!(provider = %provider, "Probe failed, reopening circuit breaker");
            }
            CircuitPhase::Open => {
                state.failure_count += 1;
            }
        }
    }

    /// Read-only snapshot for one provider
    #[must_use]
    pub fn snapshot(&self, provider: &ProviderId) -> CircuitSnapshot {
        self.states.get(provider).map_or(
            CircuitSnapshot {
                phase: CircuitPhase::Closed,
                failure_count: 0,
            },
            |entry| {
                let state = entry.lock();
                CircuitSnapshot {
                    phase: state.phase,
                    failure_count: state.failure_count,
                }
            },
        )
    }

    /// Providers with recorded state
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderId> {
        self.states.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ProviderId {
        ProviderId::new(s).expect("valid provider id")
    }

    fn policy(threshold: u32, recovery_ms: u64) -> CircuitBreakerPolicy {
        CircuitBreakerPolicy {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_millis(recovery_ms),
            monitoring_window: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new();
        let provider = pid("x");
        let policy = policy(2, 60_000);

        assert!(breaker.check(&provider, &policy).is_ok());
        breaker.record_failure(&provider, &policy);
        assert!(breaker.check(&provider, &policy).is_ok());
        breaker.record_failure(&provider, &policy);

        // Threshold reached, attempts refused immediately
        assert!(matches!(
            breaker.check(&provider, &policy),
            Err(RelayError::BreakerOpen { .. })
        ));
        assert_eq!(breaker.snapshot(&provider).phase, CircuitPhase::Open);
    }

    #[test]
    fn test_success_decays_failure_count() {
        let breaker = CircuitBreaker::new();
        let provider = pid("x");
        let policy = policy(5, 60_000);

        breaker.record_failure(&provider, &policy);
        breaker.record_failure(&provider, &policy);
        assert_eq!(breaker.snapshot(&provider).failure_count, 2);

        breaker.record_success(&provider);
        assert_eq!(breaker.snapshot(&provider).failure_count, 1);

        // Floor at zero
        breaker.record_success(&provider);
        breaker.record_success(&provider);
        assert_eq!(breaker.snapshot(&provider).failure_count, 0);
        assert_eq!(breaker.snapshot(&provider).phase, CircuitPhase::Closed);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let breaker = CircuitBreaker::new();
        let provider = pid("x");
        let policy = policy(1, 20);

        breaker.record_failure(&provider, &policy);
        assert!(breaker.check(&provider, &policy).is_err());

        std::thread::sleep(Duration::from_millis(30));

        // First check after recovery admits the probe
        assert!(breaker.check(&provider, &policy).is_ok());
        assert_eq!(breaker.snapshot(&provider).phase, CircuitPhase::HalfOpen);

        // Second check while the probe is outstanding is refused
        assert!(breaker.check(&provider, &policy).is_err());
    }

    #[test]
    fn test_probe_success_closes() {
        let breaker = CircuitBreaker::new();
        let provider = pid("x");
        let policy = policy(1, 10);

        breaker.record_failure(&provider, &policy);
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.check(&provider, &policy).is_ok());

        breaker.record_success(&provider);
        let snapshot = breaker.snapshot(&provider);
        assert_eq!(snapshot.phase, CircuitPhase::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert!(breaker.check(&provider, &policy).is_ok());
    }

    #[test]
    fn test_probe_failure_reopens() {
        let breaker = CircuitBreaker::new();
        let provider = pid("x");
        let policy = policy(1, 10);

        breaker.record_failure(&provider, &policy);
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.check(&provider, &policy).is_ok());

        breaker.record_failure(&provider, &policy);
        assert_eq!(breaker.snapshot(&provider).phase, CircuitPhase::Open);
        assert!(breaker.check(&provider, &policy).is_err());
    }

    #[test]
    fn test_providers_isolated() {
        let breaker = CircuitBreaker::new();
        let policy = policy(1, 60_000);

        breaker.record_failure(&pid("a"), &policy);
        assert!(breaker.check(&pid("a"), &policy).is_err());
        assert!(breaker.check(&pid("b"), &policy).is_ok());
    }
}
