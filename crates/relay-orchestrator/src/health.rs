//! Read-only health snapshots for operational visibility.

use relay_core::ProviderId;
use relay_resilience::CircuitPhase;
use serde::Serialize;

/// Per-provider health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Provider identity
    pub provider: ProviderId,
    /// Current breaker phase
    pub breaker_phase: CircuitPhase,
    /// Current breaker failure count
    pub failure_count: u32,
    /// Requests inside the trailing rate-limit window
    pub in_window_requests: usize,
}
