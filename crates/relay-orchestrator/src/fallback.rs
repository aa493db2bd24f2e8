//! Fallback chain policy.
//!
//! An ordered list of alternate provider/model candidates tried after the
//! primary's retry budget is exhausted. Candidates equal to the primary are
//! the policy composer's responsibility to exclude.

use relay_core::ProviderId;

/// One fallback candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackCandidate {
    /// Provider to try
    pub provider: ProviderId,
    /// Model to request from that provider
    pub model: String,
    /// Ascending priority (lower tries first)
    pub priority: u32,
}

impl FallbackCandidate {
    /// Create a candidate
    #[must_use]
    pub fn new(provider: ProviderId, model: impl Into<String>, priority: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            priority,
        }
    }
}

/// Ordered fallback chain
#[derive(Debug, Clone, Default)]
pub struct FallbackPolicy {
    /// Candidates in any order; tried by ascending priority
    pub candidates: Vec<FallbackCandidate>,
    /// Cap on candidates tried; absent tries all
    pub max_candidates: Option<usize>,
}

impl FallbackPolicy {
    /// Create a policy from candidates
    #[must_use]
    pub fn new(candidates: Vec<FallbackCandidate>) -> Self {
        Self {
            candidates,
            max_candidates: None,
        }
    }

    /// Cap the number of candidates tried
    #[must_use]
    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = Some(max);
        self
    }

    /// Whether there is anything to fall back to
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates sorted by ascending priority, capped at `max_candidates`
    #[must_use]
    pub fn ordered(&self) -> Vec<&FallbackCandidate> {
        let mut ordered: Vec<&FallbackCandidate> = self.candidates.iter().collect();
        ordered.sort_by_key(|c| c.priority);
        if let Some(max) = self.max_candidates {
            ordered.truncate(max);
        }
        ordered
    }
}
