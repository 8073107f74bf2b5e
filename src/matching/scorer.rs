//! Candidate scoring for partner selection

use crate::types::WaitingEntry;

/// Trait for partner scoring strategies (higher = better fit)
pub trait Scorer: Send + Sync {
    fn score(&self, requester: &WaitingEntry, candidate: &WaitingEntry) -> f64;
}

/// Default scorer
///
/// Premium requesters score a candidate by its average rating, halved when
/// the requester has a gender preference the candidate does not satisfy.
/// Non-premium requesters score every candidate 0, which leaves the pool's
/// enqueue order to decide.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferenceScorer;

impl PreferenceScorer {
    pub fn new() -> Self {
        Self
    }

    fn satisfies_preference(requester: &WaitingEntry, candidate: &WaitingEntry) -> bool {
        match requester.preferred_gender {
            None => true,
            Some(preferred) => candidate.gender == Some(preferred),
        }
    }
}

impl Scorer for PreferenceScorer {
    fn score(&self, requester: &WaitingEntry, candidate: &WaitingEntry) -> f64 {
        if !requester.is_premium {
            return 0.0;
        }

        if Self::satisfies_preference(requester, candidate) {
            candidate.rating
        } else {
            candidate.rating / 2.0
        }
    }
}
