//! One-shot rating obligations opened when a session is stopped

use crate::types::UserId;
use std::collections::HashMap;

/// Map from rater to the former partner they may rate
#[derive(Debug, Clone, Default)]
pub struct PendingRatings {
    targets: HashMap<UserId, UserId>,
}

impl PendingRatings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let each of `a` and `b` rate the other, replacing any older obligation
    pub fn open_mutual(&mut self, a: UserId, b: UserId) {
        self.targets.insert(a, b);
        self.targets.insert(b, a);
    }

    /// Consume the rater's obligation
    pub fn take(&mut self, rater: UserId) -> Option<UserId> {
        self.targets.remove(&rater)
    }

    /// Put back an obligation consumed by a failed submission, unless a newer
    /// one was opened in the meantime
    pub fn restore(&mut self, rater: UserId, ratee: UserId) {
        self.targets.entry(rater).or_insert(ratee);
    }

    pub fn target_of(&self, rater: UserId) -> Option<UserId> {
        self.targets.get(&rater).copied()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutual_obligation_is_one_shot() {
        let mut pending = PendingRatings::new();
        pending.open_mutual(1, 2);
        assert_eq!(pending.target_of(1), Some(2));
        assert_eq!(pending.target_of(2), Some(1));

        assert_eq!(pending.take(1), Some(2));
        assert_eq!(pending.take(1), None);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_newer_obligation_overwrites() {
        let mut pending = PendingRatings::new();
        pending.open_mutual(1, 2);
        pending.open_mutual(1, 3);
        assert_eq!(pending.target_of(1), Some(3));
        // 2 may still rate 1
        assert_eq!(pending.target_of(2), Some(1));
    }

    #[test]
    fn test_restore_does_not_clobber_newer() {
        let mut pending = PendingRatings::new();
        pending.restore(1, 2);
        assert_eq!(pending.target_of(1), Some(2));

        pending.open_mutual(1, 5);
        pending.restore(1, 2);
        assert_eq!(pending.target_of(1), Some(5));
    }
}
