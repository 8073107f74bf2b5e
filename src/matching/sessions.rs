//! Symmetric table of active one-to-one chat sessions

use crate::types::UserId;
use std::collections::HashMap;

/// Active pairings; `partner_of(a) == Some(b)` iff `partner_of(b) == Some(a)`
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    partners: HashMap<UserId, UserId>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair two distinct, currently unpaired users
    pub fn pair(&mut self, a: UserId, b: UserId) -> bool {
        if a == b || self.partners.contains_key(&a) || self.partners.contains_key(&b) {
            return false;
        }
        self.partners.insert(a, b);
        self.partners.insert(b, a);
        true
    }

    /// Remove both directions of `user_id`'s session, returning the old partner
    pub fn unpair(&mut self, user_id: UserId) -> Option<UserId> {
        let partner = self.partners.remove(&user_id)?;
        self.partners.remove(&partner);
        Some(partner)
    }

    pub fn partner_of(&self, user_id: UserId) -> Option<UserId> {
        self.partners.get(&user_id).copied()
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.partners.contains_key(&user_id)
    }

    /// Number of sessions (pairs), not users
    pub fn active_sessions(&self) -> usize {
        self.partners.len() / 2
    }

    /// Every user currently in a session
    pub fn paired_users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.partners.keys().copied()
    }
}
