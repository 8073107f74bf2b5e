//! Waiting pool of users seeking a partner
//!
//! Entries keep their enqueue order. Scans run over a copied snapshot so the
//! pool may be mutated while a scan result is still being used.

use crate::types::{UserId, WaitingEntry};
use std::collections::VecDeque;

/// Users currently searching, in the order they started searching
#[derive(Debug, Clone, Default)]
pub struct WaitingPool {
    entries: VecDeque<WaitingEntry>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; returns false if the user is already waiting
    pub fn enqueue(&mut self, entry: WaitingEntry) -> bool {
        if self.contains(entry.user_id) {
            return false;
        }
        self.entries.push_back(entry);
        true
    }

    /// Remove a user, returning their entry if they were waiting
    pub fn remove(&mut self, user_id: UserId) -> Option<WaitingEntry> {
        let index = self.entries.iter().position(|e| e.user_id == user_id)?;
        self.entries.remove(index)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries.iter().any(|e| e.user_id == user_id)
    }

    pub fn get(&self, user_id: UserId) -> Option<&WaitingEntry> {
        self.entries.iter().find(|e| e.user_id == user_id)
    }

    /// Replace a waiting user's snapshot in place, keeping their position
    pub fn refresh(&mut self, entry: WaitingEntry) -> bool {
        match self.entries.iter_mut().find(|e| e.user_id == entry.user_id) {
            Some(existing) => {
                let joined_at = existing.joined_at;
                *existing = WaitingEntry { joined_at, ..entry };
                true
            }
            None => false,
        }
    }

    /// Snapshot of every waiting user except `excluding`, in enqueue order
    pub fn candidates(&self, excluding: UserId) -> Vec<WaitingEntry> {
        self.entries
            .iter()
            .filter(|e| e.user_id != excluding)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
