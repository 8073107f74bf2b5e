//! Profile, chat log and report persistence
//!
//! The `ProfileStore` trait is the single seam between the chat core and the
//! durable store. Every write is applied to one column or one row so that
//! concurrent updates to different fields of a profile never overwrite each
//! other.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::types::{AbuseReport, ChatLogEntry, Gender, Timestamp, UserId, UserProfile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A single-field change to a user profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfileUpdate {
    Gender(Option<Gender>),
    PreferredGender(Option<Gender>),
    Premium(bool),
    GhostBanUntil(Timestamp),
    LastPartner(UserId),
}

impl ProfileUpdate {
    /// Apply the change to an in-memory profile
    pub fn apply(&self, profile: &mut UserProfile) {
        match *self {
            ProfileUpdate::Gender(gender) => profile.gender = gender,
            ProfileUpdate::PreferredGender(gender) => profile.preferred_gender = gender,
            ProfileUpdate::Premium(premium) => profile.is_premium = premium,
            ProfileUpdate::GhostBanUntil(until) => profile.ghost_ban_until = until,
            ProfileUpdate::LastPartner(partner) => profile.last_partner = Some(partner),
        }
    }
}

/// Aggregate counts for the admin `/stats` command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub users: u64,
    pub premium_users: u64,
    pub reports: u64,
    pub chat_lines: u64,
}

/// Trait for profile storage operations
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Get a user's profile if one exists
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>>;

    /// Get a user's profile, creating it with defaults on first contact
    async fn ensure_profile(&self, user_id: UserId) -> Result<UserProfile>;

    /// Apply a single-field update and return the stored profile
    async fn upsert_profile(&self, user_id: UserId, update: ProfileUpdate) -> Result<UserProfile>;

    /// Add one score to a user's rating sum and count in a single write
    async fn record_rating(&self, ratee: UserId, score: i64) -> Result<UserProfile>;

    /// Append a relayed message line
    async fn append_log(&self, entry: &ChatLogEntry) -> Result<()>;

    /// Append an abuse report and return its row id
    async fn append_report(&self, report: &AbuseReport) -> Result<i64>;

    /// Most recent chat lines sent by or to a user, oldest first
    async fn recent_logs(&self, user_id: UserId, limit: usize) -> Result<Vec<ChatLogEntry>>;

    /// Count reports filed against a user
    async fn report_count(&self, reported: UserId) -> Result<u64>;

    /// Aggregate counts
    async fn stats(&self) -> Result<StoreStats>;
}
