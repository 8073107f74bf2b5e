//! Common types used throughout the chat relay service

use crate::error::ChatError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Opaque identifier assigned to a user by the chat platform
pub type UserId = i64;

/// Seconds since the unix epoch
pub type Timestamp = i64;

/// Lowest accepted rating score
pub const MIN_RATING: i64 = 1;

/// Highest accepted rating score
pub const MAX_RATING: i64 = 5;

/// Message type recorded for relayed text lines
pub const TEXT_MESSAGE: &str = "text";

/// Self-declared gender of a user, also used as a matching preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ChatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            "other" | "o" => Ok(Gender::Other),
            _ => Err(ChatError::InvalidArgument {
                usage: "Gender must be one of: male, female, other".to_string(),
            }),
        }
    }
}

/// Persistent per-user record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub gender: Option<Gender>,
    pub preferred_gender: Option<Gender>,
    pub rating_sum: i64,
    pub rating_count: i64,
    pub is_premium: bool,
    /// Ban is active while `now < ghost_ban_until`; zero means never banned
    pub ghost_ban_until: Timestamp,
    pub last_partner: Option<UserId>,
}

impl UserProfile {
    /// Fresh profile with the defaults a first contact gets
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            gender: None,
            preferred_gender: None,
            rating_sum: 0,
            rating_count: 0,
            is_premium: false,
            ghost_ban_until: 0,
            last_partner: None,
        }
    }

    /// Mean of received scores, `None` when never rated
    pub fn average_rating(&self) -> Option<f64> {
        if self.rating_count == 0 {
            None
        } else {
            Some(self.rating_sum as f64 / self.rating_count as f64)
        }
    }

    /// True only when rated at least once and every score was the maximum
    pub fn has_max_rating(&self) -> bool {
        self.rating_count > 0 && self.rating_sum == self.rating_count * MAX_RATING
    }

    pub fn is_banned(&self, now: Timestamp) -> bool {
        now < self.ghost_ban_until
    }
}

/// Snapshot of a user's matching-relevant profile fields taken when the user
/// entered the waiting pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub user_id: UserId,
    pub gender: Option<Gender>,
    pub preferred_gender: Option<Gender>,
    pub is_premium: bool,
    /// Average rating, 0.0 when unrated
    pub rating: f64,
    pub ghost_ban_until: Timestamp,
    pub joined_at: DateTime<Utc>,
}

impl WaitingEntry {
    pub fn from_profile(profile: &UserProfile, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id: profile.user_id,
            gender: profile.gender,
            preferred_gender: profile.preferred_gender,
            is_premium: profile.is_premium,
            rating: profile.average_rating().unwrap_or(0.0),
            ghost_ban_until: profile.ghost_ban_until,
            joined_at,
        }
    }

    pub fn is_banned(&self, now: Timestamp) -> bool {
        now < self.ghost_ban_until
    }
}

/// One relayed message line, written once and never updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub user_id: UserId,
    pub partner_id: UserId,
    pub timestamp: Timestamp,
    pub message_type: String,
    pub content: String,
}

impl ChatLogEntry {
    pub fn text(user_id: UserId, partner_id: UserId, timestamp: Timestamp, content: &str) -> Self {
        Self {
            user_id,
            partner_id,
            timestamp,
            message_type: TEXT_MESSAGE.to_string(),
            content: content.to_string(),
        }
    }
}

/// Abuse report row; a `None` reporter marks a system-generated report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbuseReport {
    pub reporter: Option<UserId>,
    pub reported: UserId,
}
