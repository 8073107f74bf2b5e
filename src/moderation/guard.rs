//! Abuse guard: message inspection and ghost-ban enforcement
//!
//! Inspection is a pure decision over the sender's stored profile and the
//! message text. Enforcement (reports, ban windows) goes through the profile
//! store with single-field writes.

use crate::config::ModerationSettings;
use crate::error::{ChatError, Result};
use crate::metrics::MetricsCollector;
use crate::storage::{ProfileStore, ProfileUpdate};
use crate::types::{AbuseReport, Timestamp, UserId, UserProfile};
use crate::utils::Clock;
use chrono::Duration;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of inspecting one outgoing message
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Forward the message
    Allow,
    /// Drop the message; the sender keeps chatting
    Block { reason: String },
    /// Drop the message and ghost-ban the sender
    Ban { duration: Duration },
}

/// Decides what happens to outgoing messages and applies ghost-bans
pub struct AbuseGuard {
    link_pattern: Regex,
    link_ban_duration: Duration,
    escalate_links_to_ban: bool,
    blocked_terms: Vec<String>,
    store: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
    metrics_collector: Arc<MetricsCollector>,
}

impl AbuseGuard {
    pub fn new(
        settings: &ModerationSettings,
        store: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let link_pattern =
            Regex::new(&settings.link_pattern).map_err(|e| ChatError::ConfigurationError {
                message: format!("invalid link pattern: {e}"),
            })?;

        Ok(Self {
            link_pattern,
            link_ban_duration: Duration::days(settings.link_ban_days),
            escalate_links_to_ban: settings.escalate_links_to_ban,
            blocked_terms: settings
                .blocked_terms
                .iter()
                .map(|term| term.to_lowercase())
                .filter(|term| !term.is_empty())
                .collect(),
            store,
            clock,
            metrics_collector,
        })
    }

    pub fn contains_link(&self, content: &str) -> bool {
        self.link_pattern.is_match(content)
    }

    fn blocked_term<'a>(&'a self, content: &str) -> Option<&'a str> {
        let lowered = content.to_lowercase();
        self.blocked_terms
            .iter()
            .find(|term| lowered.contains(term.as_str()))
            .map(String::as_str)
    }

    /// Decide the fate of one message from `sender`
    ///
    /// Links from non-premium senders are only tolerated when every rating
    /// the sender has received is the maximum; an unrated sender is treated
    /// as below the maximum.
    pub fn inspect(&self, sender: &UserProfile, content: &str) -> Verdict {
        if let Some(term) = self.blocked_term(content) {
            debug!("Message from {} contains blocked term '{}'", sender.user_id, term);
            return Verdict::Block {
                reason: "blocked term".to_string(),
            };
        }

        if sender.is_premium || !self.contains_link(content) || sender.has_max_rating() {
            return Verdict::Allow;
        }

        if self.escalate_links_to_ban {
            Verdict::Ban {
                duration: self.link_ban_duration,
            }
        } else {
            Verdict::Block {
                reason: "links are not allowed".to_string(),
            }
        }
    }

    /// Apply a ban verdict: file a system report and set the ban window.
    /// Returns the new ban expiry.
    pub async fn enforce_link_ban(&self, user_id: UserId, duration: Duration) -> Result<Timestamp> {
        self.store
            .append_report(&AbuseReport {
                reporter: None,
                reported: user_id,
            })
            .await?;
        self.metrics_collector.record_report("system");

        let profile = self.apply_ban(user_id, duration, "link").await?;
        Ok(profile.ghost_ban_until)
    }

    /// Ghost-ban a user for `duration` from now
    pub async fn ban(&self, user_id: UserId, duration: Duration) -> Result<UserProfile> {
        self.apply_ban(user_id, duration, "admin").await
    }

    /// Clear a user's ban window
    pub async fn unban(&self, user_id: UserId) -> Result<UserProfile> {
        let profile = self
            .store
            .upsert_profile(user_id, ProfileUpdate::GhostBanUntil(0))
            .await?;
        info!("User {} unbanned", user_id);
        Ok(profile)
    }

    /// File a user report against `reported`; returns how many reports they now have
    pub async fn report(&self, reporter: UserId, reported: UserId) -> Result<u64> {
        if reporter == reported {
            return Err(ChatError::InvalidArgument {
                usage: "You cannot report yourself.".to_string(),
            }
            .into());
        }

        self.store
            .append_report(&AbuseReport {
                reporter: Some(reporter),
                reported,
            })
            .await?;
        self.metrics_collector.record_report("user");

        let count = self.store.report_count(reported).await?;
        info!(
            "User {} reported {} ({} report(s) on file)",
            reporter, reported, count
        );
        Ok(count)
    }

    async fn apply_ban(
        &self,
        user_id: UserId,
        duration: Duration,
        source: &str,
    ) -> Result<UserProfile> {
        let until = (self.clock.now() + duration).timestamp();
        let profile = self
            .store
            .upsert_profile(user_id, ProfileUpdate::GhostBanUntil(until))
            .await?;
        self.metrics_collector.record_ban(source);
        info!(
            "User {} ghost-banned until {} (source: {})",
            user_id, until, source
        );
        Ok(profile)
    }
}
