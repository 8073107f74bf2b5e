//! Inbound message dispatcher
//!
//! `ChatService` turns each inbound message into a command or a relay
//! payload, runs it against the core services and sends the replies. Domain
//! errors are recovered here and answered with a user-facing message; any
//! other failure is logged and answered with a generic retry prompt.

use crate::config::AppConfig;
use crate::error::{ChatError, Result};
use crate::matching::{MatchEngine, MatchOutcome, StopOutcome};
use crate::metrics::MetricsCollector;
use crate::moderation::AbuseGuard;
use crate::rating::RatingService;
use crate::relay::{RelayOutcome, RelayService};
use crate::storage::{ProfileStore, ProfileUpdate};
use crate::transport::{
    parse_input, Command, InboundHandler, InboundMessage, Input, MessageContent, Transport,
};
use crate::types::{Timestamp, UserId};
use crate::utils::format_timestamp;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Fixed reply texts
pub mod replies {
    pub const WELCOME: &str = "Welcome! Use /find to chat with a stranger.";
    pub const HELP: &str = "/find - find a stranger to chat with\n\
        /next - leave the current chat and find someone new\n\
        /stop - end the current chat or stop searching\n\
        /rate <1-5> - rate your last partner\n\
        /myrating - show your rating\n\
        /setgender <male|female|other> - set your gender\n\
        /setpref <male|female|other|any> - set who you'd like to meet\n\
        /premium - activate premium matching\n\
        report <user id> - report a user";
    pub const ADMIN_HELP: &str = "Admin commands:\n\
        /ban <user id> - ghost-ban a user\n\
        /unban <user id> - lift a ban\n\
        /stats - service statistics\n\
        /logs <user id> - recent chat lines of a user";
    pub const CONNECTED: &str = "🔗 Connected to a stranger!";
    pub const SEARCHING: &str = "🔍 Searching for a partner...";
    pub const ALREADY_CHATTING: &str = "You are already chatting. Use /next or /stop.";
    pub const ALREADY_SEARCHING: &str = "You're already searching. Please wait...";
    pub const UNAVAILABLE: &str = "Unable to find a partner right now. Please try again later.";
    pub const PARTNER_LEFT: &str = "Your partner left the chat.";
    pub const PARTNER_DISCONNECTED: &str = "Your partner disconnected.";
    pub const RATE_PROMPT: &str = "Rate your partner: /rate 1–5";
    pub const STOPPED_SEARCHING: &str = "Stopped searching. Use /find to search again.";
    pub const IDLE: &str = "You are not in a chat. Use /find to start.";
    pub const USE_FIND: &str = "Use /find to start chatting.";
    pub const TEXT_ONLY: &str = "Only text messages can be relayed.";
    pub const NOT_DELIVERED: &str = "⚠️ Message not delivered.";
    pub const DELIVERY_FAILED: &str = "⚠️ Your message could not be delivered to your partner.";
    pub const INVALID_SCORE: &str = "Rating must be between 1 and 5.";
    pub const NOTHING_TO_RATE: &str = "You have no one to rate right now.";
    pub const NO_RATINGS: &str = "You have no ratings yet.";
    pub const OWNER_ONLY: &str = "This command is only available to bot owners.";
    pub const PREMIUM_ACTIVATED: &str =
        "⭐ Premium activated! Your matches now follow your preferences.";
    pub const REPORT_FILED: &str = "Thanks, your report has been filed.";
    pub const PREFERENCE_CLEARED: &str = "Preference cleared. You can be matched with anyone.";
    pub const GENERIC_FAILURE: &str = "Something went wrong, please try again later.";
}

/// Dispatcher settings taken from the application config
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub owner_ids: HashSet<UserId>,
    pub admin_ban_duration: chrono::Duration,
    pub log_page_size: usize,
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            owner_ids: config.telegram.owner_ids.iter().copied().collect(),
            admin_ban_duration: config.admin_ban_duration(),
            log_page_size: config.moderation.log_page_size,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Map a domain error to the reply shown to the user
pub fn reply_for_error(error: &ChatError) -> String {
    match error {
        ChatError::InvalidArgument { usage } => usage.clone(),
        ChatError::NotPaired { .. } => replies::USE_FIND.to_string(),
        ChatError::InvalidScore { .. } => replies::INVALID_SCORE.to_string(),
        ChatError::NoPendingTarget { .. } => replies::NOTHING_TO_RATE.to_string(),
        ChatError::Unauthorized { .. } => replies::OWNER_ONLY.to_string(),
        ChatError::DeliveryError { .. } => replies::DELIVERY_FAILED.to_string(),
        ChatError::Storage { .. }
        | ChatError::ConfigurationError { .. }
        | ChatError::InternalError { .. } => replies::GENERIC_FAILURE.to_string(),
    }
}

/// Executes inbound commands and relays text
pub struct ChatService {
    settings: ChatSettings,
    engine: Arc<MatchEngine>,
    ratings: Arc<RatingService>,
    guard: Arc<AbuseGuard>,
    relay: Arc<RelayService>,
    store: Arc<dyn ProfileStore>,
    transport: Arc<dyn Transport>,
    metrics_collector: Arc<MetricsCollector>,
}

impl ChatService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: ChatSettings,
        engine: Arc<MatchEngine>,
        ratings: Arc<RatingService>,
        guard: Arc<AbuseGuard>,
        relay: Arc<RelayService>,
        store: Arc<dyn ProfileStore>,
        transport: Arc<dyn Transport>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            settings,
            engine,
            ratings,
            guard,
            relay,
            store,
            transport,
            metrics_collector,
        }
    }

    pub fn engine(&self) -> Arc<MatchEngine> {
        self.engine.clone()
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.settings.owner_ids.contains(&user_id)
    }

    /// Process one inbound message inside a span carrying its event id
    pub async fn handle(&self, message: InboundMessage) -> Result<()> {
        let span = info_span!(
            "inbound",
            event_id = %message.event_id,
            user_id = message.sender
        );
        self.dispatch(message).instrument(span).await
    }

    async fn dispatch(&self, message: InboundMessage) -> Result<()> {
        let sender = message.sender;
        let timer = self.metrics_collector.start_timer();

        let (label, result) = match message.content {
            MessageContent::Text(text) => match parse_input(&text) {
                Ok(Input::Command(command)) => {
                    debug!("Executing /{} for {}", command.name(), sender);
                    (command.name(), self.execute(sender, command).await)
                }
                Ok(Input::Text(text)) => ("relay", self.relay_text(sender, &text).await),
                Err(e) => ("parse", Err(e.into())),
            },
            MessageContent::Unsupported { kind } => {
                ("media", self.reject_media(sender, &kind).await)
            }
        };

        let success = result.is_ok();
        if let Err(e) = result {
            self.reply_error(sender, label, e).await;
        }
        self.metrics_collector
            .record_command(label, success, timer.stop());
        Ok(())
    }

    async fn execute(&self, sender: UserId, command: Command) -> Result<()> {
        if command.is_admin() && !self.is_owner(sender) {
            return Err(ChatError::Unauthorized { user_id: sender }.into());
        }

        match command {
            Command::Start => {
                self.store.ensure_profile(sender).await?;
                self.send(sender, replies::WELCOME).await;
            }
            Command::Help => self.send(sender, replies::HELP).await,
            Command::Find => {
                let outcome = self.engine.find_partner(sender).await?;
                self.announce(sender, outcome).await;
            }
            Command::Next => {
                let next = self.engine.skip_and_rematch(sender).await?;
                if let Some(partner) = next.left_partner {
                    self.send(partner, replies::PARTNER_LEFT).await;
                }
                self.announce(sender, next.outcome).await;
            }
            Command::Stop => self.stop(sender).await?,
            Command::Rate(score) => {
                let receipt = self.ratings.submit(sender, score).await?;
                self.send(
                    sender,
                    &format!("Thanks! You rated your partner {}⭐", receipt.score),
                )
                .await;
            }
            Command::MyRating => {
                let summary = self.ratings.summary(sender).await?;
                let reply = match summary.average {
                    Some(average) => format!(
                        "⭐ Your rating: {:.2} from {} rating{}",
                        average,
                        summary.count,
                        if summary.count == 1 { "" } else { "s" }
                    ),
                    None => replies::NO_RATINGS.to_string(),
                };
                self.send(sender, &reply).await;
            }
            Command::SetGender(gender) => {
                let profile = self
                    .store
                    .upsert_profile(sender, ProfileUpdate::Gender(Some(gender)))
                    .await?;
                self.engine.refresh_waiting(&profile).await;
                self.send(sender, &format!("Gender set to {}.", gender))
                    .await;
            }
            Command::SetPreference(preference) => {
                let profile = self
                    .store
                    .upsert_profile(sender, ProfileUpdate::PreferredGender(preference))
                    .await?;
                self.engine.refresh_waiting(&profile).await;
                let reply = match preference {
                    Some(gender) => format!("Preference set to {}.", gender),
                    None => replies::PREFERENCE_CLEARED.to_string(),
                };
                self.send(sender, &reply).await;
            }
            Command::Premium => {
                let profile = self
                    .store
                    .upsert_profile(sender, ProfileUpdate::Premium(true))
                    .await?;
                self.engine.refresh_waiting(&profile).await;
                info!("User {} activated premium", sender);
                self.send(sender, replies::PREMIUM_ACTIVATED).await;
            }
            Command::Report(reported) => {
                self.guard.report(sender, reported).await?;
                self.send(sender, replies::REPORT_FILED).await;
            }
            Command::Admin => self.send(sender, replies::ADMIN_HELP).await,
            Command::Ban(target) => {
                let profile = self
                    .guard
                    .ban(target, self.settings.admin_ban_duration)
                    .await?;
                self.engine.refresh_waiting(&profile).await;
                info!("Owner {} banned user {}", sender, target);
                self.send(sender, &ban_notice(target, profile.ghost_ban_until))
                    .await;
            }
            Command::Unban(target) => {
                let profile = self.guard.unban(target).await?;
                self.engine.refresh_waiting(&profile).await;
                info!("Owner {} unbanned user {}", sender, target);
                self.send(sender, &format!("User {} is no longer banned.", target))
                    .await;
            }
            Command::Stats => {
                let reply = self.stats_report().await?;
                self.send(sender, &reply).await;
            }
            Command::Logs(target) => {
                let reply = self.logs_report(target).await?;
                self.send(sender, &reply).await;
            }
        }

        Ok(())
    }

    /// Tell the requester (and a new partner) how a search ended
    async fn announce(&self, user_id: UserId, outcome: MatchOutcome) {
        match outcome {
            MatchOutcome::Paired(partner) => {
                self.send(partner, replies::CONNECTED).await;
                self.send(user_id, replies::CONNECTED).await;
            }
            MatchOutcome::Searching => self.send(user_id, replies::SEARCHING).await,
            MatchOutcome::AlreadyPaired => self.send(user_id, replies::ALREADY_CHATTING).await,
            MatchOutcome::AlreadySearching => {
                self.send(user_id, replies::ALREADY_SEARCHING).await
            }
            MatchOutcome::Banned { until } => {
                debug!("Rejected search from {} (banned until {})", user_id, until);
                self.send(user_id, replies::UNAVAILABLE).await;
            }
        }
    }

    async fn stop(&self, sender: UserId) -> Result<()> {
        match self.engine.end_session(sender).await? {
            StopOutcome::Ended { partner } => {
                self.ratings.open_mutual_rating(sender, partner)?;
                self.send(partner, replies::PARTNER_DISCONNECTED).await;
                self.send(partner, replies::RATE_PROMPT).await;
                self.send(sender, replies::RATE_PROMPT).await;
            }
            StopOutcome::StoppedSearching => {
                self.send(sender, replies::STOPPED_SEARCHING).await
            }
            StopOutcome::Idle => self.send(sender, replies::IDLE).await,
        }
        Ok(())
    }

    async fn relay_text(&self, sender: UserId, text: &str) -> Result<()> {
        match self.relay.relay(sender, text).await? {
            RelayOutcome::Delivered { .. } => {}
            RelayOutcome::Blocked { reason } => {
                self.send(sender, &format!("⚠️ Message not delivered: {}", reason))
                    .await
            }
            // Silent moderation: the sender only sees a generic rejection
            RelayOutcome::Banned { .. } => self.send(sender, replies::NOT_DELIVERED).await,
        }
        Ok(())
    }

    async fn reject_media(&self, sender: UserId, kind: &str) -> Result<()> {
        debug!("Dropping {} message from {}", kind, sender);
        let reply = if self.engine.partner_of(sender).await.is_some() {
            replies::TEXT_ONLY
        } else {
            replies::USE_FIND
        };
        self.send(sender, reply).await;
        Ok(())
    }

    async fn stats_report(&self) -> Result<String> {
        let engine = self.engine.stats().await;
        let store = self.store.stats().await?;
        Ok(format!(
            "📊 Stats\n\
             Users: {}\n\
             Premium users: {}\n\
             Waiting: {}\n\
             Active chats: {}\n\
             Pairs formed: {}\n\
             Reports: {}\n\
             Chat lines: {}",
            store.users,
            store.premium_users,
            engine.users_waiting,
            engine.active_sessions,
            engine.pairs_formed,
            store.reports,
            store.chat_lines
        ))
    }

    async fn logs_report(&self, target: UserId) -> Result<String> {
        let entries = self
            .store
            .recent_logs(target, self.settings.log_page_size)
            .await?;
        if entries.is_empty() {
            return Ok(format!("No chat lines for user {}.", target));
        }

        let mut report = format!("Last {} line(s) for user {}:", entries.len(), target);
        for entry in entries {
            report.push_str(&format!(
                "\n[{}] {} -> {}: {}",
                format_timestamp(entry.timestamp),
                entry.user_id,
                entry.partner_id,
                preview(&entry.content)
            ));
        }
        Ok(report)
    }

    async fn reply_error(&self, user_id: UserId, label: &str, error: anyhow::Error) {
        let reply = match error.downcast_ref::<ChatError>() {
            Some(chat_error) => {
                self.metrics_collector
                    .record_command_error(chat_error.kind());
                if chat_error.is_user_error() {
                    debug!("Rejected {} from {}: {}", label, user_id, chat_error);
                } else {
                    error!("Failed to handle {} from {}: {}", label, user_id, chat_error);
                }
                reply_for_error(chat_error)
            }
            None => {
                self.metrics_collector.record_command_error("internal");
                error!("Failed to handle {} from {}: {:#}", label, user_id, error);
                replies::GENERIC_FAILURE.to_string()
            }
        };
        self.send(user_id, &reply).await;
    }

    /// Best-effort send; failures are counted and logged
    async fn send(&self, user_id: UserId, text: &str) {
        if let Err(e) = self.transport.send(user_id, text).await {
            self.metrics_collector.record_delivery_failure();
            warn!("Failed to send reply to {}: {}", user_id, e);
        }
    }
}

#[async_trait]
impl InboundHandler for ChatService {
    async fn handle_inbound(&self, message: InboundMessage) -> Result<()> {
        self.handle(message).await
    }
}

fn ban_notice(user_id: UserId, until: Timestamp) -> String {
    format!("User {} is banned until {}.", user_id, format_timestamp(until))
}

/// Shorten a chat line for the admin log view
fn preview(content: &str) -> String {
    const MAX_CHARS: usize = 200;
    if content.chars().count() <= MAX_CHARS {
        content.to_string()
    } else {
        let head: String = content.chars().take(MAX_CHARS).collect();
        format!("{}…", head)
    }
}
