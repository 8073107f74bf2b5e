//! Test fixtures for integration testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tete_a_tete::config::ModerationSettings;
use tete_a_tete::error::{ChatError, Result};
use tete_a_tete::matching::MatchEngine;
use tete_a_tete::metrics::MetricsCollector;
use tete_a_tete::moderation::AbuseGuard;
use tete_a_tete::rating::RatingService;
use tete_a_tete::relay::RelayService;
use tete_a_tete::service::{ChatService, ChatSettings};
use tete_a_tete::storage::InMemoryStore;
use tete_a_tete::transport::{InboundMessage, Transport};
use tete_a_tete::types::UserId;
use tete_a_tete::utils::ManualClock;

/// Transport that records every outgoing message
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(UserId, String)>>,
    unreachable: Mutex<HashSet<UserId>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deliveries to `user_id` fail
    pub fn set_unreachable(&self, user_id: UserId) {
        if let Ok(mut unreachable) = self.unreachable.lock() {
            unreachable.insert(user_id);
        }
    }

    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// All texts delivered to one user, oldest first
    pub fn messages_to(&self, user_id: UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == user_id)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn last_to(&self, user_id: UserId) -> Option<String> {
        self.messages_to(user_id).pop()
    }

    pub fn count(&self) -> usize {
        self.sent().len()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, user_id: UserId, text: &str) -> Result<()> {
        let unreachable = self
            .unreachable
            .lock()
            .map(|u| u.contains(&user_id))
            .unwrap_or(false);
        if unreachable {
            return Err(ChatError::DeliveryError {
                user_id,
                message: "bot was blocked by the user".to_string(),
            }
            .into());
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push((user_id, text.to_string()));
        }
        Ok(())
    }
}

pub const OWNER: UserId = 1000;

pub fn start_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

/// A complete chat system over in-memory storage and a manual clock
pub struct TestSystem {
    pub service: ChatService,
    pub engine: Arc<MatchEngine>,
    pub store: Arc<InMemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestSystem {
    pub fn new() -> Self {
        Self::with_moderation(ModerationSettings::default())
    }

    pub fn with_moderation(moderation: ModerationSettings) -> Self {
        Self::build(moderation, false)
    }

    /// A system whose `/next` never re-pairs the partner just left
    pub fn avoiding_rematch() -> Self {
        Self::build(ModerationSettings::default(), true)
    }

    fn build(moderation: ModerationSettings, avoid_rematch: bool) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let metrics = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        let transport = Arc::new(RecordingTransport::new());

        let engine = Arc::new(
            MatchEngine::new(store.clone(), clock.clone(), metrics.clone())
                .with_rematch_avoidance(avoid_rematch),
        );
        let guard = Arc::new(
            AbuseGuard::new(&moderation, store.clone(), clock.clone(), metrics.clone())
                .expect("valid moderation settings"),
        );
        let ratings = Arc::new(RatingService::new(store.clone(), metrics.clone()));
        let relay = Arc::new(RelayService::new(
            engine.clone(),
            guard.clone(),
            store.clone(),
            transport.clone(),
            clock.clone(),
            metrics.clone(),
        ));
        let settings = ChatSettings {
            owner_ids: [OWNER].into_iter().collect(),
            ..ChatSettings::default()
        };
        let service = ChatService::new(
            settings,
            engine.clone(),
            ratings,
            guard,
            relay,
            store.clone(),
            transport.clone(),
            metrics.clone(),
        );

        Self {
            service,
            engine,
            store,
            transport,
            clock,
            metrics,
        }
    }

    /// Deliver one text message from `user_id`
    pub async fn say(&self, user_id: UserId, text: &str) {
        self.service
            .handle(InboundMessage::text(user_id, text))
            .await
            .expect("dispatcher recovers all errors");
    }

    /// Pair two fresh users through /find
    pub async fn pair(&self, a: UserId, b: UserId) {
        self.say(a, "/find").await;
        self.say(b, "/find").await;
        assert_eq!(self.engine.partner_of(a).await, Some(b));
    }
}
