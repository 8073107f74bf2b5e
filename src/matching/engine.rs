//! Match engine coordinating the waiting pool and the session table
//!
//! Every operation takes the state lock for its whole duration, including the
//! profile reads it needs, so concurrent find/next/stop requests are applied
//! one at a time and can never pair the same waiting user twice.

use crate::error::Result;
use crate::matching::pool::WaitingPool;
use crate::matching::scorer::{PreferenceScorer, Scorer};
use crate::matching::sessions::SessionTable;
use crate::metrics::MetricsCollector;
use crate::storage::{ProfileStore, ProfileUpdate};
use crate::types::{Timestamp, UserId, UserProfile, WaitingEntry};
use crate::utils::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of a find (or the rematch half of a next) request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Paired with the given partner
    Paired(UserId),
    /// No eligible partner; the requester is now waiting
    Searching,
    /// The requester already has a partner; nothing changed
    AlreadyPaired,
    /// The requester is already waiting; nothing changed
    AlreadySearching,
    /// The requester is ghost-banned until the given time; nothing changed
    Banned { until: Timestamp },
}

/// Result of a next request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextOutcome {
    /// Partner whose session was ended, if any
    pub left_partner: Option<UserId>,
    pub outcome: MatchOutcome,
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session with `partner` was ended
    Ended { partner: UserId },
    /// The requester was removed from the waiting pool
    StoppedSearching,
    /// The requester was neither paired nor waiting
    Idle,
}

/// Statistics about engine operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Total number of pairings formed
    pub pairs_formed: u64,
    /// Total number of users that entered the pool
    pub searches_started: u64,
    /// Total number of sessions ended by stop or next
    pub sessions_ended: u64,
    /// Current number of users waiting
    pub users_waiting: usize,
    /// Current number of active sessions
    pub active_sessions: usize,
}

/// Matchmaking state guarded by the engine lock
#[derive(Debug, Default)]
pub struct MatchState {
    pool: WaitingPool,
    sessions: SessionTable,
    stats: EngineStats,
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self) -> &WaitingPool {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Enqueue a user who is neither paired nor already waiting
    pub fn enqueue(&mut self, entry: WaitingEntry) -> bool {
        if self.sessions.contains(entry.user_id) || !self.pool.enqueue(entry) {
            return false;
        }
        self.stats.searches_started += 1;
        true
    }

    /// Pick the best eligible waiting candidate for `requester`
    ///
    /// Candidates are visited in enqueue order and a later candidate replaces
    /// the current best only with a strictly higher score, so ties go to the
    /// earliest waiter. Banned candidates and `avoid` are skipped.
    pub fn select_partner(
        &self,
        requester: &WaitingEntry,
        now: Timestamp,
        scorer: &dyn Scorer,
        avoid: Option<UserId>,
    ) -> Option<WaitingEntry> {
        let mut best_score = -1.0;
        let mut best = None;

        for candidate in self.pool.candidates(requester.user_id) {
            if candidate.is_banned(now)
                || Some(candidate.user_id) == avoid
                || self.sessions.contains(candidate.user_id)
            {
                continue;
            }

            let score = scorer.score(requester, &candidate);
            if score > best_score {
                best_score = score;
                best = Some(candidate);
            }
        }

        best
    }

    /// Move `partner` out of the pool and into a session with `requester`
    pub fn pair_users(&mut self, requester: UserId, partner: UserId) -> bool {
        if self.pool.contains(requester) || !self.sessions.pair(requester, partner) {
            return false;
        }
        self.pool.remove(partner);
        self.stats.pairs_formed += 1;
        true
    }

    /// Pair the requester with the best candidate, or enqueue them
    pub fn match_or_enqueue(
        &mut self,
        requester: WaitingEntry,
        now: Timestamp,
        scorer: &dyn Scorer,
        avoid: Option<UserId>,
    ) -> Resolution {
        if requester.is_banned(now) {
            return Resolution {
                outcome: MatchOutcome::Banned {
                    until: requester.ghost_ban_until,
                },
                partner: None,
                enqueued: false,
            };
        }

        match self.select_partner(&requester, now, scorer, avoid) {
            Some(partner) if self.pair_users(requester.user_id, partner.user_id) => Resolution {
                outcome: MatchOutcome::Paired(partner.user_id),
                partner: Some(partner),
                enqueued: false,
            },
            _ => Resolution {
                outcome: MatchOutcome::Searching,
                partner: None,
                enqueued: self.enqueue(requester),
            },
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            users_waiting: self.pool.len(),
            active_sessions: self.sessions.active_sessions(),
            ..self.stats.clone()
        }
    }
}

/// Result of one scan of the waiting pool
#[derive(Debug, Clone)]
pub struct Resolution {
    pub outcome: MatchOutcome,
    /// Snapshot of the partner as it sat in the pool
    pub partner: Option<WaitingEntry>,
    /// Whether the requester was added to the pool
    pub enqueued: bool,
}

/// The match engine
#[derive(Clone)]
pub struct MatchEngine {
    state: Arc<Mutex<MatchState>>,
    store: Arc<dyn ProfileStore>,
    scorer: Arc<dyn Scorer>,
    clock: Arc<dyn Clock>,
    metrics_collector: Arc<MetricsCollector>,
    avoid_immediate_rematch: bool,
}

impl MatchEngine {
    /// Create an engine with the default preference scorer
    pub fn new(
        store: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(MatchState::new())),
            store,
            scorer: Arc::new(PreferenceScorer::new()),
            clock,
            metrics_collector,
            avoid_immediate_rematch: false,
        }
    }

    /// Replace the scoring strategy
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Whether `next` skips the partner just left when rescanning
    pub fn with_rematch_avoidance(mut self, avoid: bool) -> Self {
        self.avoid_immediate_rematch = avoid;
        self
    }

    /// Handle a find request
    pub async fn find_partner(&self, user_id: UserId) -> Result<MatchOutcome> {
        let mut state = self.state.lock().await;

        if state.sessions.contains(user_id) {
            debug!("User {} asked to find while paired", user_id);
            return Ok(MatchOutcome::AlreadyPaired);
        }
        if state.pool.contains(user_id) {
            debug!("User {} asked to find while already waiting", user_id);
            return Ok(MatchOutcome::AlreadySearching);
        }

        let profile = self.store.ensure_profile(user_id).await?;
        let outcome = self.resolve(&mut state, &profile, None);
        self.metrics_collector
            .update_from_engine_stats(&state.stats());
        drop(state);

        self.remember_partners(user_id, outcome).await;
        Ok(outcome)
    }

    /// Handle a next request: end the current session (re-enqueueing the old
    /// partner) and immediately search again
    pub async fn skip_and_rematch(&self, user_id: UserId) -> Result<NextOutcome> {
        let mut state = self.state.lock().await;

        let partner = state.sessions.partner_of(user_id);
        if partner.is_none() && state.pool.contains(user_id) {
            debug!("User {} asked for next while already waiting", user_id);
            return Ok(NextOutcome {
                left_partner: None,
                outcome: MatchOutcome::AlreadySearching,
            });
        }

        // All reads happen before any mutation so a storage failure leaves
        // the pool and the session table untouched.
        let partner_profile = match partner {
            Some(partner_id) => Some(self.store.ensure_profile(partner_id).await?),
            None => None,
        };
        let profile = self.store.ensure_profile(user_id).await?;
        let now = self.clock.now();

        if let Some(partner_profile) = partner_profile {
            state.sessions.unpair(user_id);
            state.stats.sessions_ended += 1;
            self.metrics_collector.record_session_ended("next");
            info!(
                "User {} left session with {}, re-enqueueing partner",
                user_id, partner_profile.user_id
            );

            // A banned partner waits too; selection skips them until the ban ends
            if state.enqueue(WaitingEntry::from_profile(&partner_profile, now)) {
                self.metrics_collector.record_search_started();
            }
        }

        let avoid = partner.filter(|_| self.avoid_immediate_rematch);
        let outcome = self.resolve(&mut state, &profile, avoid);
        self.metrics_collector
            .update_from_engine_stats(&state.stats());
        drop(state);

        self.remember_partners(user_id, outcome).await;
        Ok(NextOutcome {
            left_partner: partner,
            outcome,
        })
    }

    /// Handle a stop request
    pub async fn end_session(&self, user_id: UserId) -> Result<StopOutcome> {
        let mut state = self.state.lock().await;

        let outcome = if let Some(partner) = state.sessions.unpair(user_id) {
            state.stats.sessions_ended += 1;
            self.metrics_collector.record_session_ended("stop");
            info!("User {} ended session with {}", user_id, partner);
            StopOutcome::Ended { partner }
        } else if state.pool.remove(user_id).is_some() {
            info!("User {} stopped searching", user_id);
            StopOutcome::StoppedSearching
        } else {
            debug!("User {} asked to stop while idle", user_id);
            StopOutcome::Idle
        };

        self.metrics_collector
            .update_from_engine_stats(&state.stats());
        Ok(outcome)
    }

    /// Current partner of a user
    pub async fn partner_of(&self, user_id: UserId) -> Option<UserId> {
        self.state.lock().await.sessions.partner_of(user_id)
    }

    pub async fn is_waiting(&self, user_id: UserId) -> bool {
        self.state.lock().await.pool.contains(user_id)
    }

    /// Refresh a waiting user's snapshot after their profile changed
    pub async fn refresh_waiting(&self, profile: &UserProfile) -> bool {
        let now = self.clock.now();
        let refreshed = self
            .state
            .lock()
            .await
            .pool
            .refresh(WaitingEntry::from_profile(profile, now));
        if refreshed {
            debug!("Refreshed waiting snapshot for user {}", profile.user_id);
        }
        refreshed
    }

    pub async fn stats(&self) -> EngineStats {
        self.state.lock().await.stats()
    }

    fn resolve(
        &self,
        state: &mut MatchState,
        profile: &UserProfile,
        avoid: Option<UserId>,
    ) -> MatchOutcome {
        let now = self.clock.now();
        let requester = WaitingEntry::from_profile(profile, now);
        let user_id = requester.user_id;
        let is_premium = requester.is_premium;

        let timer = self.metrics_collector.start_timer();
        let resolution =
            state.match_or_enqueue(requester, now.timestamp(), self.scorer.as_ref(), avoid);
        self.metrics_collector.record_match_scan(timer.stop());

        match resolution.outcome {
            MatchOutcome::Banned { until } => {
                debug!("User {} is ghost-banned until {}", user_id, until);
            }
            MatchOutcome::Paired(partner_id) => {
                let waited = resolution
                    .partner
                    .and_then(|partner| (now - partner.joined_at).to_std().ok())
                    .unwrap_or_default();
                self.metrics_collector.record_pairing(is_premium, waited);
                info!(
                    "Paired user {} with {} (premium requester: {}, partner waited {}s)",
                    user_id,
                    partner_id,
                    is_premium,
                    waited.as_secs()
                );
            }
            _ => {
                if resolution.enqueued {
                    self.metrics_collector.record_search_started();
                }
                info!(
                    "User {} is now waiting ({} in pool)",
                    user_id,
                    state.pool.len()
                );
            }
        }

        resolution.outcome
    }

    async fn remember_partners(&self, user_id: UserId, outcome: MatchOutcome) {
        let MatchOutcome::Paired(partner) = outcome else {
            return;
        };

        for (user, other) in [(user_id, partner), (partner, user_id)] {
            if let Err(e) = self
                .store
                .upsert_profile(user, ProfileUpdate::LastPartner(other))
                .await
            {
                warn!("Failed to record last partner for {}: {}", user, e);
            }
        }
    }
}
