//! Rating service: pending obligations and score submission

use crate::error::{ChatError, Result};
use crate::metrics::MetricsCollector;
use crate::rating::pending::PendingRatings;
use crate::storage::ProfileStore;
use crate::types::{UserId, MAX_RATING, MIN_RATING};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Result of an accepted rating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingReceipt {
    pub ratee: UserId,
    pub score: i64,
    /// Ratee's average after this score
    pub average: f64,
    pub count: i64,
}

/// A user's rating summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// `None` until the user has been rated at least once
    pub average: Option<f64>,
    pub count: i64,
}

/// Tracks who may rate whom and records submitted scores
pub struct RatingService {
    pending: Mutex<PendingRatings>,
    store: Arc<dyn ProfileStore>,
    metrics_collector: Arc<MetricsCollector>,
}

impl RatingService {
    pub fn new(store: Arc<dyn ProfileStore>, metrics_collector: Arc<MetricsCollector>) -> Self {
        Self {
            pending: Mutex::new(PendingRatings::new()),
            store,
            metrics_collector,
        }
    }

    fn pending(&self) -> Result<std::sync::MutexGuard<'_, PendingRatings>> {
        self.pending.lock().map_err(|_| {
            ChatError::InternalError {
                message: "Failed to acquire pending ratings lock".to_string(),
            }
            .into()
        })
    }

    /// Open mutual obligations after a stopped session
    pub fn open_mutual_rating(&self, a: UserId, b: UserId) -> Result<()> {
        let mut pending = self.pending()?;
        pending.open_mutual(a, b);
        self.metrics_collector.update_pending_ratings(pending.len());
        info!("Users {} and {} may now rate each other", a, b);
        Ok(())
    }

    /// Former partner `rater` may currently rate
    pub fn pending_target(&self, rater: UserId) -> Result<Option<UserId>> {
        Ok(self.pending()?.target_of(rater))
    }

    /// Submit a score for the rater's pending target
    ///
    /// The score range is checked before the obligation so an out-of-range
    /// score never consumes it. If the store write fails the obligation is
    /// restored.
    pub async fn submit(&self, rater: UserId, score: i64) -> Result<RatingReceipt> {
        if !(MIN_RATING..=MAX_RATING).contains(&score) {
            return Err(ChatError::InvalidScore { score }.into());
        }

        let ratee = {
            let mut pending = self.pending()?;
            let ratee = pending
                .take(rater)
                .ok_or(ChatError::NoPendingTarget { user_id: rater })?;
            self.metrics_collector.update_pending_ratings(pending.len());
            ratee
        };

        let profile = match self.store.record_rating(ratee, score).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(
                    "Failed to record rating from {} for {}: {}; restoring obligation",
                    rater, ratee, e
                );
                let mut pending = self.pending()?;
                pending.restore(rater, ratee);
                self.metrics_collector.update_pending_ratings(pending.len());
                return Err(e);
            }
        };

        self.metrics_collector.record_rating(score);
        let average = profile.average_rating().unwrap_or(0.0);
        info!(
            "User {} rated {} with {} (average now {:.2} over {})",
            rater, ratee, score, average, profile.rating_count
        );

        Ok(RatingReceipt {
            ratee,
            score,
            average,
            count: profile.rating_count,
        })
    }

    /// Average and count of a user's received ratings
    pub async fn summary(&self, user_id: UserId) -> Result<RatingSummary> {
        let profile = self.store.ensure_profile(user_id).await?;
        Ok(RatingSummary {
            average: profile.average_rating(),
            count: profile.rating_count,
        })
    }
}
