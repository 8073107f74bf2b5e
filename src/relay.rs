//! Message relay between session partners
//!
//! Every outgoing line is inspected by the abuse guard. Allowed lines are
//! logged before delivery so the log is complete even when delivery fails.

use crate::error::{ChatError, Result};
use crate::matching::MatchEngine;
use crate::metrics::MetricsCollector;
use crate::moderation::{AbuseGuard, Verdict};
use crate::storage::ProfileStore;
use crate::transport::Transport;
use crate::types::{ChatLogEntry, Timestamp, UserId};
use crate::utils::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of relaying one message
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// Forwarded to `partner`
    Delivered { partner: UserId },
    /// Dropped; the sender stays in the session
    Blocked { reason: String },
    /// Dropped and the sender is now ghost-banned
    Banned { until: Timestamp },
}

/// Forwards text between partners
pub struct RelayService {
    engine: Arc<MatchEngine>,
    guard: Arc<AbuseGuard>,
    store: Arc<dyn ProfileStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    metrics_collector: Arc<MetricsCollector>,
}

impl RelayService {
    pub fn new(
        engine: Arc<MatchEngine>,
        guard: Arc<AbuseGuard>,
        store: Arc<dyn ProfileStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            engine,
            guard,
            store,
            transport,
            clock,
            metrics_collector,
        }
    }

    /// Relay `content` from `sender` to their current partner
    pub async fn relay(&self, sender: UserId, content: &str) -> Result<RelayOutcome> {
        let partner = self
            .engine
            .partner_of(sender)
            .await
            .ok_or(ChatError::NotPaired { user_id: sender })?;

        let profile = self.store.ensure_profile(sender).await?;

        match self.guard.inspect(&profile, content) {
            Verdict::Allow => {
                let entry =
                    ChatLogEntry::text(sender, partner, self.clock.unix_now(), content);
                self.store.append_log(&entry).await?;

                if let Err(e) = self.transport.send(partner, content).await {
                    self.metrics_collector.record_delivery_failure();
                    warn!("Delivery from {} to {} failed: {}", sender, partner, e);
                    return Err(e);
                }

                self.metrics_collector.record_relay();
                debug!("Relayed message from {} to {}", sender, partner);
                Ok(RelayOutcome::Delivered { partner })
            }
            Verdict::Block { reason } => {
                self.metrics_collector.record_block(&reason);
                info!("Blocked message from {}: {}", sender, reason);
                Ok(RelayOutcome::Blocked { reason })
            }
            Verdict::Ban { duration } => {
                self.metrics_collector.record_block("link");
                let until = self.guard.enforce_link_ban(sender, duration).await?;
                if let Some(profile) = self.store.get_profile(sender).await? {
                    self.engine.refresh_waiting(&profile).await;
                }
                Ok(RelayOutcome::Banned { until })
            }
        }
    }
}
