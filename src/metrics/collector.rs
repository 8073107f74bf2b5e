//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the tete-a-tete chat relay
//! using Prometheus metrics.

use crate::matching::EngineStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the chat service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Matchmaking metrics
    match_metrics: MatchMetrics,

    /// Moderation metrics
    moderation_metrics: ModerationMetrics,

    /// Rating metrics
    rating_metrics: RatingMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total inbound commands processed
    pub commands_total: IntCounterVec,

    /// Command failures by error kind
    pub command_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Matchmaking metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Pairings formed, by requester tier
    pub pairings_total: IntCounterVec,

    /// Users that entered the waiting pool
    pub searches_started_total: IntCounter,

    /// Sessions ended, by how they ended
    pub sessions_ended_total: IntCounterVec,

    /// Users currently waiting
    pub users_waiting: IntGauge,

    /// Sessions currently active
    pub active_sessions: IntGauge,

    /// Time spent in the pool before pairing
    pub wait_time_seconds: Histogram,
}

/// Moderation metrics
#[derive(Clone)]
pub struct ModerationMetrics {
    /// Messages forwarded to a partner
    pub messages_relayed_total: IntCounter,

    /// Messages dropped, by reason
    pub messages_blocked_total: IntCounterVec,

    /// Ghost-bans applied, by source
    pub bans_total: IntCounterVec,

    /// Abuse reports filed, by source
    pub reports_total: IntCounterVec,
}

/// Rating metrics
#[derive(Clone)]
pub struct RatingMetrics {
    /// Ratings accepted
    pub ratings_submitted_total: IntCounter,

    /// Distribution of submitted scores
    pub score_distribution: Histogram,

    /// Open rating obligations
    pub pending_ratings: IntGauge,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Command processing time
    pub command_duration: HistogramVec,

    /// Pool scan time
    pub match_scan_duration: Histogram,

    /// Failed outbound deliveries
    pub delivery_failures_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let moderation_metrics = ModerationMetrics::new(&registry)?;
        let rating_metrics = RatingMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            match_metrics,
            moderation_metrics,
            rating_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get matchmaking metrics
    pub fn matching(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    /// Get moderation metrics
    pub fn moderation(&self) -> &ModerationMetrics {
        &self.moderation_metrics
    }

    /// Get rating metrics
    pub fn rating(&self) -> &RatingMetrics {
        &self.rating_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Update gauges from engine stats
    pub fn update_from_engine_stats(&self, stats: &EngineStats) {
        self.match_metrics
            .users_waiting
            .set(stats.users_waiting as i64);
        self.match_metrics
            .active_sessions
            .set(stats.active_sessions as i64);
    }

    /// Record an inbound command being processed
    pub fn record_command(&self, command: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .commands_total
            .with_label_values(&[command, status])
            .inc();

        self.performance_metrics
            .command_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    /// Record a failed command by error kind
    pub fn record_command_error(&self, kind: &str) {
        self.service_metrics
            .command_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record a user entering the waiting pool
    pub fn record_search_started(&self) {
        self.match_metrics.searches_started_total.inc();
    }

    /// Record a pairing formed for a requester of the given tier
    pub fn record_pairing(&self, premium: bool, waited: Duration) {
        let tier = if premium { "premium" } else { "standard" };

        self.match_metrics
            .pairings_total
            .with_label_values(&[tier])
            .inc();

        self.match_metrics
            .wait_time_seconds
            .observe(waited.as_secs_f64());
    }

    /// Record a session ending (`stop` or `next`)
    pub fn record_session_ended(&self, reason: &str) {
        self.match_metrics
            .sessions_ended_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a pool scan duration
    pub fn record_match_scan(&self, duration: Duration) {
        self.performance_metrics
            .match_scan_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a message forwarded to a partner
    pub fn record_relay(&self) {
        self.moderation_metrics.messages_relayed_total.inc();
    }

    /// Record a message dropped by moderation
    pub fn record_block(&self, reason: &str) {
        self.moderation_metrics
            .messages_blocked_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a ghost-ban (`link`, `admin`)
    pub fn record_ban(&self, source: &str) {
        self.moderation_metrics
            .bans_total
            .with_label_values(&[source])
            .inc();
    }

    /// Record an abuse report (`user`, `system`)
    pub fn record_report(&self, source: &str) {
        self.moderation_metrics
            .reports_total
            .with_label_values(&[source])
            .inc();
    }

    /// Record an accepted rating
    pub fn record_rating(&self, score: i64) {
        self.rating_metrics.ratings_submitted_total.inc();
        self.rating_metrics.score_distribution.observe(score as f64);
    }

    /// Update the number of open rating obligations
    pub fn update_pending_ratings(&self, pending: usize) {
        self.rating_metrics.pending_ratings.set(pending as i64);
    }

    /// Record a failed outbound delivery
    pub fn record_delivery_failure(&self) {
        self.performance_metrics.delivery_failures_total.inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Update service uptime
    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("tete_a_tete_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let commands_total = IntCounterVec::new(
            Opts::new(
                "tete_a_tete_commands_total",
                "Total inbound commands processed",
            ),
            &["command", "status"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let command_errors_total = IntCounterVec::new(
            Opts::new("tete_a_tete_command_errors_total", "Total command errors"),
            &["kind"],
        )?;
        registry.register(Box::new(command_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "tete_a_tete_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("tete_a_tete_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            commands_total,
            command_errors_total,
            health_status,
            component_health,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let pairings_total = IntCounterVec::new(
            Opts::new("tete_a_tete_pairings_total", "Total pairings formed"),
            &["tier"],
        )?;
        registry.register(Box::new(pairings_total.clone()))?;

        let searches_started_total = IntCounter::new(
            "tete_a_tete_searches_started_total",
            "Users that entered the waiting pool",
        )?;
        registry.register(Box::new(searches_started_total.clone()))?;

        let sessions_ended_total = IntCounterVec::new(
            Opts::new("tete_a_tete_sessions_ended_total", "Total sessions ended"),
            &["reason"],
        )?;
        registry.register(Box::new(sessions_ended_total.clone()))?;

        let users_waiting = IntGauge::new("tete_a_tete_users_waiting", "Users currently waiting")?;
        registry.register(Box::new(users_waiting.clone()))?;

        let active_sessions =
            IntGauge::new("tete_a_tete_active_sessions", "Sessions currently active")?;
        registry.register(Box::new(active_sessions.clone()))?;

        let wait_time_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "tete_a_tete_wait_time_seconds",
                "Time spent waiting before pairing",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        )?;
        registry.register(Box::new(wait_time_seconds.clone()))?;

        Ok(Self {
            pairings_total,
            searches_started_total,
            sessions_ended_total,
            users_waiting,
            active_sessions,
            wait_time_seconds,
        })
    }
}

impl ModerationMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let messages_relayed_total = IntCounter::new(
            "tete_a_tete_messages_relayed_total",
            "Messages forwarded to a partner",
        )?;
        registry.register(Box::new(messages_relayed_total.clone()))?;

        let messages_blocked_total = IntCounterVec::new(
            Opts::new(
                "tete_a_tete_messages_blocked_total",
                "Messages dropped by moderation",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(messages_blocked_total.clone()))?;

        let bans_total = IntCounterVec::new(
            Opts::new("tete_a_tete_bans_total", "Ghost-bans applied"),
            &["source"],
        )?;
        registry.register(Box::new(bans_total.clone()))?;

        let reports_total = IntCounterVec::new(
            Opts::new("tete_a_tete_reports_total", "Abuse reports filed"),
            &["source"],
        )?;
        registry.register(Box::new(reports_total.clone()))?;

        Ok(Self {
            messages_relayed_total,
            messages_blocked_total,
            bans_total,
            reports_total,
        })
    }
}

impl RatingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let ratings_submitted_total = IntCounter::new(
            "tete_a_tete_ratings_submitted_total",
            "Ratings accepted",
        )?;
        registry.register(Box::new(ratings_submitted_total.clone()))?;

        let score_distribution = Histogram::with_opts(
            HistogramOpts::new("tete_a_tete_rating_scores", "Submitted rating scores")
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
        )?;
        registry.register(Box::new(score_distribution.clone()))?;

        let pending_ratings = IntGauge::new(
            "tete_a_tete_pending_ratings",
            "Open rating obligations",
        )?;
        registry.register(Box::new(pending_ratings.clone()))?;

        Ok(Self {
            ratings_submitted_total,
            score_distribution,
            pending_ratings,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "tete_a_tete_command_duration_seconds",
                "Command processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let match_scan_duration = Histogram::with_opts(
            HistogramOpts::new(
                "tete_a_tete_match_scan_duration_seconds",
                "Waiting pool scan time",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(match_scan_duration.clone()))?;

        let delivery_failures_total = IntCounter::new(
            "tete_a_tete_delivery_failures_total",
            "Failed outbound deliveries",
        )?;
        registry.register(Box::new(delivery_failures_total.clone()))?;

        Ok(Self {
            command_duration,
            match_scan_duration,
            delivery_failures_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        // Test that we can access all metric groups
        let _service = collector.service();
        let _matching = collector.matching();
        let _moderation = collector.moderation();
        let _rating = collector.rating();
        let _performance = collector.performance();
    }

    #[test]
    fn test_command_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_command("find", true, Duration::from_millis(3));
        collector.record_command("rate", false, Duration::from_millis(1));
        collector.record_command_error("invalid_score");

        assert_eq!(
            collector
                .service()
                .commands_total
                .with_label_values(&["find", "success"])
                .get(),
            1
        );
        assert_eq!(
            collector
                .service()
                .command_errors_total
                .with_label_values(&["invalid_score"])
                .get(),
            1
        );
    }

    #[test]
    fn test_match_and_moderation_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_search_started();
        collector.record_pairing(true, Duration::from_secs(4));
        collector.record_session_ended("stop");
        collector.record_relay();
        collector.record_block("link");
        collector.record_ban("link");
        collector.record_report("system");
        collector.record_rating(5);
        collector.update_pending_ratings(2);

        assert_eq!(
            collector
                .matching()
                .pairings_total
                .with_label_values(&["premium"])
                .get(),
            1
        );
        assert_eq!(collector.moderation().messages_relayed_total.get(), 1);
        assert_eq!(collector.rating().pending_ratings.get(), 2);
    }

    #[test]
    fn test_engine_stats_update_gauges() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        collector.update_from_engine_stats(&EngineStats {
            users_waiting: 3,
            active_sessions: 2,
            ..Default::default()
        });

        assert_eq!(collector.matching().users_waiting.get(), 3);
        assert_eq!(collector.matching().active_sessions.get(), 2);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();

        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}
