//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the chat relay
//! service, including readiness and liveness probes.

use crate::matching::MatchEngine;
use crate::storage::ProfileStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Longest time the engine lock may take before the engine counts as degraded
const ENGINE_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported through the metrics collector
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.as_gauge() <= other.as_gauge() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Components a health check looks at
pub struct HealthProbe {
    service_name: String,
    engine: Arc<MatchEngine>,
    store: Arc<dyn ProfileStore>,
    running: RwLock<bool>,
    started_at: Instant,
}

impl HealthProbe {
    pub fn new(
        service_name: impl Into<String>,
        engine: Arc<MatchEngine>,
        store: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            engine,
            store,
            running: RwLock::new(false),
            started_at: Instant::now(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub async fn set_running(&self, running: bool) {
        *self.running.write().await = running;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub users_waiting: usize,
    pub active_sessions: usize,
    pub pairs_formed: u64,
    pub sessions_ended: u64,
    /// Profiles in the store; zero when the store is unreachable
    pub registered_users: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(probe: &HealthProbe) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(probe).await,
            Self::check_engine(probe).await,
            Self::check_storage(probe).await,
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, c| acc.worst(c.status.clone()));
        let stats = Self::gather_service_stats(probe).await;

        Ok(HealthCheck {
            status,
            service: probe.service_name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(probe: &HealthProbe) -> Result<HealthStatus> {
        if probe.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - the service must be running and storage reachable
    pub async fn readiness_check(probe: &HealthProbe) -> Result<HealthStatus> {
        if !probe.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let storage = Self::check_storage(probe).await.status;
        let engine = Self::check_engine(probe).await.status;
        Ok(storage.worst(engine))
    }

    async fn check_service_running(probe: &HealthProbe) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if probe.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The engine is degraded when its lock cannot be taken promptly
    async fn check_engine(probe: &HealthProbe) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) =
            match tokio::time::timeout(ENGINE_PROBE_TIMEOUT, probe.engine.stats()).await {
                Ok(_) => (HealthStatus::Healthy, None),
                Err(_) => (
                    HealthStatus::Degraded,
                    Some("Match engine is busy".to_string()),
                ),
            };

        ComponentCheck {
            name: "match_engine".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_storage(probe: &HealthProbe) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match probe.store.stats().await {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Storage health check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Storage unavailable: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "storage".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn gather_service_stats(probe: &HealthProbe) -> ServiceStats {
        let engine = probe.engine.stats().await;
        let registered_users = match probe.store.stats().await {
            Ok(stats) => stats.users,
            Err(e) => {
                debug!("Failed to get store stats for health check: {}", e);
                0
            }
        };

        ServiceStats {
            users_waiting: engine.users_waiting,
            active_sessions: engine.active_sessions,
            pairs_formed: engine.pairs_formed,
            sessions_ended: engine.sessions_ended,
            registered_users,
            uptime_seconds: probe.uptime().as_secs(),
        }
    }

    /// Convert health check to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
