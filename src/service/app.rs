//! Main application state and service coordination
//!
//! This module contains the production AppState that wires storage, the
//! match engine, moderation, ratings and the chat transport together and
//! owns the background tasks.

use crate::config::AppConfig;
use crate::matching::MatchEngine;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::moderation::AbuseGuard;
use crate::rating::RatingService;
use crate::relay::RelayService;
use crate::service::chat::{ChatService, ChatSettings};
use crate::service::health::{HealthCheck, HealthProbe, HealthStatus};
use crate::storage::{ProfileStore, SqliteStore};
use crate::transport::{InboundHandler, InboundMessage, LogTransport, TelegramTransport, Transport};
use crate::types::UserId;
use crate::utils::{Clock, SystemClock};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    store: Arc<dyn ProfileStore>,
    engine: Arc<MatchEngine>,
    chat_service: Arc<ChatService>,

    /// Present when a bot token is configured
    telegram: Option<TelegramTransport>,

    metrics_service: Arc<MetricsService>,
    probe: Arc<HealthProbe>,

    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing {} chat relay", config.service.name);

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let store = Self::initialize_storage(&config).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let engine = Arc::new(
            MatchEngine::new(store.clone(), clock.clone(), metrics_collector.clone())
                .with_rematch_avoidance(config.matchmaking.avoid_immediate_rematch),
        );
        let guard = Arc::new(
            AbuseGuard::new(
                &config.moderation,
                store.clone(),
                clock.clone(),
                metrics_collector.clone(),
            )
            .map_err(|e| ServiceError::Configuration {
                message: e.to_string(),
            })?,
        );
        let ratings = Arc::new(RatingService::new(
            store.clone(),
            metrics_collector.clone(),
        ));

        let (telegram, transport): (Option<TelegramTransport>, Arc<dyn Transport>) =
            match &config.telegram.bot_token {
                Some(token) => {
                    let telegram = TelegramTransport::new(token);
                    (Some(telegram.clone()), Arc::new(telegram))
                }
                None => {
                    warn!("No bot token configured; reading messages from stdin and logging replies");
                    (None, Arc::new(LogTransport))
                }
            };

        let relay = Arc::new(RelayService::new(
            engine.clone(),
            guard.clone(),
            store.clone(),
            transport.clone(),
            clock,
            metrics_collector.clone(),
        ));

        let chat_service = Arc::new(ChatService::new(
            ChatSettings::from_config(&config),
            engine.clone(),
            ratings,
            guard,
            relay,
            store.clone(),
            transport,
            metrics_collector.clone(),
        ));

        let probe = Arc::new(HealthProbe::new(
            config.service.name.clone(),
            engine.clone(),
            store.clone(),
        ));
        let health_server = Arc::new(
            HealthServer::new(
                HealthServerConfig {
                    port: config.service.health_port,
                    host: "0.0.0.0".to_string(),
                },
                metrics_collector.clone(),
            )
            .with_probe(probe.clone()),
        );
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(Self {
            config,
            store,
            engine,
            chat_service,
            telegram,
            metrics_service,
            probe,
            background_tasks: Vec::new(),
        })
    }

    /// Start the health server, inbound consumption and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {}", self.config.service.name);

        self.probe.set_running(true).await;

        self.start_metrics_service().await;
        self.start_inbound().await;
        self.start_background_tasks();

        info!("✅ {} started successfully", self.config.service.name);
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);

        self.probe.set_running(false).await;

        self.stop_background_tasks().await;

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        let final_stats = self.engine.stats().await;
        info!("Final matching statistics: {:?}", final_stats);
        match self.store.stats().await {
            Ok(stats) => info!("Final storage statistics: {:?}", stats),
            Err(e) => warn!("Failed to read final storage statistics: {}", e),
        }

        info!("✅ {} shutdown completed", self.config.service.name);
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.probe.is_running().await
    }

    pub fn engine(&self) -> Arc<MatchEngine> {
        self.engine.clone()
    }

    pub fn chat_service(&self) -> Arc<ChatService> {
        self.chat_service.clone()
    }

    pub fn probe(&self) -> Arc<HealthProbe> {
        self.probe.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Open the profile store; `:memory:` selects an ephemeral database
    async fn initialize_storage(config: &AppConfig) -> Result<Arc<dyn ProfileStore>, ServiceError> {
        let path = config.storage.database_path.as_str();
        info!("Opening profile store at {}", path);

        let store = if path == ":memory:" {
            SqliteStore::open_in_memory().await
        } else {
            SqliteStore::open(path).await
        }
        .map_err(|e| ServiceError::Storage {
            message: e.to_string(),
        })?;

        Ok(Arc::new(store))
    }

    async fn start_metrics_service(&mut self) {
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(handle);

        // Give the server a moment to bind
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        info!("✅ Health and metrics endpoints on port {}", port);
    }

    /// Feed inbound messages into the dispatcher
    async fn start_inbound(&mut self) {
        let (tx, rx) = mpsc::channel(self.config.telegram.inbound_buffer);

        let source = match &self.telegram {
            Some(telegram) => telegram.spawn_polling(tx),
            None => spawn_console_reader(tx),
        };
        self.background_tasks.push(source);

        let handler: Arc<dyn InboundHandler> = self.chat_service.clone();
        self.background_tasks.push(spawn_consumer(rx, handler));
        info!("Inbound message consumption started");
    }

    fn start_background_tasks(&mut self) {
        let interval = self.config.health_check_interval();

        // Metrics update task
        let metrics_task = {
            let engine = self.engine.clone();
            let metrics_collector = self.metrics_service.collector();
            let probe = self.probe.clone();

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                while probe.is_running().await {
                    ticker.tick().await;
                    let stats = engine.stats().await;
                    debug!(
                        "Updating metrics - waiting: {}, sessions: {}",
                        stats.users_waiting, stats.active_sessions
                    );
                    metrics_collector.update_from_engine_stats(&stats);
                }
                info!("Metrics update task stopped");
            })
        };

        // Health metrics task
        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let probe = self.probe.clone();

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                while probe.is_running().await {
                    ticker.tick().await;
                    metrics_collector.update_uptime(probe.uptime());

                    match HealthCheck::check(&probe).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != HealthStatus::Unhealthy,
                                );
                            }
                        }
                        Err(e) => warn!("Health metrics update failed: {}", e),
                    }
                }
                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(metrics_task);
        self.background_tasks.push(health_metrics_task);
        info!("Background maintenance tasks started");
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        info!("✅ All {} background tasks stopped", task_count);
    }
}

/// Process inbound messages one at a time, in arrival order
pub fn spawn_consumer(
    mut rx: mpsc::Receiver<InboundMessage>,
    handler: Arc<dyn InboundHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let event_id = message.event_id;
            if let Err(e) = handler.handle_inbound(message).await {
                error!("Inbound event {} failed: {:#}", event_id, e);
            }
        }
        info!("Inbound channel closed, consumer stopped");
    })
}

/// Read `<user id> <text>` lines from stdin; used when no bot token is set
fn spawn_console_reader(tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_console_line(&line) {
                    Some(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => warn!("Expected `<user id> <text>`, got {:?}", line),
                },
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
        info!("Console reader stopped");
    })
}

fn parse_console_line(line: &str) -> Option<InboundMessage> {
    let (user, text) = line.trim().split_once(' ')?;
    let sender = user.parse::<UserId>().ok()?;
    Some(InboundMessage::text(sender, text.trim()))
}
