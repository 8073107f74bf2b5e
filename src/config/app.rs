//! Main application configuration
//!
//! This module defines the primary configuration structures for the tete-a-tete
//! chat relay, including TOML/environment loading and validation.

use crate::error::ChatError;
use crate::types::UserId;
use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub telegram: TelegramSettings,
    pub storage: StorageSettings,
    pub matchmaking: MatchmakingSettings,
    pub moderation: ModerationSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Interval of the periodic self health check in seconds
    pub health_check_interval_seconds: u64,
}

/// Chat platform settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    /// Bot API token; required unless running in dry-run mode
    pub bot_token: Option<String>,
    /// Users allowed to run admin commands
    pub owner_ids: Vec<UserId>,
    /// Capacity of the inbound message channel
    pub inbound_buffer: usize,
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite database file, `:memory:` for an ephemeral store
    pub database_path: String,
}

/// Matchmaking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Skip the partner just left when `/next` rescans the pool
    pub avoid_immediate_rematch: bool,
}

/// Content moderation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    /// Pattern that identifies a link in message text
    pub link_pattern: String,
    /// Ban length for non-premium link senders, in days
    pub link_ban_days: i64,
    /// Ban link senders instead of only dropping the message
    pub escalate_links_to_ban: bool,
    /// Case-insensitive terms that cause a message to be dropped
    pub blocked_terms: Vec<String>,
    /// Ban length applied by the admin `/ban` command, in days
    pub admin_ban_days: i64,
    /// Number of chat lines returned by `/logs`
    pub log_page_size: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "tete-a-tete".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
            health_check_interval_seconds: 30,
        }
    }
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            owner_ids: Vec::new(),
            inbound_buffer: 1024,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "users.db".to_string(),
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            avoid_immediate_rematch: false,
        }
    }
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            link_pattern: r"(?i)(https?://|www\.|t\.me/)".to_string(),
            link_ban_days: 3,
            escalate_links_to_ban: true,
            blocked_terms: Vec::new(),
            admin_ban_days: 30,
            log_page_size: 20,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file; missing keys fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ChatError::ConfigurationError {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw).map_err(|e| ChatError::ConfigurationError {
            message: format!("Failed to parse configuration: {}", e),
        })?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            config.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Telegram settings
        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            config.telegram.bot_token = Some(token);
        }
        if let Ok(owners) = env::var("OWNER_IDS") {
            config.telegram.owner_ids = parse_owner_ids(&owners)?;
        }

        // Storage settings
        if let Ok(path) = env::var("DATABASE_PATH") {
            config.storage.database_path = path;
        }

        // Matchmaking settings
        if let Ok(avoid) = env::var("AVOID_IMMEDIATE_REMATCH") {
            config.matchmaking.avoid_immediate_rematch = avoid
                .parse()
                .map_err(|_| anyhow!("Invalid AVOID_IMMEDIATE_REMATCH value: {}", avoid))?;
        }

        // Moderation settings
        if let Ok(pattern) = env::var("LINK_PATTERN") {
            config.moderation.link_pattern = pattern;
        }
        if let Ok(days) = env::var("LINK_BAN_DAYS") {
            config.moderation.link_ban_days = days
                .parse()
                .map_err(|_| anyhow!("Invalid LINK_BAN_DAYS value: {}", days))?;
        }
        if let Ok(escalate) = env::var("ESCALATE_LINKS_TO_BAN") {
            config.moderation.escalate_links_to_ban = escalate
                .parse()
                .map_err(|_| anyhow!("Invalid ESCALATE_LINKS_TO_BAN value: {}", escalate))?;
        }
        if let Ok(days) = env::var("ADMIN_BAN_DAYS") {
            config.moderation.admin_ban_days = days
                .parse()
                .map_err(|_| anyhow!("Invalid ADMIN_BAN_DAYS value: {}", days))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get health check interval as Duration
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.service.health_check_interval_seconds)
    }

    pub fn link_ban_duration(&self) -> chrono::Duration {
        chrono::Duration::days(self.moderation.link_ban_days)
    }

    pub fn admin_ban_duration(&self) -> chrono::Duration {
        chrono::Duration::days(self.moderation.admin_ban_days)
    }
}

/// Parse a comma separated list of user ids
pub fn parse_owner_ids(raw: &str) -> Result<Vec<UserId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<UserId>()
                .map_err(|_| anyhow!("Invalid OWNER_IDS entry: {}", id))
        })
        .collect()
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.health_check_interval_seconds == 0 {
        return Err(anyhow!("Health check interval must be greater than 0"));
    }

    // Validate telegram settings
    if config.telegram.inbound_buffer == 0 {
        return Err(anyhow!("Inbound buffer must be greater than 0"));
    }
    if matches!(&config.telegram.bot_token, Some(token) if token.trim().is_empty()) {
        return Err(anyhow!("Bot token cannot be empty"));
    }

    // Validate storage settings
    if config.storage.database_path.is_empty() {
        return Err(anyhow!("Database path cannot be empty"));
    }

    // Validate moderation settings
    Regex::new(&config.moderation.link_pattern)
        .map_err(|e| anyhow!("Invalid link pattern: {}", e))?;
    if config.moderation.link_ban_days <= 0 {
        return Err(anyhow!("Link ban duration must be positive"));
    }
    if config.moderation.admin_ban_days <= 0 {
        return Err(anyhow!("Admin ban duration must be positive"));
    }
    if config.moderation.log_page_size == 0 {
        return Err(anyhow!("Log page size must be greater than 0"));
    }

    Ok(())
}
