//! Configuration management for the tete-a-tete service
//!
//! This module handles all configuration loading from TOML files and
//! environment variables, validation, and default values.

pub mod app;

// Re-export commonly used types
pub use app::{
    validate_config, AppConfig, MatchmakingSettings, ModerationSettings, ServiceSettings,
    StorageSettings, TelegramSettings,
};
