//! Tete-a-tete - anonymous one-to-one chat relay
//!
//! This crate pairs strangers for private text conversations over a chat
//! platform, relays messages between partners, moderates links and abuse
//! with silent ghost-bans, and aggregates post-session ratings.

pub mod config;
pub mod error;
pub mod matching;
pub mod metrics;
pub mod moderation;
pub mod rating;
pub mod relay;
pub mod service;
pub mod storage;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ChatError, Result};
pub use types::*;

// Re-export key components
pub use matching::{MatchEngine, MatchOutcome};
pub use storage::ProfileStore;
pub use transport::Transport;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
