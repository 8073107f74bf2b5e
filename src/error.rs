//! Error types for the chat relay service
//!
//! Domain failures are raised as `ChatError` values wrapped in `anyhow::Error`
//! and recovered at the dispatcher with `downcast_ref::<ChatError>()`.

use crate::types::UserId;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific chat scenarios
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid argument: {usage}")]
    InvalidArgument { usage: String },

    #[error("User {user_id} is not in a chat")]
    NotPaired { user_id: UserId },

    #[error("Invalid score {score}: must be between 1 and 5")]
    InvalidScore { score: i64 },

    #[error("User {user_id} has no pending rating")]
    NoPendingTarget { user_id: UserId },

    #[error("User {user_id} is not authorized for admin commands")]
    Unauthorized { user_id: UserId },

    #[error("Failed to deliver message to {user_id}: {message}")]
    DeliveryError { user_id: UserId, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl ChatError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::InvalidArgument { .. } => "invalid_argument",
            ChatError::NotPaired { .. } => "not_paired",
            ChatError::InvalidScore { .. } => "invalid_score",
            ChatError::NoPendingTarget { .. } => "no_pending_target",
            ChatError::Unauthorized { .. } => "unauthorized",
            ChatError::DeliveryError { .. } => "delivery",
            ChatError::Storage { .. } => "storage",
            ChatError::ConfigurationError { .. } => "configuration",
            ChatError::InternalError { .. } => "internal",
        }
    }

    /// Whether the error is caused by the caller rather than the service
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ChatError::InvalidArgument { .. }
                | ChatError::NotPaired { .. }
                | ChatError::InvalidScore { .. }
                | ChatError::NoPendingTarget { .. }
                | ChatError::Unauthorized { .. }
        )
    }
}
