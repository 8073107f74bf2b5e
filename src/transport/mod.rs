//! Chat platform transport
//!
//! This module defines the outbound `Transport` seam, the inbound message
//! shape produced by platform adapters, the command parser and the Telegram
//! adapter.

pub mod commands;
pub mod telegram;

use crate::error::Result;
use crate::types::UserId;
use crate::utils::{current_timestamp, generate_event_id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

pub use commands::{parse_input, Command, Input};
pub use telegram::TelegramTransport;

/// Payload of an inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    /// Media or service messages the relay does not forward
    Unsupported { kind: String },
}

/// A message received from a user
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub event_id: Uuid,
    pub sender: UserId,
    pub content: MessageContent,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(sender: UserId, content: MessageContent) -> Self {
        Self {
            event_id: generate_event_id(),
            sender,
            content,
            received_at: current_timestamp(),
        }
    }

    pub fn text(sender: UserId, text: impl Into<String>) -> Self {
        Self::new(sender, MessageContent::Text(text.into()))
    }
}

/// Trait for delivering text to a user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `text` to `user_id`; failures surface as `ChatError::DeliveryError`
    async fn send(&self, user_id: UserId, text: &str) -> Result<()>;
}

/// Trait for consuming inbound messages
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Process one inbound message
    async fn handle_inbound(&self, message: InboundMessage) -> Result<()>;
}

/// Transport that only logs outgoing messages, used in dry-run mode
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, user_id: UserId, text: &str) -> Result<()> {
        info!("[dry-run] -> {}: {}", user_id, text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_text_gets_unique_event_ids() {
        let a = InboundMessage::text(1, "hi");
        let b = InboundMessage::text(1, "hi");
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.content, MessageContent::Text("hi".to_string()));
    }

    #[tokio::test]
    async fn test_log_transport_accepts_everything() {
        assert!(LogTransport.send(1, "hello").await.is_ok());
    }
}
