//! Telegram adapter built on teloxide long polling
//!
//! Private-chat messages are converted into `InboundMessage`s and pushed into
//! an mpsc channel; outbound text goes straight through the Bot API.

use crate::error::{ChatError, Result};
use crate::transport::{InboundMessage, MessageContent, Transport};
use crate::types::UserId;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Telegram Bot API transport
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Start long polling; inbound messages are forwarded to `tx`
    pub fn spawn_polling(&self, tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
        let bot = self.bot.clone();
        info!("Starting Telegram long polling");

        tokio::spawn(async move {
            let handler = Update::filter_message().endpoint(move |msg: Message| {
                let tx = tx.clone();
                async move {
                    if !matches!(msg.chat.kind, ChatKind::Private(_)) {
                        debug!("Ignoring non-private message in chat {}", msg.chat.id.0);
                        return respond(());
                    }

                    match to_inbound(&msg) {
                        Some(inbound) => {
                            if tx.send(inbound).await.is_err() {
                                warn!("Inbound channel closed, dropping message");
                            }
                        }
                        None => debug!("Ignoring message without a sender"),
                    }

                    respond(())
                }
            });

            Dispatcher::builder(bot, handler)
                .default_handler(|_| async {})
                .build()
                .dispatch()
                .await;
        })
    }
}

/// Convert a Telegram message into the channel-agnostic form
fn to_inbound(msg: &Message) -> Option<InboundMessage> {
    let sender = msg.from.as_ref()?.id.0 as UserId;

    let content = if let Some(text) = msg.text() {
        MessageContent::Text(text.to_string())
    } else {
        let kind = if msg.photo().is_some() {
            "photo"
        } else if msg.sticker().is_some() {
            "sticker"
        } else if msg.voice().is_some() {
            "voice"
        } else if msg.video().is_some() {
            "video"
        } else if msg.document().is_some() {
            "document"
        } else {
            "other"
        };
        MessageContent::Unsupported {
            kind: kind.to_string(),
        }
    };

    Some(InboundMessage::new(sender, content))
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, user_id: UserId, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(user_id), text)
            .await
            .map(|_| ())
            .map_err(|e| {
                ChatError::DeliveryError {
                    user_id,
                    message: e.to_string(),
                }
                .into()
            })
    }
}
