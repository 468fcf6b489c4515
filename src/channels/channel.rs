//! Gateway abstraction: inbound message stream and outbound replies.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;
use crate::registration::ConversationId;

/// A text message received from a chat.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel the message arrived on.
    pub channel: String,
    /// Chat the message belongs to; used as the session key.
    pub conversation_id: ConversationId,
    /// Display name of the sender, if the transport provides one.
    pub user_name: Option<String>,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        conversation_id: ConversationId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            conversation_id,
            user_name: None,
            content: content.into(),
            received_at: Utc::now(),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }
}

/// Keyboard hint attached to an outbound message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Keyboard {
    /// Leave whatever keyboard the client shows.
    #[default]
    None,
    /// Offer the yes/no answer buttons.
    YesNo,
    /// Hide a previously shown keyboard.
    Remove,
}

/// A reply to send to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub keyboard: Keyboard,
}

impl OutgoingMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// Infinite stream of inbound messages. Ends only when the channel stops.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short identifier, e.g. "telegram".
    fn name(&self) -> &str;

    /// Start receiving. Any backlog queued before startup is discarded.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a reply to a chat.
    async fn send(
        &self,
        conversation_id: ConversationId,
        message: OutgoingMessage,
    ) -> Result<(), ChannelError>;

    /// Check that the transport is reachable.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Stop receiving.
    async fn shutdown(&self) -> Result<(), ChannelError>;
}
