//! CLI channel — stdin/stdout console for local runs.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::channels::{Channel, IncomingMessage, Keyboard, MessageStream, OutgoingMessage};
use crate::error::ChannelError;
use crate::registration::ConversationId;
use crate::registration::prompts::tokens;

/// The single conversation the console represents.
pub const CLI_CONVERSATION_ID: ConversationId = 0;

/// A console channel: each stdin line is one message from one conversation.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = IncomingMessage::new("cli", CLI_CONVERSATION_ID, line)
                            .with_user_name("local-user");
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn send(
        &self,
        _conversation_id: ConversationId,
        message: OutgoingMessage,
    ) -> Result<(), ChannelError> {
        println!("\n{}", render(&message));
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Text shown on the console, with the keyboard hint spelled out.
fn render(message: &OutgoingMessage) -> String {
    match message.keyboard {
        Keyboard::YesNo => format!("{}\n[{} / {}]", message.text, tokens::YES, tokens::NO),
        Keyboard::None | Keyboard::Remove => message.text.clone(),
    }
}
