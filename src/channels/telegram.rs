//! Telegram channel — long-polls the Bot API for updates.
//!
//! Native Bot API client over reqwest. On start the webhook is deleted and
//! pending updates are dropped so messages sent while the bot was down are
//! never replayed.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::channels::{Channel, IncomingMessage, Keyboard, MessageStream, OutgoingMessage};
use crate::error::ChannelError;
use crate::registration::ConversationId;
use crate::registration::prompts::tokens;

const CHANNEL_NAME: &str = "telegram";

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    client: reqwest::Client,
    poll_timeout: Duration,
    send_timeout: Duration,
    shutdown: CancellationToken,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, poll_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            poll_timeout,
            send_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// POST a Bot API method and return its `result` field.
    async fn call(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .timeout(self.send_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| send_failed(format!("{method}: {e}")))?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| send_failed(format!("{method}: invalid response ({status}): {e}")))?;

        if !status.is_success() || data.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let description = data
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("no description");
            return Err(send_failed(format!("{method} failed ({status}): {description}")));
        }

        Ok(data.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Delete any webhook and drop updates queued while the bot was offline.
    pub async fn clear_backlog(&self) -> Result<(), ChannelError> {
        self.call(
            "deleteWebhook",
            &serde_json::json!({ "drop_pending_updates": true }),
        )
        .await
        .map_err(|e| ChannelError::StartupFailed {
            name: CHANNEL_NAME.into(),
            reason: e.to_string(),
        })?;
        tracing::info!("Telegram webhook deleted, pending updates dropped");
        Ok(())
    }

    /// Username of the bot (`getMe`).
    pub async fn get_me(&self) -> Result<String, ChannelError> {
        let me = self
            .call("getMe", &serde_json::json!({}))
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;
        Ok(me
            .get("username")
            .and_then(|u| u.as_str())
            .unwrap_or("unknown")
            .to_string())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        self.clear_backlog().await?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();
        let poll_secs = self.poll_timeout.as_secs();
        // The HTTP deadline must outlast the server-side long-poll.
        let request_timeout = self.poll_timeout + self.send_timeout;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": poll_secs,
                    "allowed_updates": ["message"]
                });

                let request = client
                    .post(&url)
                    .timeout(request_timeout)
                    .json(&body)
                    .send();

                let resp = tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Telegram poller stopped");
                        return;
                    }
                    resp = request => resp,
                };

                let data: serde_json::Value = match resp {
                    Ok(r) => match r.json().await {
                        Ok(d) => d,
                        Err(e) => {
                            tracing::warn!("Telegram parse error: {e}");
                            tokio::time::sleep(POLL_RETRY_DELAY).await;
                            continue;
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let updates = match classify_poll(&data, &mut offset) {
                    PollOutcome::Updates(updates) => updates,
                    PollOutcome::Retry {
                        error_code,
                        description,
                        delay,
                    } => {
                        tracing::warn!(
                            error_code,
                            retry_in_secs = delay.as_secs(),
                            "Telegram getUpdates refused: {description}"
                        );
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                tracing::info!("Telegram poller stopped");
                                return;
                            }
                            _ = tokio::time::sleep(delay) => continue,
                        }
                    }
                };

                for incoming in updates {
                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn send(
        &self,
        conversation_id: ConversationId,
        message: OutgoingMessage,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": conversation_id,
            "text": message.text,
        });
        if let Some(markup) = reply_markup(message.keyboard) {
            body["reply_markup"] = markup;
        }
        self.call("sendMessage", &body).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.get_me().await.map(|_| ())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        self.shutdown.cancel();
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!("https://api.telegram.org/bot{}/{method}", token.expose_secret())
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: CHANNEL_NAME.into(),
        reason,
    }
}

/// What one `getUpdates` response asks the poller to do next.
#[derive(Debug)]
enum PollOutcome {
    Updates(Vec<IncomingMessage>),
    /// The API answered `ok: false` (bad token, competing consumer,
    /// throttling). Wait `delay` before polling again.
    Retry {
        error_code: i64,
        description: String,
        delay: Duration,
    },
}

fn classify_poll(data: &serde_json::Value, offset: &mut i64) -> PollOutcome {
    if data.get("ok").and_then(serde_json::Value::as_bool) == Some(true) {
        return PollOutcome::Updates(parse_updates(data, offset));
    }

    let retry_after = data
        .get("parameters")
        .and_then(|p| p.get("retry_after"))
        .and_then(serde_json::Value::as_u64);
    PollOutcome::Retry {
        error_code: data
            .get("error_code")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_default(),
        description: data
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("no description")
            .to_string(),
        delay: retry_after.map_or(POLL_RETRY_DELAY, Duration::from_secs),
    }
}

/// Extract text messages from a `getUpdates` response, advancing `offset`
/// past every update seen (including skipped ones).
fn parse_updates(data: &serde_json::Value, offset: &mut i64) -> Vec<IncomingMessage> {
    let Some(results) = data.get("result").and_then(serde_json::Value::as_array) else {
        return Vec::new();
    };

    let mut messages = Vec::new();
    for update in results {
        if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
            *offset = (*offset).max(uid + 1);
        }
        if let Some(incoming) = parse_update(update) {
            messages.push(incoming);
        }
    }
    messages
}

/// Convert one update into an inbound message. Non-text updates are skipped.
fn parse_update(update: &serde_json::Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(serde_json::Value::as_str)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)?;

    let mut incoming = IncomingMessage::new(CHANNEL_NAME, chat_id, text);

    let from = message.get("from");
    let name = from
        .and_then(|f| f.get("username"))
        .or_else(|| from.and_then(|f| f.get("first_name")))
        .and_then(|n| n.as_str());
    if let Some(name) = name {
        incoming = incoming.with_user_name(name);
    }
    Some(incoming)
}

/// Bot API `reply_markup` for a keyboard hint.
fn reply_markup(keyboard: Keyboard) -> Option<serde_json::Value> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::YesNo => Some(serde_json::json!({
            "keyboard": [[{ "text": tokens::YES }, { "text": tokens::NO }]],
            "resize_keyboard": true,
            "one_time_keyboard": true
        })),
        Keyboard::Remove => Some(serde_json::json!({ "remove_keyboard": true })),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(token: &str) -> TelegramChannel {
        TelegramChannel::new(
            SecretString::from(token),
            Duration::from_secs(30),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel("fake-token").name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel("123:ABC").api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn parse_text_update() {
        let update = serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "from": { "id": 555, "first_name": "Ana", "username": "ana_p" },
                "chat": { "id": 99887766, "type": "private" },
                "text": "/start"
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.conversation_id, 99887766);
        assert_eq!(msg.content, "/start");
        assert_eq!(msg.user_name.as_deref(), Some("ana_p"));
    }

    #[test]
    fn parse_update_falls_back_to_first_name() {
        let update = serde_json::json!({
            "update_id": 1,
            "message": {
                "from": { "id": 1, "first_name": "Ana" },
                "chat": { "id": -100 },
                "text": "hi"
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.conversation_id, -100);
        assert_eq!(msg.user_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn parse_update_skips_non_text() {
        let sticker = serde_json::json!({
            "update_id": 2,
            "message": { "chat": { "id": 1 }, "sticker": { "file_id": "x" } }
        });
        assert!(parse_update(&sticker).is_none());

        let edited = serde_json::json!({
            "update_id": 3,
            "edited_message": { "chat": { "id": 1 }, "text": "x" }
        });
        assert!(parse_update(&edited).is_none());
    }

    #[test]
    fn parse_updates_advances_offset_past_skipped() {
        let data = serde_json::json!({
            "ok": true,
            "result": [
                { "update_id": 5, "message": { "chat": { "id": 1 }, "text": "a" } },
                { "update_id": 6, "message": { "chat": { "id": 1 }, "sticker": {} } },
                { "update_id": 7, "message": { "chat": { "id": 2 }, "text": "b" } }
            ]
        });
        let mut offset = 0;
        let msgs = parse_updates(&data, &mut offset);
        assert_eq!(offset, 8);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "a");
        assert_eq!(msgs[1].conversation_id, 2);
    }

    #[test]
    fn parse_updates_without_result_is_empty() {
        let mut offset = 3;
        let msgs = parse_updates(&serde_json::json!({ "ok": false }), &mut offset);
        assert!(msgs.is_empty());
        assert_eq!(offset, 3);
    }

    #[test]
    fn classify_poll_accepts_ok_response() {
        let data = serde_json::json!({
            "ok": true,
            "result": [{ "update_id": 41, "message": { "chat": { "id": 9 }, "text": "1" } }]
        });
        let mut offset = 0;
        match classify_poll(&data, &mut offset) {
            PollOutcome::Updates(msgs) => assert_eq!(msgs.len(), 1),
            other => panic!("expected updates, got {other:?}"),
        }
        assert_eq!(offset, 42);
    }

    #[test]
    fn classify_poll_backs_off_on_conflict() {
        let data = serde_json::json!({
            "ok": false,
            "error_code": 409,
            "description": "Conflict: terminated by other getUpdates request"
        });
        let mut offset = 7;
        match classify_poll(&data, &mut offset) {
            PollOutcome::Retry {
                error_code,
                description,
                delay,
            } => {
                assert_eq!(error_code, 409);
                assert!(description.starts_with("Conflict"));
                assert_eq!(delay, POLL_RETRY_DELAY);
            }
            other => panic!("expected retry, got {other:?}"),
        }
        assert_eq!(offset, 7);
    }

    #[test]
    fn classify_poll_honours_retry_after() {
        let data = serde_json::json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 17",
            "parameters": { "retry_after": 17 }
        });
        let mut offset = 0;
        match classify_poll(&data, &mut offset) {
            PollOutcome::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(17)),
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn classify_poll_treats_missing_ok_as_error() {
        let mut offset = 0;
        let outcome = classify_poll(&serde_json::json!({ "unexpected": 1 }), &mut offset);
        assert!(matches!(
            outcome,
            PollOutcome::Retry { error_code: 0, .. }
        ));
    }

    #[test]
    fn reply_markup_for_each_hint() {
        assert!(reply_markup(Keyboard::None).is_none());

        let yes_no = reply_markup(Keyboard::YesNo).unwrap();
        assert_eq!(yes_no["keyboard"][0][0]["text"], "Да");
        assert_eq!(yes_no["keyboard"][0][1]["text"], "Нет");
        assert_eq!(yes_no["one_time_keyboard"], true);

        let remove = reply_markup(Keyboard::Remove).unwrap();
        assert_eq!(remove["remove_keyboard"], true);
    }

    // ── Network error tests (expected to fail with a fake token) ────

    #[tokio::test]
    async fn telegram_send_with_fake_token_fails() {
        let ch = channel("fake-token");
        let result = ch.send(123456, OutgoingMessage::new("hello")).await;
        assert!(matches!(result, Err(ChannelError::SendFailed { .. })));
    }

    #[tokio::test]
    async fn telegram_shutdown_is_idempotent() {
        let ch = channel("fake-token");
        ch.shutdown().await.unwrap();
        ch.shutdown().await.unwrap();
        assert!(ch.shutdown.is_cancelled());
    }
}
