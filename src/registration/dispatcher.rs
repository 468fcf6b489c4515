//! Dispatcher — routes inbound messages through sessions and the step engine.
//!
//! Each active conversation gets a lane: an unbounded queue drained by one
//! worker task, so messages of one chat are applied strictly in arrival
//! order while different chats proceed in parallel. A lane lives only while
//! it has queued work.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::channels::{Channel, IncomingMessage, Keyboard, MessageStream, OutgoingMessage};
use crate::error::DatabaseError;
use crate::store::{NewUser, RegistrationStore};

use super::command::Command;
use super::engine::{self, Effect};
use super::model::{Registration, RegistrationType, Step};
use super::prompts;
use super::session::{ConversationId, SessionTable};

type Lanes = HashMap<ConversationId, mpsc::UnboundedSender<IncomingMessage>>;

/// Drives registrations for every conversation on one channel.
#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    store: Arc<dyn RegistrationStore>,
    sessions: Arc<SessionTable>,
    store_timeout: Duration,
    lanes: Arc<Mutex<Lanes>>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        channel: Arc<dyn Channel>,
        store: Arc<dyn RegistrationStore>,
        sessions: Arc<SessionTable>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            store,
            sessions,
            store_timeout,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            tracker: TaskTracker::new(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Pull messages from `stream` until it ends or `shutdown` fires.
    ///
    /// The stop signal is checked between messages; work already queued on
    /// a lane keeps running. Call [`Dispatcher::drain`] afterwards.
    pub async fn run(&self, mut stream: MessageStream, shutdown: CancellationToken) {
        tracing::info!("Dispatcher ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, no longer accepting messages");
                    break;
                }
                msg = stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Inbound stream ended");
                            break;
                        }
                    }
                }
            };

            self.dispatch(message).await;
        }
    }

    /// Wait up to `grace` for in-flight lanes, then clear the session table.
    ///
    /// Returns `false` if some lanes were still busy and got abandoned.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        let finished = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        if !finished {
            tracing::warn!(
                lanes = self.tracker.len(),
                "Grace period elapsed, abandoning in-flight conversations"
            );
        }
        let discarded = self.sessions.clear().await;
        tracing::info!(discarded, "Session table cleared");
        finished
    }

    // ── Lanes ───────────────────────────────────────────────────────

    /// Queue `message` on its conversation's lane, starting one if needed.
    pub async fn dispatch(&self, message: IncomingMessage) {
        let id = message.conversation_id;
        let mut lanes = self.lanes.lock().await;

        let message = match lanes.get(&id) {
            Some(tx) => match tx.send(message) {
                Ok(()) => return,
                Err(mpsc::error::SendError(m)) => m,
            },
            None => message,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // rx is alive, so this cannot fail.
        let _ = tx.send(message);
        lanes.insert(id, tx);
        drop(lanes);

        let this = self.clone();
        self.tracker.spawn(async move { this.run_lane(id, rx).await });
    }

    async fn run_lane(self, id: ConversationId, mut rx: mpsc::UnboundedReceiver<IncomingMessage>) {
        loop {
            // Checking for more work and retiring the lane happen under the
            // lanes lock, so a concurrent dispatch either lands in `rx` or
            // finds no lane and starts a fresh one.
            let next = {
                let mut lanes = self.lanes.lock().await;
                match rx.try_recv() {
                    Ok(message) => Some(message),
                    Err(_) => {
                        lanes.remove(&id);
                        None
                    }
                }
            };

            let Some(message) = next else {
                tracing::trace!(conversation_id = id, "Lane retired");
                return;
            };
            self.handle(&message).await;
        }
    }

    // ── Message handling ────────────────────────────────────────────

    /// Process one message to completion and send the reply, if any.
    ///
    /// Callers must not run two `handle` calls for the same conversation
    /// concurrently; `dispatch` guarantees that.
    pub async fn handle(&self, message: &IncomingMessage) {
        let id = message.conversation_id;
        tracing::debug!(
            conversation_id = id,
            channel = %message.channel,
            user = message.user_name.as_deref().unwrap_or("-"),
            chars = message.content.chars().count(),
            queued_ms = (Utc::now() - message.received_at).num_milliseconds(),
            "Received message"
        );

        if let Some(reply) = self.process(id, &message.content).await {
            self.deliver(id, reply).await;
        }
    }

    async fn process(&self, id: ConversationId, text: &str) -> Option<OutgoingMessage> {
        let command = Command::parse(text);

        let Some(registration) = self.sessions.get(id).await else {
            return self.process_idle(id, command).await;
        };

        match command {
            Command::Cancel => {
                self.sessions.remove(id).await;
                tracing::info!(conversation_id = id, "Registration cancelled");
                return Some(
                    OutgoingMessage::new(prompts::CANCELLED).with_keyboard(Keyboard::Remove),
                );
            }
            Command::Start => return Some(engine::current_prompt(&registration)),
            _ => {}
        }

        let phone_registered = if registration.current_step() == Step::PhoneNumber {
            let phone = engine::normalize(text);
            match self.bounded("count_by_phone", self.store.count_by_phone(phone)).await {
                Ok(count) => count > 0,
                Err(e) => {
                    tracing::warn!(conversation_id = id, "Duplicate-phone lookup failed: {e}");
                    return Some(OutgoingMessage::new(prompts::TRANSIENT_FAILURE));
                }
            }
        } else {
            false
        };

        let transition = engine::transition(registration, text, phone_registered);
        match transition.effect {
            Effect::PersistAll => Some(self.finalize(id, transition.registration).await),
            Effect::Reject(reason) => {
                tracing::debug!(conversation_id = id, ?reason, "Answer rejected");
                transition.reply
            }
            Effect::None => {
                tracing::debug!(
                    conversation_id = id,
                    step = %transition.registration.current_step(),
                    participant = transition.registration.participant_number(),
                    "Step advanced"
                );
                self.sessions.insert(id, transition.registration).await;
                transition.reply
            }
        }
    }

    /// Handle a message for a conversation without an active session.
    async fn process_idle(&self, id: ConversationId, command: Command) -> Option<OutgoingMessage> {
        match command {
            Command::Start => {
                Some(OutgoingMessage::new(prompts::WELCOME).with_keyboard(Keyboard::Remove))
            }
            Command::Select(kind) => {
                let registration = Registration::new(kind);
                let reply = engine::current_prompt(&registration);
                self.sessions.insert(id, registration).await;
                tracing::info!(conversation_id = id, registration_type = %kind, "Registration started");
                Some(reply)
            }
            _ => {
                tracing::debug!(conversation_id = id, "Ignoring message outside a registration");
                None
            }
        }
    }

    /// Persist every participant, then drop the session.
    ///
    /// On failure the session is kept (with the last answer applied) so the
    /// user can resend that answer to retry. A unique-phone violation will
    /// not clear on retry, so the user is told to start over instead.
    async fn finalize(&self, id: ConversationId, registration: Registration) -> OutgoingMessage {
        let kind = registration.registration_type();
        let team_id = match kind {
            RegistrationType::Team => Some(Uuid::new_v4().to_string()),
            RegistrationType::Single => None,
        };
        let rows: Vec<NewUser> = registration
            .users()
            .iter()
            .map(|u| NewUser::from_user_data(u, team_id.as_deref()))
            .collect();

        match self.bounded("insert_users", self.store.insert_users(&rows)).await {
            Ok(ids) => {
                self.sessions.remove(id).await;
                tracing::info!(
                    conversation_id = id,
                    registration_type = %kind,
                    team_id = team_id.as_deref().unwrap_or("-"),
                    user_ids = ?ids,
                    "Registration completed"
                );
                OutgoingMessage::new(prompts::success(kind, registration.users()))
                    .with_keyboard(Keyboard::Remove)
            }
            Err(DatabaseError::Constraint(detail)) => {
                tracing::warn!(
                    conversation_id = id,
                    "Phone number registered by another chat meanwhile: {detail}"
                );
                self.sessions.insert(id, registration).await;
                OutgoingMessage::new(prompts::PHONE_CONFLICT)
            }
            Err(e) => {
                tracing::warn!(conversation_id = id, "Failed to persist registration: {e}");
                self.sessions.insert(id, registration).await;
                OutgoingMessage::new(prompts::TRANSIENT_FAILURE)
            }
        }
    }

    /// Send a reply. Failures are logged; the transition stands.
    async fn deliver(&self, id: ConversationId, reply: OutgoingMessage) {
        if let Err(e) = self.channel.send(id, reply).await {
            tracing::warn!(
                conversation_id = id,
                channel = self.channel.name(),
                "Failed to deliver reply: {e}"
            );
        }
    }

    /// Run a store call with the configured deadline.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, DatabaseError>>,
    ) -> Result<T, DatabaseError> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| DatabaseError::Timeout {
                operation,
                timeout: self.store_timeout,
            })?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedSender;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::error::ChannelError;
    use crate::store::{LibSqlBackend, RegisteredUser};

    /// Channel that records every reply.
    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(ConversationId, OutgoingMessage)>>,
        fail_sends: AtomicBool,
    }

    impl RecordingChannel {
        async fn texts(&self, id: ConversationId) -> Vec<String> {
            self.sent
                .lock()
                .await
                .iter()
                .filter(|(cid, _)| *cid == id)
                .map(|(_, m)| m.text.clone())
                .collect()
        }

        async fn last(&self, id: ConversationId) -> OutgoingMessage {
            self.sent
                .lock()
                .await
                .iter()
                .rev()
                .find(|(cid, _)| *cid == id)
                .map(|(_, m)| m.clone())
                .unwrap()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "test"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn send(
            &self,
            conversation_id: ConversationId,
            message: OutgoingMessage,
        ) -> Result<(), ChannelError> {
            self.sent.lock().await.push((conversation_id, message));
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(ChannelError::SendFailed {
                    name: "test".into(),
                    reason: "socket closed".into(),
                });
            }
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    /// Store wrapper whose writes or reads can be made to fail or stall.
    struct FlakyStore {
        inner: LibSqlBackend,
        fail_writes: AtomicBool,
        fail_reads: AtomicBool,
        stall: AtomicBool,
        insert_delay: Mutex<Duration>,
        persisted: Mutex<Vec<NewUser>>,
    }

    impl FlakyStore {
        async fn new() -> Self {
            Self {
                inner: LibSqlBackend::new_memory().await.unwrap(),
                fail_writes: AtomicBool::new(false),
                fail_reads: AtomicBool::new(false),
                stall: AtomicBool::new(false),
                insert_delay: Mutex::new(Duration::ZERO),
                persisted: Mutex::new(Vec::new()),
            }
        }

        async fn maybe_stall(&self) {
            if self.stall.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    #[async_trait]
    impl RegistrationStore for FlakyStore {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            self.inner.run_migrations().await
        }

        async fn insert_user(&self, user: &NewUser) -> Result<i64, DatabaseError> {
            self.inner.insert_user(user).await
        }

        async fn insert_users(&self, users: &[NewUser]) -> Result<Vec<i64>, DatabaseError> {
            self.maybe_stall().await;
            let delay = *self.insert_delay.lock().await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DatabaseError::Query("disk on fire".into()));
            }
            let ids = self.inner.insert_users(users).await?;
            self.persisted.lock().await.extend_from_slice(users);
            Ok(ids)
        }

        async fn count_by_phone(&self, phone_number: &str) -> Result<i64, DatabaseError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(DatabaseError::Query("connection reset".into()));
            }
            self.inner.count_by_phone(phone_number).await
        }

        async fn team_members(&self, team_id: &str) -> Result<Vec<RegisteredUser>, DatabaseError> {
            self.inner.team_members(team_id).await
        }

        async fn count_users(&self) -> Result<i64, DatabaseError> {
            self.inner.count_users().await
        }
    }

    struct Harness {
        channel: Arc<RecordingChannel>,
        store: Arc<FlakyStore>,
        dispatcher: Dispatcher,
    }

    impl Harness {
        async fn new() -> Self {
            let channel = Arc::new(RecordingChannel::default());
            let store = Arc::new(FlakyStore::new().await);
            let dispatcher = Dispatcher::new(
                channel.clone(),
                store.clone(),
                Arc::new(SessionTable::new()),
                Duration::from_secs(1),
            );
            Self {
                channel,
                store,
                dispatcher,
            }
        }

        async fn say(&self, id: ConversationId, text: &str) {
            self.dispatcher
                .handle(&IncomingMessage::new("test", id, text))
                .await;
        }

        async fn say_all(&self, id: ConversationId, texts: &[&str]) {
            for text in texts {
                self.say(id, text).await;
            }
        }
    }

    #[tokio::test]
    async fn start_without_session_sends_welcome() {
        let h = Harness::new().await;
        h.say(1, "/start").await;

        let reply = h.channel.last(1).await;
        assert_eq!(reply.text, prompts::WELCOME);
        assert!(h.dispatcher.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn free_text_without_session_is_ignored() {
        let h = Harness::new().await;
        h.say(1, "hello").await;
        h.say(1, "/cancel").await;
        assert!(h.channel.texts(1).await.is_empty());
    }

    #[tokio::test]
    async fn start_mid_session_repeats_current_prompt() {
        let h = Harness::new().await;
        h.say_all(1, &["1", "Ana"]).await;
        h.say(1, "/start").await;

        let texts = h.channel.texts(1).await;
        assert_eq!(texts[2], texts[1]);
        let reg = h.dispatcher.sessions().get(1).await.unwrap();
        assert_eq!(reg.current_step(), Step::LastName);
    }

    #[tokio::test]
    async fn cancel_drops_session() {
        let h = Harness::new().await;
        h.say_all(1, &["2", "Ana", "/cancel"]).await;

        assert_eq!(h.channel.last(1).await.text, prompts::CANCELLED);
        assert!(!h.dispatcher.sessions().contains(1).await);
        assert_eq!(h.store.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn single_registration_is_persisted() {
        let h = Harness::new().await;
        h.say_all(1, &["1", "Ana", "Popescu", "29", " 0712345678 "])
            .await;

        let reply = h.channel.last(1).await;
        assert!(reply.text.contains("Ana Popescu"));
        assert_eq!(reply.keyboard, Keyboard::Remove);
        assert!(h.dispatcher.sessions().is_empty().await);
        assert_eq!(h.store.count_by_phone("0712345678").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn team_members_share_one_team_id() {
        let h = Harness::new().await;
        h.say_all(1, &["2", "Ana", "Popescu", "29", "0700000001", "Да"])
            .await;
        h.say_all(1, &["Ion", "Ionescu", "31", "0700000002", "Нет"])
            .await;
        h.say_all(2, &["1", "Eva", "Lazar", "40", "0700000003"]).await;

        let persisted = h.store.persisted.lock().await;
        assert_eq!(persisted.len(), 3);
        let team_id = persisted[0].team_id.clone().unwrap();
        assert!(Uuid::parse_str(&team_id).is_ok());
        assert_eq!(persisted[1].team_id.as_deref(), Some(team_id.as_str()));
        assert_eq!(persisted[2].team_id, None);

        let members = h.store.team_members(&team_id).await.unwrap();
        let names: Vec<_> = members.iter().map(|m| m.first_name.as_str()).collect();
        assert_eq!(names, ["Ana", "Ion"]);
    }

    #[tokio::test]
    async fn failed_insert_keeps_session_and_retry_succeeds() {
        let h = Harness::new().await;
        h.say_all(1, &["1", "Ana", "Popescu", "29"]).await;

        h.store.fail_writes.store(true, Ordering::SeqCst);
        h.say(1, "0712345678").await;
        assert_eq!(h.channel.last(1).await.text, prompts::TRANSIENT_FAILURE);
        let reg = h.dispatcher.sessions().get(1).await.unwrap();
        assert_eq!(reg.current_step(), Step::PhoneNumber);
        assert_eq!(h.store.count_users().await.unwrap(), 0);

        h.store.fail_writes.store(false, Ordering::SeqCst);
        h.say(1, "0712345678").await;
        assert!(h.channel.last(1).await.text.contains("Ana Popescu"));
        assert!(h.dispatcher.sessions().is_empty().await);
        assert_eq!(h.store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn phone_claimed_by_another_chat_before_save() {
        let h = Harness::new().await;
        h.say_all(1, &["2", "Ana", "Popescu", "29", "0700000001", "Да"])
            .await;
        h.say_all(1, &["Ion", "Ionescu", "31", "0700000002"]).await;

        // Chat 2 passes the duplicate check first and persists Ana's number.
        h.say_all(2, &["1", "Eva", "Lazar", "40", "0700000001"]).await;

        h.say(1, "Нет").await;
        assert_eq!(h.channel.last(1).await.text, prompts::PHONE_CONFLICT);
        assert!(h.dispatcher.sessions().contains(1).await);
        assert_eq!(h.store.count_users().await.unwrap(), 1);

        h.say(1, "/cancel").await;
        assert_eq!(h.channel.last(1).await.text, prompts::CANCELLED);
        assert!(h.dispatcher.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn slow_finalize_holds_back_only_its_own_chat() {
        let h = Harness::new().await;
        h.say_all(1, &["1", "Ana", "Popescu", "29"]).await;
        *h.store.insert_delay.lock().await = Duration::from_millis(200);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(IncomingMessage::new("test", 1, "0711111111")).unwrap();
        tx.send(IncomingMessage::new("test", 1, "/cancel")).unwrap();
        tx.send(IncomingMessage::new("test", 2, "1")).unwrap();
        drop(tx);

        h.dispatcher
            .run(
                Box::pin(UnboundedReceiverStream::new(rx)),
                CancellationToken::new(),
            )
            .await;
        assert!(h.dispatcher.drain(Duration::from_secs(5)).await);

        let sent = h.channel.sent.lock().await;
        let find = |id: ConversationId, matches: &dyn Fn(&str) -> bool| {
            sent.iter()
                .position(|(cid, m)| *cid == id && matches(&m.text))
        };
        let confirmed = find(1, &|t| t.contains("Ana Popescu")).expect("chat 1 not confirmed");
        let other_chat = find(2, &|_| true).expect("chat 2 got no reply");
        assert!(other_chat < confirmed, "chat 2 waited for chat 1's insert");
        // /cancel ran after the insert finished and found no session.
        assert!(find(1, &|t| t == prompts::CANCELLED).is_none());
        assert_eq!(sent.iter().filter(|(cid, _)| *cid == 1).count(), 5);
        drop(sent);

        assert_eq!(h.store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_phone_lookup_keeps_step() {
        let h = Harness::new().await;
        h.say_all(1, &["1", "Ana", "Popescu", "29"]).await;

        h.store.fail_reads.store(true, Ordering::SeqCst);
        h.say(1, "0712345678").await;
        assert_eq!(h.channel.last(1).await.text, prompts::TRANSIENT_FAILURE);

        let reg = h.dispatcher.sessions().get(1).await.unwrap();
        assert_eq!(reg.current_step(), Step::PhoneNumber);
        assert!(reg.current_user().phone_number.is_empty());
    }

    #[tokio::test]
    async fn stalled_store_times_out() {
        let h = Harness::new().await;
        h.say_all(1, &["1", "Ana", "Popescu", "29"]).await;

        h.store.stall.store(true, Ordering::SeqCst);
        h.say(1, "0712345678").await;
        assert_eq!(h.channel.last(1).await.text, prompts::TRANSIENT_FAILURE);
        assert!(h.dispatcher.sessions().contains(1).await);
    }

    #[tokio::test]
    async fn send_failure_does_not_roll_back() {
        let h = Harness::new().await;
        h.channel.fail_sends.store(true, Ordering::SeqCst);
        h.say_all(1, &["1", "Ana"]).await;

        let reg = h.dispatcher.sessions().get(1).await.unwrap();
        assert_eq!(reg.current_step(), Step::LastName);
        assert_eq!(reg.current_user().first_name, "Ana");
    }

    #[tokio::test]
    async fn conversations_are_independent() {
        let h = Harness::new().await;
        h.say(1, "1").await;
        h.say(2, "2").await;
        h.say(1, "Ana").await;

        let one = h.dispatcher.sessions().get(1).await.unwrap();
        let two = h.dispatcher.sessions().get(2).await.unwrap();
        assert_eq!(one.current_step(), Step::LastName);
        assert_eq!(two.current_step(), Step::FirstName);
        assert_eq!(two.registration_type(), RegistrationType::Team);
    }

    #[tokio::test]
    async fn run_applies_messages_in_order_and_drains() {
        let h = Harness::new().await;
        let (tx, rx): (UnboundedSender<IncomingMessage>, _) = mpsc::unbounded_channel();
        for (id, text) in [
            (1, "1"),
            (2, "1"),
            (1, "Ana"),
            (2, "Ion"),
            (1, "Popescu"),
            (1, "29"),
            (2, "Ionescu"),
            (1, "0711111111"),
        ] {
            tx.send(IncomingMessage::new("test", id, text)).unwrap();
        }
        drop(tx);

        let shutdown = CancellationToken::new();
        h.dispatcher
            .run(Box::pin(UnboundedReceiverStream::new(rx)), shutdown)
            .await;
        assert!(h.dispatcher.drain(Duration::from_secs(5)).await);

        assert_eq!(h.store.count_by_phone("0711111111").await.unwrap(), 1);
        // Conversation 2 was mid-registration and is discarded on drain.
        assert!(h.dispatcher.sessions().is_empty().await);
        assert_eq!(h.store.count_users().await.unwrap(), 1);
        assert!(h.channel.texts(1).await.last().unwrap().contains("Ana Popescu"));
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let h = Harness::new().await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let pending = Box::pin(futures::stream::pending::<IncomingMessage>());
        h.dispatcher.run(pending, shutdown).await;
        assert!(h.dispatcher.drain(Duration::from_millis(100)).await);
    }
}
