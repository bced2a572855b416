// Test doubles for integration tests: a fake push server that accepts
// subscriptions and echoes message publishes back with server-assigned ids,
// and an in-memory REST API sharing the same id space semantics.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use banter_common::protocol::Topic;
use banter_common::types::{
    GroupId, Message, MessageEvent, MessageId, MessageType, ServerError, TypingIndicator,
    UserPresence,
};
use banter_sync::rest::CreateMessageRequest;
use banter_sync::transport::{TransportConnection, TransportSink};
use banter_sync::{
    ApiError, ChatTransport, InboundEvent, MessageApi, OutboundFrame, SubscriptionHandle,
    SyncConfig, TransportError,
};

/// Route core logs through the test harness; `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> SyncConfig {
    init_tracing();
    let mut config = SyncConfig::default();
    config.ws_url = "ws://127.0.0.1:9100/ws".to_string();
    config.api_url = "http://127.0.0.1:9101".to_string();
    config.username = "me".to_string();
    config
}

pub fn server_message(group_id: GroupId, id: MessageId, content: &str) -> Message {
    Message {
        id,
        group_id,
        sender_id: Some(7),
        sender_display_name: "ann".to_string(),
        content: content.to_string(),
        message_type: MessageType::Text,
        parent_message_id: None,
        attachment_ref: None,
        is_edited: false,
        created_at: Utc::now(),
        reply_count: 0,
        client_temp_id: None,
    }
}

/// Poll until a condition holds; sleeps auto-advance under paused time.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

// ── Fake push server ────────────────────────────────────────────────

pub struct ServerState {
    /// Upcoming connect attempts that should be refused.
    pub fail_connects: u32,
    pub connects: u32,
    pub subscriptions: Vec<Topic>,
    pub unsubscriptions: u32,
    pub published: Vec<OutboundFrame>,
    /// When set, message publishes are echoed back with a server id.
    pub echo: bool,
    pub next_message_id: MessageId,
    pub event_tx: Option<mpsc::Sender<InboundEvent>>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            fail_connects: 0,
            connects: 0,
            subscriptions: Vec::new(),
            unsubscriptions: 0,
            published: Vec::new(),
            echo: true,
            next_message_id: 1,
            event_tx: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().expect("server state lock")
    }

    pub fn subscription_count(&self, topic: Topic) -> usize {
        self.lock().subscriptions.iter().filter(|t| **t == topic).count()
    }

    pub fn published(&self) -> Vec<OutboundFrame> {
        self.lock().published.clone()
    }

    pub fn drop_connection(&self) {
        self.lock().event_tx = None;
    }

    /// Deliver an arbitrary server event on the current connection.
    pub async fn inject(&self, event: InboundEvent) {
        let tx = self.lock().event_tx.clone().expect("no active connection");
        tx.send(event).await.expect("event should enqueue");
    }

    pub async fn inject_typing(&self, group_id: GroupId, username: &str, typing: bool) {
        self.inject(InboundEvent::Typing(TypingIndicator {
            group_id,
            username: username.to_string(),
            typing,
        }))
        .await;
    }

    pub async fn inject_presence(&self, username: &str, status: banter_common::types::PresenceStatus) {
        self.inject(InboundEvent::Presence(UserPresence {
            username: username.to_string(),
            status,
            last_seen: Some(Utc::now()),
        }))
        .await;
    }

    pub async fn inject_error(&self, code: &str, message: &str) {
        self.inject(InboundEvent::ServerError(ServerError {
            code: code.to_string(),
            message: message.to_string(),
            group_id: None,
        }))
        .await;
    }
}

pub struct FakeSink {
    state: Arc<Mutex<ServerState>>,
}

#[async_trait]
impl TransportSink for FakeSink {
    async fn subscribe(&mut self, topic: Topic) -> Result<SubscriptionHandle, TransportError> {
        self.state.lock().expect("server state lock").subscriptions.push(topic);
        Ok(SubscriptionHandle::new(Uuid::new_v4()))
    }

    async fn unsubscribe(&mut self, _handle: SubscriptionHandle) -> Result<(), TransportError> {
        self.state.lock().expect("server state lock").unsubscriptions += 1;
        Ok(())
    }

    async fn publish(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        let (echo, tx) = {
            let mut state = self.state.lock().expect("server state lock");
            state.published.push(frame.clone());
            (state.echo, state.event_tx.clone())
        };
        if !echo {
            return Ok(());
        }
        let Some(tx) = tx else { return Ok(()) };

        // Behave like the real backend: sends come back on the messages
        // topic with a server id and the sender's temp id attached.
        match frame {
            OutboundFrame::SendMessage { group_id, client_temp_id, content, parent_message_id } => {
                let id = {
                    let mut state = self.state.lock().expect("server state lock");
                    let id = state.next_message_id;
                    state.next_message_id += 1;
                    id
                };
                let message = Message {
                    id,
                    group_id,
                    sender_id: Some(1),
                    sender_display_name: "me".to_string(),
                    content,
                    message_type: MessageType::Text,
                    parent_message_id,
                    attachment_ref: None,
                    is_edited: false,
                    created_at: Utc::now(),
                    reply_count: 0,
                    client_temp_id: Some(client_temp_id),
                };
                let _ = tx.send(InboundEvent::Message(MessageEvent::New { message })).await;
            }
            OutboundFrame::DeleteMessage { group_id, id } => {
                let _ = tx.send(InboundEvent::Message(MessageEvent::Deleted { group_id, id })).await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        let tx = self.state.lock().expect("server state lock").event_tx.clone();
        if let Some(tx) = tx {
            let _ = tx.send(InboundEvent::Pong).await;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.state.lock().expect("server state lock").event_tx = None;
    }
}

#[async_trait]
impl ChatTransport for FakeServer {
    async fn connect(
        &self,
        _config: &SyncConfig,
        _token: &str,
    ) -> Result<TransportConnection, TransportError> {
        let mut state = self.lock();
        state.connects += 1;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(TransportError::ConnectFailed("refused".to_string()));
        }
        let (event_tx, events) = mpsc::channel(64);
        state.event_tx = Some(event_tx);
        drop(state);
        Ok(TransportConnection {
            sink: Box::new(FakeSink { state: Arc::clone(&self.state) }),
            events,
        })
    }
}

// ── Fake REST API ───────────────────────────────────────────────────

#[derive(Default)]
pub struct ApiState {
    pub create_calls: Vec<(GroupId, CreateMessageRequest)>,
    pub recent: Vec<Message>,
    pub next_message_id: MessageId,
}

#[derive(Clone)]
pub struct FakeApi {
    state: Arc<Mutex<ApiState>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ApiState { next_message_id: 1_000, ..Default::default() })),
        }
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().expect("api state lock")
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls.len()
    }
}

#[async_trait]
impl MessageApi for FakeApi {
    async fn create_message(
        &self,
        group_id: GroupId,
        request: &CreateMessageRequest,
    ) -> Result<Message, ApiError> {
        let mut state = self.lock();
        state.create_calls.push((group_id, request.clone()));
        let id = state.next_message_id;
        state.next_message_id += 1;
        Ok(Message {
            id,
            group_id,
            sender_id: Some(1),
            sender_display_name: "me".to_string(),
            content: request.content.clone(),
            message_type: MessageType::Text,
            parent_message_id: request.parent_message_id,
            attachment_ref: None,
            is_edited: false,
            created_at: Utc::now(),
            reply_count: 0,
            client_temp_id: Some(request.client_temp_id),
        })
    }

    async fn edit_message(
        &self,
        group_id: GroupId,
        id: MessageId,
        content: &str,
    ) -> Result<Message, ApiError> {
        let mut message = server_message(group_id, id, content);
        message.is_edited = true;
        Ok(message)
    }

    async fn delete_message(&self, _group_id: GroupId, _id: MessageId) -> Result<(), ApiError> {
        Ok(())
    }

    async fn recent_messages(
        &self,
        _group_id: GroupId,
        _limit: u32,
    ) -> Result<Vec<Message>, ApiError> {
        Ok(self.lock().recent.clone())
    }
}
