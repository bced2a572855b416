// Shared scripted mocks for unit tests: a push transport whose connect and
// publish outcomes are queued ahead of time, and an in-memory message API.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use banter_common::protocol::Topic;
use banter_common::types::{GroupId, Message, MessageId, MessageType};

use crate::config::SyncConfig;
use crate::error::{ApiError, TransportError};
use crate::rest::{CreateMessageRequest, MessageApi};
use crate::transport::{
    ChatTransport, InboundEvent, OutboundFrame, SubscriptionHandle, TransportConnection,
    TransportSink,
};

// ── Mock push transport ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockState {
    /// Scripted outcomes for successive connect calls; empty = succeed.
    pub connect_errors: VecDeque<Option<String>>,
    /// Scripted outcomes for successive subscribe calls; empty = succeed.
    pub subscribe_errors: VecDeque<Option<String>>,
    /// Scripted outcomes for successive publish calls; empty = succeed.
    pub publish_errors: VecDeque<Option<String>>,
    pub connects: u32,
    pub closed: bool,
    pub subscribed: Vec<Topic>,
    pub unsubscribed: Vec<SubscriptionHandle>,
    pub published: Vec<OutboundFrame>,
    pub pings: u32,
    /// Sender half of the current connection's event stream.
    pub event_tx: Option<mpsc::Sender<InboundEvent>>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Arc<StdMutex<MockState>>,
    pub connect_delay: Option<Duration>,
}

impl MockTransport {
    pub fn with_connect_errors(errors: Vec<Option<&str>>) -> Self {
        let transport = Self::default();
        transport.lock().connect_errors =
            errors.into_iter().map(|e| e.map(str::to_string)).collect();
        transport
    }

    pub fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn subscribed(&self) -> Vec<Topic> {
        self.lock().subscribed.clone()
    }

    pub fn published(&self) -> Vec<OutboundFrame> {
        self.lock().published.clone()
    }

    /// Simulate an unexpected server-side close.
    pub fn drop_connection(&self) {
        self.lock().event_tx = None;
    }

    /// Deliver a server event on the current connection.
    pub async fn inject(&self, event: InboundEvent) {
        let tx = self.lock().event_tx.clone().expect("no active connection");
        tx.send(event).await.expect("event should enqueue");
    }
}

pub struct MockSink {
    state: Arc<StdMutex<MockState>>,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn subscribe(&mut self, topic: Topic) -> Result<SubscriptionHandle, TransportError> {
        let mut state = self.state.lock().expect("mock state lock");
        if let Some(Some(error)) = state.subscribe_errors.pop_front() {
            return Err(TransportError::WebSocket(error));
        }
        state.subscribed.push(topic);
        Ok(SubscriptionHandle::new(Uuid::new_v4()))
    }

    async fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), TransportError> {
        self.state.lock().expect("mock state lock").unsubscribed.push(handle);
        Ok(())
    }

    async fn publish(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("mock state lock");
        if let Some(Some(error)) = state.publish_errors.pop_front() {
            return Err(TransportError::WebSocket(error));
        }
        state.published.push(frame);
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.state.lock().expect("mock state lock").pings += 1;
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.state.lock().expect("mock state lock");
        state.closed = true;
        state.event_tx = None;
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn connect(
        &self,
        _config: &SyncConfig,
        _token: &str,
    ) -> Result<TransportConnection, TransportError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        state.connects += 1;
        if let Some(Some(error)) = state.connect_errors.pop_front() {
            return Err(TransportError::ConnectFailed(error));
        }
        let (event_tx, events) = mpsc::channel(64);
        state.event_tx = Some(event_tx);
        drop(state);
        Ok(TransportConnection {
            sink: Box::new(MockSink { state: Arc::clone(&self.state) }),
            events,
        })
    }
}

// ── Mock message API ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockApiState {
    /// Scripted failures for successive create calls; empty = succeed.
    pub create_errors: VecDeque<Option<String>>,
    pub create_calls: Vec<(GroupId, CreateMessageRequest)>,
    pub edit_calls: Vec<(GroupId, MessageId, String)>,
    pub delete_calls: Vec<(GroupId, MessageId)>,
    pub recent_calls: Vec<(GroupId, u32)>,
    pub recent_messages: Vec<Message>,
    pub next_id: MessageId,
}

#[derive(Clone)]
pub struct MockApi {
    pub state: Arc<StdMutex<MockApiState>>,
}

impl Default for MockApi {
    fn default() -> Self {
        let state = MockApiState { next_id: 100, ..Default::default() };
        Self { state: Arc::new(StdMutex::new(state)) }
    }
}

impl MockApi {
    pub fn lock(&self) -> MutexGuard<'_, MockApiState> {
        self.state.lock().expect("mock api lock")
    }

    pub fn with_create_errors(errors: Vec<Option<&str>>) -> Self {
        let api = Self::default();
        api.lock().create_errors = errors.into_iter().map(|e| e.map(str::to_string)).collect();
        api
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls.len()
    }
}

#[async_trait]
impl MessageApi for MockApi {
    async fn create_message(
        &self,
        group_id: GroupId,
        request: &CreateMessageRequest,
    ) -> Result<Message, ApiError> {
        let mut state = self.lock();
        state.create_calls.push((group_id, request.clone()));
        if let Some(Some(error)) = state.create_errors.pop_front() {
            return Err(ApiError::Status { status: 503, body: error });
        }
        let id = state.next_id;
        state.next_id += 1;
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
        let mut state = self.lock();
        state.edit_calls.push((group_id, id, content.to_string()));
        Ok(Message {
            id,
            group_id,
            sender_id: Some(1),
            sender_display_name: "me".to_string(),
            content: content.to_string(),
            message_type: MessageType::Text,
            parent_message_id: None,
            attachment_ref: None,
            is_edited: true,
            created_at: Utc::now(),
            reply_count: 0,
            client_temp_id: None,
        })
    }

    async fn delete_message(&self, group_id: GroupId, id: MessageId) -> Result<(), ApiError> {
        self.lock().delete_calls.push((group_id, id));
        Ok(())
    }

    async fn recent_messages(
        &self,
        group_id: GroupId,
        limit: u32,
    ) -> Result<Vec<Message>, ApiError> {
        let mut state = self.lock();
        state.recent_calls.push((group_id, limit));
        Ok(state.recent_messages.clone())
    }
}
