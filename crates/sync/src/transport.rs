// Push-channel abstraction.
//
// The sync core talks to the push channel through `ChatTransport`, which
// yields one `TransportConnection` per successful dial: a write half for
// subscribe/publish and an event stream whose end signals closure. The
// production implementation lives in `ws`; tests script their own.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use banter_common::protocol::Topic;
use banter_common::types::{
    GroupId, MessageEvent, MessageId, PresenceStatus, ServerError, TypingIndicator, UserPresence,
};

use crate::config::SyncConfig;
use crate::error::TransportError;

/// Opaque identifier for an active subscription, assigned by the transport.
/// Handles do not survive a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// A decoded server-to-client event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(MessageEvent),
    Typing(TypingIndicator),
    Presence(UserPresence),
    /// Delivered on the personal error queue; forwarded verbatim.
    ServerError(ServerError),
    /// Heartbeat answer; consumed by the connection manager.
    Pong,
}

/// A client-to-server publish, expressed in domain terms. The transport
/// maps these onto wire destinations and payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    SendMessage {
        group_id: GroupId,
        client_temp_id: i64,
        content: String,
        parent_message_id: Option<MessageId>,
    },
    EditMessage {
        group_id: GroupId,
        id: MessageId,
        content: String,
    },
    DeleteMessage {
        group_id: GroupId,
        id: MessageId,
    },
    Typing {
        group_id: GroupId,
        typing: bool,
    },
    Presence {
        status: PresenceStatus,
    },
}

/// One established connection: the write half plus the inbound event
/// stream. The stream ending (None) means the connection closed.
pub struct TransportConnection {
    pub sink: Box<dyn TransportSink>,
    pub events: mpsc::Receiver<InboundEvent>,
}

/// Dials the push channel. The bearer token is attached at connect time and
/// is not refreshed mid-connection.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    async fn connect(
        &self,
        config: &SyncConfig,
        token: &str,
    ) -> Result<TransportConnection, TransportError>;
}

/// Write half of an established connection.
#[async_trait]
pub trait TransportSink: Send {
    async fn subscribe(&mut self, topic: Topic) -> Result<SubscriptionHandle, TransportError>;

    async fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), TransportError>;

    async fn publish(&mut self, frame: OutboundFrame) -> Result<(), TransportError>;

    async fn ping(&mut self) -> Result<(), TransportError>;

    async fn close(&mut self);
}
