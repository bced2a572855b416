// WebSocket frame types for the banter-sync.v1 protocol.
//
// Frames are JSON text messages tagged by `type`. Authentication happens at
// connect time via the `Authorization` header, not in-band; there is no
// hello handshake beyond the HTTP upgrade.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{GroupId, MessageId, PresenceStatus};

/// Protocol version, sent as the `X-Banter-Protocol` header at connect time.
pub const PROTOCOL_VERSION: &str = "banter-sync.v1";

/// All frame types in the banter-sync.v1 WebSocket protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsFrame {
    /// Client -> Server: subscribe to a topic. `id` is chosen by the client
    /// and identifies the subscription in `Event` frames.
    Subscribe {
        id: Uuid,
        destination: String,
    },

    /// Client -> Server: cancel a subscription.
    Unsubscribe {
        id: Uuid,
    },

    /// Client -> Server: publish a payload to an application destination.
    Publish {
        destination: String,
        payload: serde_json::Value,
    },

    /// Client -> Server: heartbeat probe.
    Ping,

    /// Server -> Client: heartbeat answer.
    Pong,

    /// Server -> Client: an event delivered on a subscribed destination.
    Event {
        subscription: Uuid,
        destination: String,
        payload: serde_json::Value,
    },

    /// Server -> Client: protocol or delivery error.
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<GroupId>,
    },
}

// ── Publish payloads ────────────────────────────────────────────────

/// Payload for `/app/groups/{id}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MessageOp {
    Send {
        client_temp_id: i64,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<MessageId>,
    },
    Edit {
        id: MessageId,
        content: String,
    },
    Delete {
        id: MessageId,
    },
}

/// Payload for `/app/groups/{id}/typing`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingPayload {
    pub typing: bool,
}

/// Payload for `/app/presence`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresencePayload {
    pub status: PresenceStatus,
}
