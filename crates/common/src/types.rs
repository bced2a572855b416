// Core domain types shared across all Banter crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned group identifier.
pub type GroupId = i64;

/// Server-assigned message identifier. Locally created optimistic messages
/// carry a negative temporary id until the server confirms them.
pub type MessageId = i64;

/// A chat message within a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub group_id: GroupId,
    /// `None` for system messages.
    pub sender_id: Option<i64>,
    pub sender_display_name: String,
    pub content: String,
    pub message_type: MessageType,
    /// Parent message when this is a threaded reply.
    pub parent_message_id: Option<MessageId>,
    /// Opaque reference to an uploaded attachment.
    pub attachment_ref: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reply_count: u32,
    /// Echo of the sender's temporary id, present only on the sender's own
    /// push-delivered copy. Used to reconcile optimistic entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_temp_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    System,
}

/// A message mutation delivered on a group's messages topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageEvent {
    /// A newly created message.
    New { message: Message },
    /// An existing message's content changed; same id, new content.
    Edited { message: Message },
    /// A message was removed.
    Deleted { group_id: GroupId, id: MessageId },
}

impl MessageEvent {
    /// The group this event belongs to.
    pub fn group_id(&self) -> GroupId {
        match self {
            Self::New { message } | Self::Edited { message } => message.group_id,
            Self::Deleted { group_id, .. } => *group_id,
        }
    }
}

/// A typing start/stop notification for one user in one group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingIndicator {
    pub group_id: GroupId,
    pub username: String,
    pub typing: bool,
}

/// Last-known presence for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPresence {
    pub username: String,
    pub status: PresenceStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
    /// Never reported by the server; the local answer for a user with no
    /// recorded presence event. Distinct from `Offline`.
    Unknown,
}

/// A protocol error reported by the server on the personal error queue.
/// Forwarded verbatim to consumers; the sync core does not interpret it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("server error {code}: {message}")]
pub struct ServerError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}
