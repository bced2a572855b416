// Subscribe and publish destinations multiplexed over the push channel.
//
// Message and typing channels are group-scoped; presence and the personal
// error queue are connection-scoped and exist once per connection.

use serde::{Deserialize, Serialize};

use crate::types::GroupId;

/// The four channel kinds a client can be subscribed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Messages,
    Typing,
    Presence,
    Errors,
}

/// A subscribable server-to-client destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// New/edited/deleted messages for one group.
    GroupMessages(GroupId),
    /// Typing indicators for one group.
    GroupTyping(GroupId),
    /// Presence updates for everyone visible to this connection.
    Presence,
    /// The connection's personal error queue.
    Errors,
}

impl Topic {
    /// Canonical destination string, e.g. `/topic/groups/7/messages`.
    pub fn destination(&self) -> String {
        match self {
            Self::GroupMessages(group_id) => format!("/topic/groups/{group_id}/messages"),
            Self::GroupTyping(group_id) => format!("/topic/groups/{group_id}/typing"),
            Self::Presence => "/topic/presence".to_string(),
            Self::Errors => "/user/queue/errors".to_string(),
        }
    }

    /// Parse a destination string back into a topic.
    pub fn parse(destination: &str) -> Option<Self> {
        match destination {
            "/topic/presence" => return Some(Self::Presence),
            "/user/queue/errors" => return Some(Self::Errors),
            _ => {}
        }
        let rest = destination.strip_prefix("/topic/groups/")?;
        let (id, kind) = rest.split_once('/')?;
        let group_id: GroupId = id.parse().ok()?;
        match kind {
            "messages" => Some(Self::GroupMessages(group_id)),
            "typing" => Some(Self::GroupTyping(group_id)),
            _ => None,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::GroupMessages(_) => ChannelKind::Messages,
            Self::GroupTyping(_) => ChannelKind::Typing,
            Self::Presence => ChannelKind::Presence,
            Self::Errors => ChannelKind::Errors,
        }
    }

    /// The group this topic is scoped to, if any.
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::GroupMessages(group_id) | Self::GroupTyping(group_id) => Some(*group_id),
            Self::Presence | Self::Errors => None,
        }
    }

    /// Connection-scoped topics survive group switches and fall only with
    /// the connection itself.
    pub fn is_connection_scoped(&self) -> bool {
        self.group_id().is_none()
    }
}

/// Client-to-server publish destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDestination {
    GroupSend(GroupId),
    GroupTyping(GroupId),
    Presence,
}

impl PublishDestination {
    /// Canonical destination string, e.g. `/app/groups/7/messages`.
    pub fn destination(&self) -> String {
        match self {
            Self::GroupSend(group_id) => format!("/app/groups/{group_id}/messages"),
            Self::GroupTyping(group_id) => format!("/app/groups/{group_id}/typing"),
            Self::Presence => "/app/presence".to_string(),
        }
    }
}
