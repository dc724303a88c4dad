//! Wire types shared by the relay and its clients.
//!
//! Every frame on the event channel is a JSON object of the form
//! `{"event": "<name>", "data": <payload>}` with camelCase names.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Scope name clients may use to address the global audience explicitly.
pub const GLOBAL_SCOPE: &str = "global";

/// Opaque per-connection token. Lives exactly as long as the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(pub Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Server-assigned message id, strictly increasing within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Client-assigned key that ties a provisional message to its confirmed copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(pub String);

impl CorrelationToken {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub identity: ConnId,
    pub display_name: String,
}

/// Broadcast scope of a message: everyone, or the subscribers of one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Room(String),
}

impl Scope {
    /// Absent, blank, or `"global"` room names all mean global scope.
    pub fn from_room(room: Option<&str>) -> Self {
        match room.map(str::trim) {
            None | Some("") | Some(GLOBAL_SCOPE) => Scope::Global,
            Some(room) => Scope::Room(room.to_owned()),
        }
    }

    pub fn room(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Room(room) => Some(room),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub sender_id: ConnId,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default)]
    pub reactions: BTreeMap<String, u32>,
    #[serde(default)]
    pub read_by: BTreeSet<ConnId>,
    #[serde(default)]
    pub delivered_by: BTreeSet<ConnId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_token: Option<CorrelationToken>,
}

impl Message {
    pub fn scope(&self) -> Scope {
        Scope::from_room(self.room.as_deref())
    }
}

/// Direct message between two connections. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub id: MessageId,
    pub sender: String,
    pub sender_id: ConnId,
    pub target: ConnId,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_token: Option<CorrelationToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub correlation_token: Option<CorrelationToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub image_data: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub correlation_token: Option<CorrelationToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivatePayload {
    pub target: ConnId,
    pub body: String,
    #[serde(default)]
    pub correlation_token: Option<CorrelationToken>,
}

/// Client to server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Announce(String),
    Send(SendPayload),
    SendImage(ImagePayload),
    JoinRoom(String),
    LeaveRoom(String),
    SetTyping(bool),
    MarkRead(MessageId),
    React {
        message_id: MessageId,
        reaction_kind: String,
    },
    MarkDelivered(MessageId),
    PrivateMessage(PrivatePayload),
}

/// Server to client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Welcome {
        identity: ConnId,
    },
    UserList(Vec<User>),
    UserJoined(User),
    UserLeft(User),
    RoomUserJoined {
        room: String,
        identity: ConnId,
        user: Option<User>,
    },
    RoomUserLeft {
        room: String,
        identity: ConnId,
        user: Option<User>,
    },
    Message(Message),
    Ack {
        id: MessageId,
        correlation_token: Option<CorrelationToken>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    PrivateMessage(PrivateMessage),
    TypingUsers(Vec<String>),
    ReadReceipt {
        message_id: MessageId,
        reader: ConnId,
        read_by: BTreeSet<ConnId>,
    },
    ReactionUpdate {
        message_id: MessageId,
        reactions: BTreeMap<String, u32>,
    },
    DeliveryUpdate {
        message_id: MessageId,
        delivered_by: BTreeSet<ConnId>,
    },
    Rejected {
        reason: String,
        correlation_token: Option<CorrelationToken>,
    },
}
