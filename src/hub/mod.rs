//! Broadcast coordinator.
//!
//! [`Hub`] owns the presence, room, message, and typing tables and handles
//! one event at a time to completion. [`HubHandle`] runs a hub on its own
//! task so every connection's events are serialized through it.

mod handle;

use std::collections::HashMap;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use handle::{HubError, HubHandle, Session};

use crate::{
    protocol::{
        ClientEvent, ConnId, CorrelationToken, ImagePayload, Message, MessageId, PrivatePayload,
        PrivateMessage, Scope, SendPayload, ServerEvent, User,
    },
    state::{MessageStore, PresenceRegistry, RoomTable, TypingTracker},
};

/// Sender name used for connections that never announced.
pub const ANONYMOUS: &str = "Anonymous";

/// Outbound queue of a single connection.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// A message as submitted, before the hub enriches it.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub body: String,
    pub image: Option<String>,
    pub scope: Option<String>,
    pub correlation_token: Option<CorrelationToken>,
}

impl From<SendPayload> for Draft {
    fn from(SendPayload { room, body, correlation_token }: SendPayload) -> Self {
        Self {
            body,
            image: None,
            scope: room,
            correlation_token,
        }
    }
}

impl From<ImagePayload> for Draft {
    fn from(ImagePayload { image_data, filename, room, correlation_token }: ImagePayload) -> Self {
        Self {
            body: filename.unwrap_or_else(|| "image".to_owned()),
            image: Some(image_data),
            scope: room,
            correlation_token,
        }
    }
}

/// Synchronous confirmation returned to the submitting connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub id: MessageId,
    pub correlation_token: Option<CorrelationToken>,
    pub timestamp: OffsetDateTime,
}

impl From<Ack> for ServerEvent {
    fn from(Ack { id, correlation_token, timestamp }: Ack) -> Self {
        ServerEvent::Ack { id, correlation_token, timestamp }
    }
}

/// Why a submission was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("message has neither text nor an image")]
    Empty,
}

#[derive(Debug, Default)]
pub struct Hub {
    presence: PresenceRegistry,
    rooms: RoomTable,
    store: MessageStore,
    typing: TypingTracker,
    connections: HashMap<ConnId, Outbound>,
}

impl Hub {
    pub fn new(
        presence: PresenceRegistry,
        rooms: RoomTable,
        store: MessageStore,
        typing: TypingTracker,
    ) -> Self {
        Self {
            presence,
            rooms,
            store,
            typing,
            connections: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(
            PresenceRegistry::new(),
            RoomTable::new(),
            MessageStore::new(capacity),
            TypingTracker::new(),
        )
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn typing(&self) -> &TypingTracker {
        &self.typing
    }

    pub fn connect(&mut self, conn: ConnId, outbound: Outbound) {
        info!(%conn, "connection opened");
        let _ = outbound.send(ServerEvent::Welcome { identity: conn });
        self.connections.insert(conn, outbound);
    }

    /// Removes every trace of `conn` in one step.
    pub fn disconnect(&mut self, conn: ConnId) {
        if self.connections.remove(&conn).is_none() {
            return;
        }
        let left = self.presence.remove(conn);
        let was_typing = self.typing.clear(conn);
        let rooms = self.rooms.leave_all(conn);

        if let Some(user) = &left {
            info!(%conn, name = %user.display_name, ?rooms, "user left");
            self.broadcast(ServerEvent::UserLeft(user.clone()));
        } else {
            info!(%conn, "connection closed");
        }
        self.broadcast_user_list();
        if was_typing {
            self.broadcast_typing();
        }
    }

    pub fn handle(&mut self, conn: ConnId, event: ClientEvent) {
        debug!(%conn, ?event, "event");
        match event {
            ClientEvent::Announce(name) => self.announce(conn, name),
            ClientEvent::Send(payload) => self.submit_and_ack(conn, payload.into()),
            ClientEvent::SendImage(payload) => self.submit_and_ack(conn, payload.into()),
            ClientEvent::JoinRoom(room) => self.join_room(conn, &room),
            ClientEvent::LeaveRoom(room) => self.leave_room(conn, &room),
            ClientEvent::SetTyping(is_typing) => self.set_typing(conn, is_typing),
            ClientEvent::MarkRead(id) => self.mark_read(conn, id),
            ClientEvent::React { message_id, reaction_kind } => self.react(message_id, &reaction_kind),
            ClientEvent::MarkDelivered(id) => self.mark_delivered(id, conn),
            ClientEvent::PrivateMessage(payload) => self.private_message(conn, payload),
        }
    }

    /// Sends an explicit rejection to `conn` only.
    pub fn reject(&self, conn: ConnId, reason: String, correlation_token: Option<CorrelationToken>) {
        warn!(%conn, %reason, "rejected event");
        self.send_to(conn, ServerEvent::Rejected { reason, correlation_token });
    }

    pub fn announce(&mut self, conn: ConnId, display_name: String) {
        let user = self.presence.announce(conn, display_name);
        info!(%conn, name = %user.display_name, "user joined");
        self.broadcast_user_list();
        self.broadcast(ServerEvent::UserJoined(user));
    }

    /// Blank names and the global scope name are not rooms.
    pub fn join_room(&mut self, conn: ConnId, room: &str) {
        let Scope::Room(room) = Scope::from_room(Some(room)) else {
            debug!(%conn, room, "join of the global scope ignored");
            return;
        };
        let room = room.as_str();
        if !self.rooms.join(conn, room) {
            debug!(%conn, room, "already in room");
        }
        let event = ServerEvent::RoomUserJoined {
            room: room.to_owned(),
            identity: conn,
            user: self.presence.get(conn).cloned(),
        };
        self.publish(&Scope::Room(room.to_owned()), event);
    }

    pub fn leave_room(&mut self, conn: ConnId, room: &str) {
        let Scope::Room(room) = Scope::from_room(Some(room)) else {
            return;
        };
        let room = room.as_str();
        if !self.rooms.leave(conn, room) {
            debug!(%conn, room, "leave for a room never joined");
            return;
        }
        let event = ServerEvent::RoomUserLeft {
            room: room.to_owned(),
            identity: conn,
            user: self.presence.get(conn).cloned(),
        };
        self.publish(&Scope::Room(room.to_owned()), event);
    }

    fn submit_and_ack(&mut self, conn: ConnId, draft: Draft) {
        let correlation_token = draft.correlation_token.clone();
        match self.submit(conn, draft) {
            Ok(ack) => self.send_to(conn, ack.into()),
            Err(rejection) => self.reject(conn, rejection.to_string(), correlation_token),
        }
    }

    /// Stores and broadcasts a message, returning the acknowledgement for
    /// the author. The author is part of the audience like anyone else.
    pub fn submit(&mut self, conn: ConnId, draft: Draft) -> Result<Ack, Rejection> {
        if draft.body.trim().is_empty() && draft.image.is_none() {
            return Err(Rejection::Empty);
        }

        let scope = Scope::from_room(draft.scope.as_deref());
        if let Scope::Room(room) = &scope {
            self.rooms.ensure(room);
        }

        let message = Message {
            id: self.store.allocate_id(),
            sender: self.sender_name(conn),
            sender_id: conn,
            body: draft.body,
            image: draft.image,
            timestamp: OffsetDateTime::now_utc(),
            room: scope.room().map(str::to_owned),
            reactions: Default::default(),
            read_by: Default::default(),
            delivered_by: Default::default(),
            correlation_token: draft.correlation_token,
        };
        let ack = Ack {
            id: message.id,
            correlation_token: message.correlation_token.clone(),
            timestamp: message.timestamp,
        };

        debug!(%conn, id = %message.id, ?scope, "message stored");
        if let Some(evicted) = self.store.append(message.clone()) {
            debug!(id = %evicted.id, "evicted oldest message");
        }
        self.publish(&scope, ServerEvent::Message(message));
        Ok(ack)
    }

    pub fn mark_read(&mut self, reader: ConnId, id: MessageId) {
        let Some(message) = self.store.get_mut(id) else {
            debug!(%id, "read receipt for unknown message");
            return;
        };
        if !message.read_by.insert(reader) {
            return;
        }
        let scope = message.scope();
        let event = ServerEvent::ReadReceipt {
            message_id: id,
            reader,
            read_by: message.read_by.clone(),
        };
        self.publish(&scope, event);
    }

    /// Counts every call, including repeats from the same connection.
    pub fn react(&mut self, id: MessageId, reaction_kind: &str) {
        let Some(message) = self.store.get_mut(id) else {
            debug!(%id, "reaction for unknown message");
            return;
        };
        *message.reactions.entry(reaction_kind.to_owned()).or_default() += 1;
        let scope = message.scope();
        let event = ServerEvent::ReactionUpdate {
            message_id: id,
            reactions: message.reactions.clone(),
        };
        self.publish(&scope, event);
    }

    pub fn mark_delivered(&mut self, id: MessageId, deliverer: ConnId) {
        let Some(message) = self.store.get_mut(id) else {
            debug!(%id, "delivery for unknown message");
            return;
        };
        if !message.delivered_by.insert(deliverer) {
            return;
        }
        let scope = message.scope();
        let event = ServerEvent::DeliveryUpdate {
            message_id: id,
            delivered_by: message.delivered_by.clone(),
        };
        self.publish(&scope, event);
    }

    pub fn set_typing(&mut self, conn: ConnId, is_typing: bool) {
        if self.presence.get(conn).is_none() {
            debug!(%conn, "typing from a connection that never announced");
            return;
        }
        if self.typing.set(conn, is_typing) {
            self.broadcast_typing();
        }
    }

    /// Delivered to the target and echoed to the sender; never stored.
    pub fn private_message(&mut self, conn: ConnId, payload: PrivatePayload) {
        let PrivatePayload { target, body, correlation_token } = payload;
        if !self.connections.contains_key(&target) {
            debug!(%conn, %target, "private message to unknown connection");
            return;
        }
        if body.trim().is_empty() {
            self.reject(conn, Rejection::Empty.to_string(), correlation_token);
            return;
        }

        let message = PrivateMessage {
            id: self.store.allocate_id(),
            sender: self.sender_name(conn),
            sender_id: conn,
            target,
            body,
            timestamp: OffsetDateTime::now_utc(),
            correlation_token,
        };
        if target != conn {
            self.send_to(target, ServerEvent::PrivateMessage(message.clone()));
        }
        self.send_to(conn, ServerEvent::PrivateMessage(message));
    }

    pub fn history(&self, before: Option<OffsetDateTime>, limit: usize) -> Vec<Message> {
        self.store.list_before(before, limit)
    }

    pub fn search(&self, query: &str) -> Vec<Message> {
        self.store.search(query)
    }

    pub fn users(&self) -> Vec<User> {
        self.presence.list()
    }

    fn sender_name(&self, conn: ConnId) -> String {
        self.presence
            .display_name(conn)
            .unwrap_or(ANONYMOUS)
            .to_owned()
    }

    fn broadcast_user_list(&self) {
        self.broadcast(ServerEvent::UserList(self.presence.list()));
    }

    fn broadcast_typing(&self) {
        self.broadcast(ServerEvent::TypingUsers(self.typing.project(&self.presence)));
    }

    fn send_to(&self, conn: ConnId, event: ServerEvent) {
        if let Some(outbound) = self.connections.get(&conn) {
            let _ = outbound.send(event);
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        for outbound in self.connections.values() {
            let _ = outbound.send(event.clone());
        }
    }

    /// Resolves `scope` to its audience: every connection, or exactly the
    /// room's current subscribers.
    fn publish(&self, scope: &Scope, event: ServerEvent) {
        match scope {
            Scope::Global => self.broadcast(event),
            Scope::Room(room) => {
                for conn in self.rooms.members(room) {
                    self.send_to(conn, event.clone());
                }
            }
        }
    }
}
