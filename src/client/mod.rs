//! Client side of the relay: optimistic sends reconciled against the
//! server's confirmations, plus the typing-indicator debounce.
//!
//! [`ChatClient`] is transport-agnostic. It writes [`ClientEvent`]s to an
//! outbound queue and is fed [`ServerEvent`]s through [`ChatClient::apply`].

mod history;
mod timeline;
mod typing;

use std::{collections::BTreeSet, future, time::Duration};

use time::OffsetDateTime;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, warn};

pub use history::HistoryClient;
pub use timeline::{Entry, Notice, PendingMessage, Received, Timeline};
pub use typing::{DEFAULT_TYPING_IDLE, TypingDebounce};

use crate::{
    hub::ANONYMOUS,
    protocol::{
        ClientEvent, ConnId, CorrelationToken, ImagePayload, Message, MessageId, PrivatePayload,
        Scope, SendPayload, ServerEvent, User,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection to the relay is closed")]
    Closed,
    #[error("no identity assigned yet")]
    NotConnected,
    #[error("message has neither text nor an image")]
    EmptyMessage,
    #[error("history request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

pub struct ChatClient {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    identity: Option<ConnId>,
    display_name: Option<String>,
    connected: bool,
    timeline: Timeline,
    users: Vec<User>,
    typing_users: Vec<String>,
    rooms: BTreeSet<String>,
    current_room: Option<String>,
    typing: TypingDebounce,
}

impl ChatClient {
    pub fn new(outbound: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self::with_typing_idle(outbound, DEFAULT_TYPING_IDLE)
    }

    pub fn with_typing_idle(outbound: mpsc::UnboundedSender<ClientEvent>, idle: Duration) -> Self {
        Self {
            outbound,
            identity: None,
            display_name: None,
            connected: false,
            timeline: Timeline::new(),
            users: Vec::new(),
            typing_users: Vec::new(),
            rooms: BTreeSet::new(),
            current_room: None,
            typing: TypingDebounce::new(idle),
        }
    }

    pub fn identity(&self) -> Option<ConnId> {
        self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn typing_users(&self) -> &[String] {
        &self.typing_users
    }

    /// Names typing other than our own.
    pub fn others_typing(&self) -> impl Iterator<Item = &str> {
        let me = self.display_name.as_deref();
        self.typing_users
            .iter()
            .map(String::as_str)
            .filter(move |name| Some(*name) != me)
    }

    pub fn rooms(&self) -> &BTreeSet<String> {
        &self.rooms
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    pub fn announce(&mut self, display_name: impl Into<String>) -> Result<(), ClientError> {
        let display_name = display_name.into();
        self.display_name = Some(display_name.clone());
        self.emit(ClientEvent::Announce(display_name))
    }

    /// Sends text to the current room, or globally when not in one.
    pub fn send_text(&mut self, body: &str) -> Result<CorrelationToken, ClientError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let room = self.current_room.clone();
        let token = self.push_pending(body.to_owned(), None, room.clone())?;
        self.stop_typing()?;
        self.emit(ClientEvent::Send(SendPayload {
            room,
            body: body.to_owned(),
            correlation_token: Some(token.clone()),
        }))?;
        Ok(token)
    }

    /// `image_data` is a data URI.
    pub fn send_image(
        &mut self,
        image_data: impl Into<String>,
        filename: Option<String>,
    ) -> Result<CorrelationToken, ClientError> {
        let image_data = image_data.into();
        let room = self.current_room.clone();
        let body = filename.clone().unwrap_or_else(|| "image".to_owned());
        let token = self.push_pending(body, Some(image_data.clone()), room.clone())?;
        self.stop_typing()?;
        self.emit(ClientEvent::SendImage(ImagePayload {
            image_data,
            filename,
            room,
            correlation_token: Some(token.clone()),
        }))?;
        Ok(token)
    }

    /// Private messages are not shown optimistically; the server echo adds them.
    pub fn send_private(&mut self, target: ConnId, body: &str) -> Result<CorrelationToken, ClientError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let token = CorrelationToken::generate();
        self.stop_typing()?;
        self.emit(ClientEvent::PrivateMessage(PrivatePayload {
            target,
            body: body.to_owned(),
            correlation_token: Some(token.clone()),
        }))?;
        Ok(token)
    }

    /// Joining the global scope name switches back to global sends.
    pub fn join_room(&mut self, room: impl Into<String>) -> Result<(), ClientError> {
        let room = room.into();
        self.current_room = Scope::from_room(Some(&room)).room().map(str::to_owned);
        if let Some(joined) = &self.current_room {
            self.rooms.insert(joined.clone());
        }
        self.emit(ClientEvent::JoinRoom(room))
    }

    pub fn leave_room(&mut self, room: impl Into<String>) -> Result<(), ClientError> {
        let room = room.into();
        if self.current_room.as_deref() == Some(room.as_str()) {
            self.current_room = None;
        }
        self.emit(ClientEvent::LeaveRoom(room))
    }

    pub fn mark_read(&mut self, id: MessageId) -> Result<(), ClientError> {
        self.emit(ClientEvent::MarkRead(id))
    }

    pub fn react(&mut self, id: MessageId, reaction_kind: impl Into<String>) -> Result<(), ClientError> {
        self.emit(ClientEvent::React {
            message_id: id,
            reaction_kind: reaction_kind.into(),
        })
    }

    pub fn keystroke(&mut self, now: Instant) -> Result<(), ClientError> {
        match self.typing.keystroke(now) {
            Some(flag) => self.emit(ClientEvent::SetTyping(flag)),
            None => Ok(()),
        }
    }

    /// Input lost focus.
    pub fn blur(&mut self) -> Result<(), ClientError> {
        self.stop_typing()
    }

    /// Emits `setTyping(false)` if the idle deadline has passed.
    pub fn poll_typing(&mut self, now: Instant) -> Result<(), ClientError> {
        match self.typing.expire(now) {
            Some(flag) => self.emit(ClientEvent::SetTyping(flag)),
            None => Ok(()),
        }
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    /// Resolves when the current typing deadline passes; never resolves
    /// without one. The timer does not borrow the client, so a `select!` loop
    /// can rebuild it each turn and call [`ChatClient::poll_typing`] on wake.
    pub fn typing_timer(&self) -> impl Future<Output = ()> + Send + use<> {
        let deadline = self.typing.deadline();
        async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => future::pending().await,
            }
        }
    }

    /// Transport dropped. Pending entries stay pending.
    pub fn on_disconnect(&mut self) {
        self.connected = false;
        self.typing.stop();
    }

    /// Merges history fetched over HTTP ahead of the live timeline.
    pub fn merge_history(&mut self, history: Vec<Message>) -> usize {
        self.timeline.merge_history(history)
    }

    pub fn apply(&mut self, event: ServerEvent) -> Result<(), ClientError> {
        match event {
            ServerEvent::Welcome { identity } => {
                debug!(%identity, "welcomed");
                self.identity = Some(identity);
                self.connected = true;
            }
            ServerEvent::UserList(users) => self.users = users,
            ServerEvent::UserJoined(user) => {
                self.timeline.push_notice(format!("{} joined the chat", user.display_name));
            }
            ServerEvent::UserLeft(user) => {
                self.timeline.push_notice(format!("{} left the chat", user.display_name));
            }
            ServerEvent::RoomUserJoined { room, user, .. } => {
                let name = user.map_or_else(|| "someone".to_owned(), |u| u.display_name);
                self.timeline.push_notice(format!("{name} joined {room}"));
            }
            ServerEvent::RoomUserLeft { room, user, .. } => {
                let name = user.map_or_else(|| "someone".to_owned(), |u| u.display_name);
                self.timeline.push_notice(format!("{name} left {room}"));
            }
            ServerEvent::Message(message) => {
                let id = message.id;
                let foreign = Some(message.sender_id) != self.identity;
                if let Some(room) = &message.room {
                    self.rooms.insert(room.clone());
                }
                if self.timeline.receive(message) == Received::Appended && foreign {
                    self.emit(ClientEvent::MarkDelivered(id))?;
                }
            }
            ServerEvent::Ack { id, correlation_token, timestamp } => {
                if let Some(token) = correlation_token {
                    self.timeline.confirm(&token, id, timestamp);
                }
            }
            ServerEvent::PrivateMessage(message) => {
                self.timeline.push_private(message);
            }
            ServerEvent::TypingUsers(names) => self.typing_users = names,
            ServerEvent::ReadReceipt { message_id, read_by, .. } => {
                self.timeline.update(message_id, |m| m.read_by = read_by);
            }
            ServerEvent::ReactionUpdate { message_id, reactions } => {
                self.timeline.update(message_id, |m| m.reactions = reactions);
            }
            ServerEvent::DeliveryUpdate { message_id, delivered_by } => {
                self.timeline.update(message_id, |m| m.delivered_by = delivered_by);
            }
            ServerEvent::Rejected { reason, correlation_token } => {
                warn!(%reason, "relay rejected an event");
                if let Some(token) = correlation_token {
                    self.timeline.reject(&token, reason);
                }
            }
        }
        Ok(())
    }

    fn push_pending(
        &mut self,
        body: String,
        image: Option<String>,
        room: Option<String>,
    ) -> Result<CorrelationToken, ClientError> {
        let sender_id = self.identity.ok_or(ClientError::NotConnected)?;
        let token = CorrelationToken::generate();
        self.timeline.push_pending(PendingMessage {
            token: token.clone(),
            sender: self.display_name.clone().unwrap_or_else(|| ANONYMOUS.to_owned()),
            sender_id,
            body,
            image,
            room: Scope::from_room(room.as_deref()).room().map(str::to_owned),
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(token)
    }

    fn stop_typing(&mut self) -> Result<(), ClientError> {
        match self.typing.stop() {
            Some(flag) => self.emit(ClientEvent::SetTyping(flag)),
            None => Ok(()),
        }
    }

    fn emit(&self, event: ClientEvent) -> Result<(), ClientError> {
        self.outbound.send(event).map_err(|_| ClientError::Closed)
    }
}
