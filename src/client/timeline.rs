use std::collections::{BTreeSet, HashSet};

use time::OffsetDateTime;

use crate::protocol::{ConnId, CorrelationToken, Message, MessageId, PrivateMessage};

/// A message this client sent that the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub token: CorrelationToken,
    pub sender: String,
    pub sender_id: ConnId,
    pub body: String,
    pub image: Option<String>,
    pub room: Option<String>,
    /// Local clock at send time; replaced by the server timestamp on confirmation.
    pub created_at: OffsetDateTime,
}

impl PendingMessage {
    fn confirm(&self, id: MessageId, timestamp: OffsetDateTime) -> Message {
        Message {
            id,
            sender: self.sender.clone(),
            sender_id: self.sender_id,
            body: self.body.clone(),
            image: self.image.clone(),
            timestamp,
            room: self.room.clone(),
            reactions: Default::default(),
            read_by: BTreeSet::new(),
            delivered_by: BTreeSet::new(),
            correlation_token: Some(self.token.clone()),
        }
    }
}

/// Local system line such as "Bob joined the chat".
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub text: String,
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Pending(PendingMessage),
    Confirmed(Message),
    /// The server refused the message; terminal.
    Failed {
        message: PendingMessage,
        reason: String,
    },
    Private(PrivateMessage),
    Notice(Notice),
}

impl Entry {
    pub fn token(&self) -> Option<&CorrelationToken> {
        match self {
            Entry::Pending(pending) | Entry::Failed { message: pending, .. } => Some(&pending.token),
            Entry::Confirmed(message) => message.correlation_token.as_ref(),
            Entry::Private(message) => message.correlation_token.as_ref(),
            Entry::Notice(_) => None,
        }
    }

    pub fn id(&self) -> Option<MessageId> {
        match self {
            Entry::Confirmed(message) => Some(message.id),
            Entry::Private(message) => Some(message.id),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Entry::Pending(_))
    }
}

/// What [`Timeline::receive`] did with an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// One of our entries was replaced in place by the server copy.
    Reconciled,
    /// New message appended at the end.
    Appended,
    /// Already present; nothing changed.
    Duplicate,
}

/// Ordered list of everything the user sees.
///
/// Each correlation token appears on at most one entry. Confirming a token
/// replaces its pending entry in place and is idempotent.
#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<Entry>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingMessage> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Pending(pending) => Some(pending),
            _ => None,
        })
    }

    pub fn push_pending(&mut self, pending: PendingMessage) {
        self.entries.push(Entry::Pending(pending));
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.entries.push(Entry::Notice(Notice {
            text: text.into(),
            at: OffsetDateTime::now_utc(),
        }));
    }

    pub fn push_private(&mut self, message: PrivateMessage) -> Received {
        if self.position_by_id(message.id).is_some() {
            return Received::Duplicate;
        }
        self.entries.push(Entry::Private(message));
        Received::Appended
    }

    /// Applies a synchronous acknowledgement. Returns true if a pending
    /// entry was confirmed by it.
    pub fn confirm(&mut self, token: &CorrelationToken, id: MessageId, timestamp: OffsetDateTime) -> bool {
        let Some(index) = self.position_by_token(token) else {
            return false;
        };
        let Entry::Pending(pending) = &self.entries[index] else {
            return false;
        };
        self.entries[index] = Entry::Confirmed(pending.confirm(id, timestamp));
        true
    }

    /// Applies a broadcast message: reconciles our own echo or appends
    /// anyone else's. The server copy replaces whatever the ack built, so
    /// both arrival orders end on the same fields.
    pub fn receive(&mut self, message: Message) -> Received {
        if let Some(index) = message
            .correlation_token
            .as_ref()
            .and_then(|token| self.position_by_token(token))
        {
            return match &self.entries[index] {
                Entry::Pending(_) => {
                    self.entries[index] = Entry::Confirmed(message);
                    Received::Reconciled
                }
                Entry::Confirmed(existing) if *existing == message => Received::Duplicate,
                Entry::Confirmed(existing) if existing.id == message.id => {
                    self.entries[index] = Entry::Confirmed(message);
                    Received::Reconciled
                }
                _ => Received::Duplicate,
            };
        }
        if self.position_by_id(message.id).is_some() {
            return Received::Duplicate;
        }
        self.entries.push(Entry::Confirmed(message));
        Received::Appended
    }

    /// Moves a pending entry to the terminal failed state.
    pub fn reject(&mut self, token: &CorrelationToken, reason: impl Into<String>) -> bool {
        let Some(index) = self.position_by_token(token) else {
            return false;
        };
        let Entry::Pending(pending) = &self.entries[index] else {
            return false;
        };
        self.entries[index] = Entry::Failed {
            message: pending.clone(),
            reason: reason.into(),
        };
        true
    }

    /// Runs `apply` on the confirmed message with `id`, if present.
    pub fn update(&mut self, id: MessageId, apply: impl FnOnce(&mut Message)) -> bool {
        match self.entries.iter_mut().find_map(|entry| match entry {
            Entry::Confirmed(message) if message.id == id => Some(message),
            _ => None,
        }) {
            Some(message) => {
                apply(message);
                true
            }
            None => false,
        }
    }

    /// Places older history ahead of the live timeline, skipping messages
    /// already shown. A stored copy of one of our pending sends confirms it
    /// in place instead.
    pub fn merge_history(&mut self, history: Vec<Message>) -> usize {
        let known_ids: HashSet<MessageId> = self.entries.iter().filter_map(Entry::id).collect();
        let known_tokens: HashSet<CorrelationToken> =
            self.entries.iter().filter_map(Entry::token).cloned().collect();

        let mut older = Vec::new();
        for message in history {
            if known_ids.contains(&message.id) {
                continue;
            }
            match message.correlation_token.clone() {
                Some(token) if known_tokens.contains(&token) => {
                    let index = self.position_by_token(&token);
                    if let Some(index) = index.filter(|&i| self.entries[i].is_pending()) {
                        self.entries[index] = Entry::Confirmed(message);
                    }
                }
                _ => older.push(Entry::Confirmed(message)),
            }
        }
        let added = older.len();
        self.entries.splice(0..0, older);
        added
    }

    fn position_by_token(&self, token: &CorrelationToken) -> Option<usize> {
        self.entries.iter().position(|entry| entry.token() == Some(token))
    }

    fn position_by_id(&self, id: MessageId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id() == Some(id))
    }
}
