use std::collections::VecDeque;

use time::OffsetDateTime;

use crate::protocol::{Message, MessageId};

pub const DEFAULT_CAPACITY: usize = 1000;

/// Append-only message log with FIFO eviction across all scopes.
///
/// Ids come from [`MessageStore::allocate_id`] and are strictly increasing,
/// so the log is always sorted by id.
#[derive(Debug)]
pub struct MessageStore {
    messages: VecDeque<Message>,
    capacity: usize,
    last_id: u64,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MessageStore {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
            last_id: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn allocate_id(&mut self) -> MessageId {
        self.last_id += 1;
        MessageId(self.last_id)
    }

    /// Stores `message`, returning the evicted oldest entry if the store was full.
    pub fn append(&mut self, message: Message) -> Option<Message> {
        debug_assert!(
            self.messages.back().is_none_or(|last| last.id < message.id),
            "message ids must be appended in increasing order"
        );
        self.messages.push_back(message);
        if self.messages.len() > self.capacity {
            self.messages.pop_front()
        } else {
            None
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        let index = self.index_of(id)?;
        self.messages.get(index)
    }

    pub fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        let index = self.index_of(id)?;
        self.messages.get_mut(index)
    }

    fn index_of(&self, id: MessageId) -> Option<usize> {
        self.messages.binary_search_by_key(&id, |m| m.id).ok()
    }

    /// The `limit` most recent messages created strictly before `before`
    /// (or all messages when `before` is `None`), oldest first.
    pub fn list_before(&self, before: Option<OffsetDateTime>, limit: usize) -> Vec<Message> {
        let limit = limit.min(self.capacity);
        let mut page: Vec<Message> = self
            .messages
            .iter()
            .rev()
            .filter(|m| before.is_none_or(|before| m.timestamp < before))
            .take(limit)
            .cloned()
            .collect();
        page.reverse();
        page
    }

    /// Case-insensitive substring match on the body. An empty query matches nothing.
    pub fn search(&self, query: &str) -> Vec<Message> {
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.messages
            .iter()
            .filter(|m| m.body.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::protocol::ConnId;

    fn push(store: &mut MessageStore, body: &str, room: Option<&str>, at: OffsetDateTime) -> MessageId {
        let id = store.allocate_id();
        store.append(Message {
            id,
            sender: "Alice".into(),
            sender_id: ConnId::new(),
            body: body.into(),
            image: None,
            timestamp: at,
            room: room.map(str::to_owned),
            reactions: Default::default(),
            read_by: Default::default(),
            delivered_by: Default::default(),
            correlation_token: None,
        });
        id
    }

    fn bodies(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.body.as_str()).collect()
    }

    #[test]
    fn eviction_is_global_fifo() {
        let mut store = MessageStore::new(3);
        let now = OffsetDateTime::now_utc();
        push(&mut store, "m1", None, now);
        push(&mut store, "m2", Some("team"), now);
        push(&mut store, "m3", None, now);
        push(&mut store, "m4", Some("ops"), now);

        assert_eq!(store.len(), 3);
        assert_eq!(bodies(&store.list_before(None, 10)), vec!["m2", "m3", "m4"]);
        assert!(store.get(MessageId(1)).is_none());
        assert_eq!(store.get(MessageId(4)).map(|m| m.body.as_str()), Some("m4"));
    }

    #[test]
    fn retains_exactly_the_most_recent_capacity() {
        let mut store = MessageStore::new(5);
        let now = OffsetDateTime::now_utc();
        for n in 0..23 {
            let room = (n % 3 == 0).then_some("team");
            push(&mut store, &format!("m{n}"), room, now);
        }
        let kept: Vec<u64> = store.iter().map(|m| m.id.0).collect();
        assert_eq!(kept, vec![19, 20, 21, 22, 23]);
    }

    #[test]
    fn list_before_is_strict_and_ascending() {
        let mut store = MessageStore::new(10);
        let t0 = OffsetDateTime::now_utc();
        push(&mut store, "a", None, t0);
        push(&mut store, "b", None, t0 + Duration::seconds(1));
        push(&mut store, "c", None, t0 + Duration::seconds(2));
        push(&mut store, "d", None, t0 + Duration::seconds(3));

        let page = store.list_before(Some(t0 + Duration::seconds(3)), 2);
        assert_eq!(bodies(&page), vec!["b", "c"]);
        assert!(store.list_before(Some(t0), 10).is_empty());
    }

    #[test]
    fn search_ignores_case() {
        let mut store = MessageStore::new(10);
        let now = OffsetDateTime::now_utc();
        push(&mut store, "Hello there", None, now);
        push(&mut store, "general KENOBI", Some("team"), now);
        push(&mut store, "bye", None, now);

        assert_eq!(bodies(&store.search("kenobi")), vec!["general KENOBI"]);
        assert_eq!(bodies(&store.search("E")), vec!["Hello there", "general KENOBI", "bye"]);
        assert!(store.search("").is_empty());
    }
}
