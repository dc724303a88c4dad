use std::collections::{BTreeSet, HashMap};

use crate::protocol::ConnId;

/// Room name to the connections subscribed to it. Rooms are created lazily
/// and kept for the life of the process, even once empty.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<String, BTreeSet<ConnId>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&mut self, room: &str) {
        if !self.rooms.contains_key(room) {
            self.rooms.insert(room.to_owned(), BTreeSet::new());
        }
    }

    /// Returns false if `conn` was already a member.
    pub fn join(&mut self, conn: ConnId, room: &str) -> bool {
        self.ensure(room);
        self.rooms
            .get_mut(room)
            .is_some_and(|members| members.insert(conn))
    }

    /// Returns false if `conn` was not a member.
    pub fn leave(&mut self, conn: ConnId, room: &str) -> bool {
        self.rooms
            .get_mut(room)
            .is_some_and(|members| members.remove(&conn))
    }

    /// Drops `conn` from every room, returning the rooms it was in.
    pub fn leave_all(&mut self, conn: ConnId) -> Vec<String> {
        let mut left: Vec<String> = self
            .rooms
            .iter_mut()
            .filter_map(|(room, members)| members.remove(&conn).then(|| room.clone()))
            .collect();
        left.sort();
        left
    }

    pub fn is_member(&self, conn: ConnId, room: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(&conn))
    }

    pub fn members(&self, room: &str) -> impl Iterator<Item = ConnId> + '_ {
        self.rooms.get(room).into_iter().flatten().copied()
    }

    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.keys().cloned().collect();
        names.sort();
        names
    }
}
