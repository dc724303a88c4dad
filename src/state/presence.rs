use std::collections::BTreeMap;

use crate::protocol::{ConnId, User};

/// Active connections and the display name each one announced.
/// Names are not unique.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    users: BTreeMap<ConnId, User>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or overwrites the record for `conn`.
    pub fn announce(&mut self, conn: ConnId, display_name: impl Into<String>) -> User {
        let user = User {
            identity: conn,
            display_name: display_name.into(),
        };
        self.users.insert(conn, user.clone());
        user
    }

    pub fn remove(&mut self, conn: ConnId) -> Option<User> {
        self.users.remove(&conn)
    }

    pub fn get(&self, conn: ConnId) -> Option<&User> {
        self.users.get(&conn)
    }

    pub fn display_name(&self, conn: ConnId) -> Option<&str> {
        self.users.get(&conn).map(|user| user.display_name.as_str())
    }

    /// Users ordered by connection age.
    pub fn list(&self) -> Vec<User> {
        self.users.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
