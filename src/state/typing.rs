use crate::protocol::ConnId;

use super::PresenceRegistry;

/// Connections currently typing, in the order they started.
#[derive(Debug, Default)]
pub struct TypingTracker {
    typing: Vec<ConnId>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the flag changed.
    pub fn set(&mut self, conn: ConnId, is_typing: bool) -> bool {
        let position = self.typing.iter().position(|&c| c == conn);
        match (is_typing, position) {
            (true, None) => {
                self.typing.push(conn);
                true
            }
            (false, Some(index)) => {
                self.typing.remove(index);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self, conn: ConnId) -> bool {
        self.set(conn, false)
    }

    pub fn is_typing(&self, conn: ConnId) -> bool {
        self.typing.contains(&conn)
    }

    /// Display names of typing connections that are still present.
    pub fn project(&self, presence: &PresenceRegistry) -> Vec<String> {
        self.typing
            .iter()
            .filter_map(|&conn| presence.display_name(conn))
            .map(str::to_owned)
            .collect()
    }
}
