//! Process-lifetime tables owned by the hub.

mod presence;
mod rooms;
mod store;
mod typing;

pub use presence::PresenceRegistry;
pub use rooms::RoomTable;
pub use store::{DEFAULT_CAPACITY, MessageStore};
pub use typing::TypingTracker;
