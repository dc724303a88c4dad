mod messages;
mod users;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
        .route("/messages", get(messages::history))
        .route("/messages/search", get(messages::search))
        .route("/users", get(users::users))
        .route("/health", get(health))
}

async fn health() -> &'static str {
    "OK"
}
