pub mod appresult;
pub mod chat;
pub mod client;
pub mod config;
pub mod hub;
pub mod protocol;
pub mod state;

use axum::{Router, extract::FromRef};
use tower_http::trace::TraceLayer;

pub use appresult::{AppError, AppResult};
pub use config::Config;
pub use hub::{Hub, HubHandle};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: HubHandle,
    pub config: Config,
}

impl AppState {
    /// Spawns a hub sized by `config`.
    pub fn new(config: Config) -> Self {
        Self {
            hub: HubHandle::spawn(Hub::with_capacity(config.message_capacity)),
            config,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(chat::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
