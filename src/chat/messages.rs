use axum::{
    Json, debug_handler,
    extract::{Query, State},
};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{AppResult, Config, HubHandle, protocol::Message};

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<usize>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    before: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// `GET /messages?limit=N&before=<rfc3339>`, oldest first.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn history(
    State(hub): State<HubHandle>,
    State(config): State<Config>,
    Query(HistoryQuery { limit, before }): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Message>>> {
    let limit = limit.unwrap_or(config.history_limit);
    Ok(Json(hub.history(before, limit).await?))
}

/// `GET /messages/search?q=<substring>`, case-insensitive.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn search(
    State(hub): State<HubHandle>,
    Query(SearchQuery { q }): Query<SearchQuery>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(hub.search(q).await?))
}
