use axum::{Json, debug_handler, extract::State};

use crate::{AppResult, HubHandle, protocol::User};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn users(State(hub): State<HubHandle>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(hub.users().await?))
}
