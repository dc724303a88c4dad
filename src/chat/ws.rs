use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::{HubHandle, protocol::ClientEvent};

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(State(hub): State<HubHandle>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |stream| relay(hub, stream))
}

/// Pumps one socket: hub events out, client events in. The session is
/// dropped when either direction ends, which disconnects it from the hub.
async fn relay(hub: HubHandle, stream: WebSocket) {
    let (session, mut rx) = match hub.connect() {
        Ok(connected) => connected,
        Err(err) => {
            warn!(%err, "refusing socket");
            return;
        }
    };
    let conn = session.id();
    let (mut sender, mut receiver) = stream.split();

    let mut outbound_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(%conn, %err, "could not encode event");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut inbound_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let frame = match msg {
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                data => data.into_data(),
            };
            let sent = match serde_json::from_slice::<ClientEvent>(&frame) {
                Ok(event) => session.dispatch(event),
                Err(err) => {
                    warn!(%conn, %err, "malformed event");
                    session.reject(format!("malformed event: {err}"), None)
                }
            };
            if sent.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut outbound_task => inbound_task.abort(),
        _ = &mut inbound_task => outbound_task.abort(),
    };
    info!(%conn, "socket closed");
}
