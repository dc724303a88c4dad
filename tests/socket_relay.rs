use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use relaychat::{
    AppState, Config,
    protocol::{ClientEvent, CorrelationToken, SendPayload, ServerEvent},
};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as Frame};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve() -> (AppState, SocketAddr) {
    let state = AppState::new(Config::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, relaychat::app(state.clone())).into_future());
    (state, addr)
}

async fn open(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, event: &ClientEvent) {
    let text = serde_json::to_string(event).unwrap();
    socket.send(Frame::text(text)).await.unwrap();
}

async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let frame = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if frame.is_text() || frame.is_binary() {
            return serde_json::from_slice(&frame.into_data()).unwrap();
        }
    }
}

/// Reads frames until `pick` matches one.
async fn wait_for<T>(socket: &mut Socket, mut pick: impl FnMut(ServerEvent) -> Option<T>) -> T {
    loop {
        if let Some(found) = pick(next_event(socket).await) {
            return found;
        }
    }
}

#[tokio::test]
async fn socket_gets_welcome_and_rejections_then_keeps_working() {
    let (_state, addr) = serve().await;
    let mut socket = open(addr).await;

    let ServerEvent::Welcome { identity } = next_event(&mut socket).await else {
        panic!("first frame must be the welcome");
    };

    socket
        .send(Frame::text(r#"{"event":"shout","data":"hi"}"#.to_owned()))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut socket).await,
        ServerEvent::Rejected { reason, correlation_token: None } if reason.starts_with("malformed event")
    ));

    socket.send(Frame::binary(b"not json".to_vec())).await.unwrap();
    assert!(matches!(next_event(&mut socket).await, ServerEvent::Rejected { .. }));

    let token = CorrelationToken("t1".into());
    send(&mut socket, &ClientEvent::Announce("Alice".into())).await;
    send(
        &mut socket,
        &ClientEvent::Send(SendPayload {
            room: None,
            body: "hello".into(),
            correlation_token: Some(token.clone()),
        }),
    )
    .await;

    let echo = wait_for(&mut socket, |event| match event {
        ServerEvent::Message(message) => Some(message),
        _ => None,
    })
    .await;
    assert_eq!(echo.body, "hello");
    assert_eq!(echo.sender, "Alice");
    assert_eq!(echo.sender_id, identity);

    let acked = wait_for(&mut socket, |event| match event {
        ServerEvent::Ack { id, correlation_token, .. } => Some((id, correlation_token)),
        _ => None,
    })
    .await;
    assert_eq!(acked, (echo.id, Some(token)));
}

#[tokio::test]
async fn closing_the_socket_disconnects_the_user() {
    let (state, addr) = serve().await;
    let mut alice = open(addr).await;
    let mut bob = open(addr).await;
    next_event(&mut alice).await;
    next_event(&mut bob).await;

    send(&mut alice, &ClientEvent::Announce("Alice".into())).await;
    send(&mut bob, &ClientEvent::Announce("Bob".into())).await;
    wait_for(&mut alice, |event| match event {
        ServerEvent::UserJoined(user) if user.display_name == "Bob" => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(state.hub.users().await.unwrap().len(), 2);

    bob.close(None).await.unwrap();

    let left = wait_for(&mut alice, |event| match event {
        ServerEvent::UserLeft(user) => Some(user),
        _ => None,
    })
    .await;
    assert_eq!(left.display_name, "Bob");
    let users = state.hub.users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].display_name, "Alice");
}
