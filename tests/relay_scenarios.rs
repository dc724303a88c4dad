use std::time::Duration;

use relaychat::{
    Hub, HubHandle,
    client::{ChatClient, Entry},
    hub::Session,
    protocol::{ClientEvent, ConnId, Message, SendPayload, ServerEvent},
};
use tokio::{sync::mpsc, time::timeout};

struct Conn {
    session: Session,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Conn {
    async fn open(hub: &HubHandle, name: &str) -> Self {
        let (session, rx) = hub.connect().unwrap();
        let mut conn = Conn { session, rx };
        assert!(matches!(conn.next().await, ServerEvent::Welcome { .. }));
        conn.session.dispatch(ClientEvent::Announce(name.into())).unwrap();
        conn
    }

    fn id(&self) -> ConnId {
        self.session.id()
    }

    fn send(&self, event: ClientEvent) {
        self.session.dispatch(event).unwrap();
    }

    async fn next(&mut self) -> ServerEvent {
        timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("hub dropped the connection")
    }

    /// Everything already queued. Call after [`settle`].
    fn queued(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn queued_messages(&mut self) -> Vec<Message> {
        self.queued()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::Message(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

/// Round-trips a query so every earlier command has been applied.
async fn settle(hub: &HubHandle) {
    hub.users().await.unwrap();
}

fn say(body: &str, room: Option<&str>) -> ClientEvent {
    ClientEvent::Send(SendPayload {
        room: room.map(str::to_owned),
        body: body.into(),
        correlation_token: None,
    })
}

#[tokio::test]
async fn global_and_room_audiences() {
    let hub = HubHandle::spawn(Hub::default());
    let mut alice = Conn::open(&hub, "Alice").await;
    let mut bob = Conn::open(&hub, "Bob").await;

    alice.send(ClientEvent::JoinRoom("team".into()));
    bob.send(say("hi", None));
    settle(&hub).await;

    assert_eq!(alice.queued_messages().iter().map(|m| m.body.as_str()).collect::<Vec<_>>(), vec!["hi"]);
    assert_eq!(bob.queued_messages().iter().map(|m| m.body.as_str()).collect::<Vec<_>>(), vec!["hi"]);

    alice.send(say("secret", Some("team")));
    settle(&hub).await;

    let alice_got = alice.queued_messages();
    assert_eq!(alice_got.len(), 1);
    assert_eq!(alice_got[0].room.as_deref(), Some("team"));
    assert!(bob.queued_messages().is_empty());
}

#[tokio::test]
async fn history_keeps_only_the_newest() {
    let hub = HubHandle::spawn(Hub::with_capacity(3));
    let alice = Conn::open(&hub, "Alice").await;

    alice.send(say("m1", None));
    alice.send(say("m2", Some("team")));
    alice.send(say("m3", None));
    alice.send(say("m4", Some("ops")));

    let history = hub.history(None, 100).await.unwrap();
    let bodies: Vec<_> = history.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["m2", "m3", "m4"]);
}

#[tokio::test]
async fn disconnect_is_announced_to_the_rest() {
    let hub = HubHandle::spawn(Hub::default());
    let mut alice = Conn::open(&hub, "Alice").await;
    let bob = Conn::open(&hub, "Bob").await;
    let bob_id = bob.id();
    settle(&hub).await;
    alice.queued();

    drop(bob);
    settle(&hub).await;

    let events = alice.queued();
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::UserLeft(user) if user.identity == bob_id)));
    let users = hub.users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].display_name, "Alice");
}

#[tokio::test]
async fn rejected_frames_do_not_stop_the_hub() {
    let hub = HubHandle::spawn(Hub::default());
    let mut alice = Conn::open(&hub, "Alice").await;
    settle(&hub).await;
    alice.queued();

    alice.session.reject("malformed event: missing field `body`", None).unwrap();
    alice.send(say("still here", None));
    settle(&hub).await;

    let events = alice.queued();
    assert!(matches!(events[0], ServerEvent::Rejected { .. }));
    assert!(matches!(&events[1], ServerEvent::Message(m) if m.body == "still here"));
}

/// Forwards everything a client emitted into its session.
fn pump(client_rx: &mut mpsc::UnboundedReceiver<ClientEvent>, session: &Session) {
    while let Ok(event) = client_rx.try_recv() {
        session.dispatch(event).unwrap();
    }
}

fn feed(client: &mut ChatClient, rx: &mut mpsc::UnboundedReceiver<ServerEvent>) {
    while let Ok(event) = rx.try_recv() {
        client.apply(event).unwrap();
    }
}

#[tokio::test]
async fn optimistic_send_reconciles_against_the_hub() {
    let hub = HubHandle::spawn(Hub::default());
    let (session, mut server_rx) = hub.connect().unwrap();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel();
    let mut client = ChatClient::new(client_tx);

    settle(&hub).await;
    feed(&mut client, &mut server_rx);
    client.announce("Alice").unwrap();

    let token = client.send_text("hello").unwrap();
    assert!(client.timeline().entries().iter().any(Entry::is_pending));

    pump(&mut client_rx, &session);
    settle(&hub).await;
    feed(&mut client, &mut server_rx);

    let mine: Vec<_> = client
        .timeline()
        .entries()
        .iter()
        .filter(|entry| entry.token() == Some(&token))
        .collect();
    assert_eq!(mine.len(), 1);
    let Entry::Confirmed(message) = mine[0] else {
        panic!("expected a confirmed entry, got {:?}", mine[0]);
    };
    let stored = hub.history(None, 10).await.unwrap();
    assert_eq!(message.id, stored[0].id);
    assert_eq!(message.timestamp, stored[0].timestamp);
}

#[tokio::test(start_paused = true)]
async fn typing_indicator_clears_after_idle() {
    let hub = HubHandle::spawn(Hub::default());
    let (session, mut server_rx) = hub.connect().unwrap();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel();
    let mut client = ChatClient::with_typing_idle(client_tx, Duration::from_millis(500));
    let mut bob = Conn::open(&hub, "Bob").await;

    client.announce("Alice").unwrap();
    client.keystroke(tokio::time::Instant::now()).unwrap();
    pump(&mut client_rx, &session);
    settle(&hub).await;
    feed(&mut client, &mut server_rx);

    assert!(bob
        .queued()
        .contains(&ServerEvent::TypingUsers(vec!["Alice".into()])));

    client.typing_timer().await;
    client.poll_typing(tokio::time::Instant::now()).unwrap();
    pump(&mut client_rx, &session);
    settle(&hub).await;

    assert_eq!(bob.queued(), vec![ServerEvent::TypingUsers(vec![])]);
}

/// Runs one unannounced send through a real hub and applies the echo and
/// the ack in the chosen order.
fn settled_send(ack_first: bool) -> Entry {
    let mut hub = Hub::default();
    let conn = ConnId::new();
    let (server_tx, mut server_rx) = mpsc::unbounded_channel();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel();
    let mut client = ChatClient::new(client_tx);

    hub.connect(conn, server_tx);
    feed(&mut client, &mut server_rx);
    client.join_room(" global ").unwrap();
    client.send_text("hi").unwrap();
    while let Ok(event) = client_rx.try_recv() {
        hub.handle(conn, event);
    }

    let mut events = Vec::new();
    while let Ok(event) = server_rx.try_recv() {
        events.push(event);
    }
    events.sort_by_key(|event| matches!(event, ServerEvent::Ack { .. }) != ack_first);
    for event in events {
        client.apply(event).unwrap();
    }

    let stored = hub.history(None, 10);
    let mut mine = client.timeline().entries().iter().filter(|entry| entry.token().is_some());
    let entry = mine.next().cloned().expect("no entry for the send");
    assert!(mine.next().is_none());
    assert_eq!(entry, Entry::Confirmed(stored[0].clone()));
    entry
}

#[test]
fn ack_and_echo_agree_in_either_order() {
    for ack_first in [true, false] {
        let Entry::Confirmed(message) = settled_send(ack_first) else {
            panic!("send was not confirmed");
        };
        assert_eq!(message.sender, "Anonymous");
        assert_eq!(message.room, None);
    }
}
