use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::protocol::{ClientEvent, ConnId, CorrelationToken, Message, ServerEvent, User};

use super::Hub;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("the hub task has stopped")]
    Closed,
}

enum Command {
    Connect {
        conn: ConnId,
        outbound: super::Outbound,
    },
    Event {
        conn: ConnId,
        event: ClientEvent,
    },
    Reject {
        conn: ConnId,
        reason: String,
        correlation_token: Option<CorrelationToken>,
    },
    Disconnect {
        conn: ConnId,
    },
    History {
        before: Option<OffsetDateTime>,
        limit: usize,
        reply: oneshot::Sender<Vec<Message>>,
    },
    Search {
        query: String,
        reply: oneshot::Sender<Vec<Message>>,
    },
    Users {
        reply: oneshot::Sender<Vec<User>>,
    },
}

/// Cloneable front door to a hub running on its own task.
///
/// Commands from every connection land on one queue and are applied in
/// arrival order, so each event is atomic with respect to all others.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl HubHandle {
    /// Moves `hub` onto a new task. The task ends when the last handle and
    /// session are dropped.
    pub fn spawn(hub: Hub) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(hub, rx));
        Self { tx }
    }

    /// Registers a new connection. Events for it arrive on the returned receiver
    /// until the [`Session`] is dropped.
    pub fn connect(&self) -> Result<(Session, mpsc::UnboundedReceiver<ServerEvent>), HubError> {
        let conn = ConnId::new();
        let (outbound, inbound) = mpsc::unbounded_channel();
        self.tx
            .send(Command::Connect { conn, outbound })
            .map_err(|_| HubError::Closed)?;
        let session = Session {
            conn,
            tx: self.tx.clone(),
        };
        Ok((session, inbound))
    }

    pub async fn history(
        &self,
        before: Option<OffsetDateTime>,
        limit: usize,
    ) -> Result<Vec<Message>, HubError> {
        self.ask(|reply| Command::History { before, limit, reply }).await
    }

    pub async fn search(&self, query: impl Into<String>) -> Result<Vec<Message>, HubError> {
        let query = query.into();
        self.ask(|reply| Command::Search { query, reply }).await
    }

    pub async fn users(&self) -> Result<Vec<User>, HubError> {
        self.ask(|reply| Command::Users { reply }).await
    }

    async fn ask<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, HubError> {
        let (reply, answer) = oneshot::channel();
        self.tx.send(command(reply)).map_err(|_| HubError::Closed)?;
        answer.await.map_err(|_| HubError::Closed)
    }
}

/// One live connection. Dropping it disconnects the connection from the hub.
pub struct Session {
    conn: ConnId,
    tx: mpsc::UnboundedSender<Command>,
}

impl Session {
    pub fn id(&self) -> ConnId {
        self.conn
    }

    pub fn dispatch(&self, event: ClientEvent) -> Result<(), HubError> {
        self.tx
            .send(Command::Event { conn: self.conn, event })
            .map_err(|_| HubError::Closed)
    }

    /// Queues a rejection for this connection behind its earlier events.
    pub fn reject(
        &self,
        reason: impl Into<String>,
        correlation_token: Option<CorrelationToken>,
    ) -> Result<(), HubError> {
        self.tx
            .send(Command::Reject {
                conn: self.conn,
                reason: reason.into(),
                correlation_token,
            })
            .map_err(|_| HubError::Closed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Disconnect { conn: self.conn });
    }
}

async fn run(mut hub: Hub, mut rx: mpsc::UnboundedReceiver<Command>) {
    info!("hub started");
    while let Some(command) = rx.recv().await {
        match command {
            Command::Connect { conn, outbound } => hub.connect(conn, outbound),
            Command::Event { conn, event } => hub.handle(conn, event),
            Command::Reject { conn, reason, correlation_token } => {
                hub.reject(conn, reason, correlation_token)
            }
            Command::Disconnect { conn } => hub.disconnect(conn),
            Command::History { before, limit, reply } => {
                let _ = reply.send(hub.history(before, limit));
            }
            Command::Search { query, reply } => {
                let _ = reply.send(hub.search(&query));
            }
            Command::Users { reply } => {
                let _ = reply.send(hub.users());
            }
        }
    }
    debug!("hub stopped");
}
