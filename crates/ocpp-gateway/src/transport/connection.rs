//! Connection abstraction used by the dispatcher and the relay.

use std::fmt;

use async_trait::async_trait;
use axum::extract::ws::Message;
use bytes::Bytes;
use tokio::sync::mpsc;

use ocpp_core::error::{OcppError, Result};
use ocpp_core::protocol::{binary, json, Envelope, NetworkingNodeId};

/// Physical connection handle, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound side of one peer connection.
#[async_trait]
pub trait OcppConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Networking node on the other end.
    fn peer(&self) -> &NetworkingNodeId;

    async fn send_text(&self, text: String) -> Result<()>;

    async fn send_binary(&self, bytes: Bytes) -> Result<()>;
}

/// Encode an envelope in the form its payload calls for and transmit it.
///
/// CALLERRORs are always text.
pub async fn send_envelope(conn: &dyn OcppConnection, env: &Envelope) -> Result<()> {
    let binary_payload = match env {
        Envelope::Request(r) => r.payload.is_binary(),
        Envelope::Response(r) => r.payload.is_binary(),
        Envelope::RequestError(_) => false,
    };
    if binary_payload {
        conn.send_binary(binary::encode(env)?).await
    } else {
        conn.send_text(json::encode(env)?).await
    }
}

/// WebSocket connection: frames go to the session's writer task.
#[derive(Clone)]
pub struct WsConnection {
    id: ConnectionId,
    peer: NetworkingNodeId,
    tx: mpsc::Sender<Message>,
}

impl WsConnection {
    pub fn new(id: ConnectionId, peer: NetworkingNodeId, tx: mpsc::Sender<Message>) -> Self {
        Self { id, peer, tx }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_id(&self) -> &NetworkingNodeId {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl OcppConnection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> &NetworkingNodeId {
        &self.peer
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.tx
            .send(Message::Text(text))
            .await
            .map_err(|_| OcppError::Transport(format!("{} closed", self.id)))
    }

    async fn send_binary(&self, bytes: Bytes) -> Result<()> {
        self.tx
            .send(Message::Binary(bytes.to_vec()))
            .await
            .map_err(|_| OcppError::Transport(format!("{} closed", self.id)))
    }
}
