#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use ocpp_core::error::{OcppError, Result};
use ocpp_core::protocol::{json, Envelope, NetworkingNodeId, RequestId};
use ocpp_gateway::transport::{ConnectionId, OcppConnection};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Binary(Bytes),
}

impl Sent {
    pub fn text(&self) -> &str {
        match self {
            Sent::Text(t) => t,
            Sent::Binary(_) => panic!("expected a text frame"),
        }
    }

    pub fn envelope(&self) -> Envelope {
        json::decode(self.text()).unwrap()
    }
}

/// Connection that records every frame instead of writing it.
pub struct MockConnection {
    id: ConnectionId,
    peer: NetworkingNodeId,
    frames: mpsc::UnboundedSender<Sent>,
    fail: bool,
}

impl MockConnection {
    pub fn new(id: u64, peer: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        Self::build(id, peer, false)
    }

    /// Every send fails with a transport error.
    pub fn broken(id: u64, peer: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        Self::build(id, peer, true)
    }

    fn build(id: u64, peer: &str, fail: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            id: ConnectionId::new(id),
            peer: NetworkingNodeId::parse(peer).unwrap(),
            frames: tx,
            fail,
        });
        (conn, rx)
    }
}

#[async_trait]
impl OcppConnection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> &NetworkingNodeId {
        &self.peer
    }

    async fn send_text(&self, text: String) -> Result<()> {
        if self.fail {
            return Err(OcppError::Transport("socket reset".into()));
        }
        let _ = self.frames.send(Sent::Text(text));
        Ok(())
    }

    async fn send_binary(&self, bytes: Bytes) -> Result<()> {
        if self.fail {
            return Err(OcppError::Transport("socket reset".into()));
        }
        let _ = self.frames.send(Sent::Binary(bytes));
        Ok(())
    }
}

pub fn id(s: &str) -> RequestId {
    RequestId::parse(s).unwrap()
}

pub fn node(s: &str) -> NetworkingNodeId {
    NetworkingNodeId::parse(s).unwrap()
}
