use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use ocpp_core::protocol::NetworkingNodeId;

use super::connection::{ConnectionId, WsConnection};

/// Live connections by networking node id.
///
/// One connection per node: a reconnecting node replaces its old entry.
pub struct ConnectionRegistry {
    by_node: DashMap<NetworkingNodeId, Arc<WsConnection>>,
    seq: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self {
            by_node: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.seq.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the connection this one replaced, if any.
    pub fn insert(&self, conn: Arc<WsConnection>) -> Option<Arc<WsConnection>> {
        let node = conn.peer_id().clone();
        let replaced = self.by_node.insert(node.clone(), conn);
        if let Some(old) = &replaced {
            tracing::info!(%node, old = %old.connection_id(), "node reconnected; replacing connection");
        }
        replaced
    }

    /// Remove `node` only if it is still bound to `connection`.
    ///
    /// A session that was replaced must not evict its successor.
    pub fn remove(&self, node: &NetworkingNodeId, connection: ConnectionId) -> bool {
        self.by_node
            .remove_if(node, |_, c| c.connection_id() == connection)
            .is_some()
    }

    pub fn get(&self, node: &NetworkingNodeId) -> Option<Arc<WsConnection>> {
        self.by_node.get(node).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, node: &NetworkingNodeId) -> bool {
        self.by_node.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}
