//! Pending-request table: in-flight requests keyed by (connection, request id).
//!
//! Every completion path (response, error, timeout, cancel, connection loss)
//! goes through `complete`, which removes the entry before signalling the
//! waiter. `DashMap::remove` is atomic per key, so whichever path removes the
//! entry first is the only one that completes it; later attempts find nothing
//! and are no-ops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ocpp_core::protocol::{NetworkingNodeId, Payload, Request, RequestError, RequestId, Response, ResultCode};

use super::state::{Completion, SendRequestState};
use crate::transport::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub connection: ConnectionId,
    pub request_id: RequestId,
}

impl PendingKey {
    pub fn new(connection: ConnectionId, request_id: RequestId) -> Self {
        Self {
            connection,
            request_id,
        }
    }
}

/// One in-flight request. Owned by the table until it completes.
#[derive(Debug)]
pub struct PendingRequest {
    pub action: String,
    pub destination: Option<NetworkingNodeId>,
    pub sent_at: Instant,
    pub deadline: Instant,
    pub payload: Payload,
    waiter: oneshot::Sender<SendRequestState>,
}

/// Receiving half handed to the dispatcher on successful registration.
pub type Waiter = oneshot::Receiver<SendRequestState>;

pub struct PendingRequestTable {
    entries: DashMap<PendingKey, PendingRequest>,
    /// Slots taken, counted ahead of the insert so concurrent registrations
    /// cannot overshoot `max_pending`.
    occupied: AtomicUsize,
    max_pending: usize,
}

impl PendingRequestTable {
    pub fn new(max_pending: usize) -> Self {
        Self {
            entries: DashMap::new(),
            occupied: AtomicUsize::new(0),
            max_pending: max_pending.max(1),
        }
    }

    /// Register a request about to be transmitted on `connection`.
    ///
    /// Refuses duplicates of an in-flight id on the same connection and
    /// inserts beyond capacity.
    pub fn register(
        &self,
        connection: ConnectionId,
        request: &Request,
        timeout: Duration,
    ) -> Result<Waiter, Completion> {
        if !self.reserve_slot() {
            tracing::warn!(%connection, request_id = %request.id, max = self.max_pending, "pending table full; refusing request");
            return Err(Completion::NotSent {
                code: ResultCode::NetworkError,
                reason: "too many pending requests".into(),
            });
        }

        let key = PendingKey::new(connection, request.id.clone());
        match self.entries.entry(key) {
            Entry::Occupied(_) => {
                self.release_slot();
                tracing::warn!(%connection, request_id = %request.id, "duplicate in-flight request id");
                Err(Completion::NotSent {
                    code: ResultCode::ProtocolError,
                    reason: format!("request id {} already in flight", request.id),
                })
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                let now = Instant::now();
                slot.insert(PendingRequest {
                    action: request.action.clone(),
                    destination: request.destination().cloned(),
                    sent_at: now,
                    deadline: now + timeout,
                    payload: request.payload.clone(),
                    waiter: tx,
                });
                tracing::trace!(%connection, request_id = %request.id, action = %request.action, "registered pending request");
                Ok(rx)
            }
        }
    }

    /// Complete an entry exactly once. Returns false if nothing was pending.
    pub fn complete(&self, connection: ConnectionId, request_id: &RequestId, completion: Completion) -> bool {
        let key = PendingKey::new(connection, request_id.clone());
        let Some((key, entry)) = self.entries.remove(&key) else {
            return false;
        };
        self.release_slot();

        let state = SendRequestState {
            request_id: key.request_id,
            action: entry.action,
            connection: key.connection,
            destination: entry.destination,
            sent_at: Some(entry.sent_at),
            completed_at: Instant::now(),
            completion,
        };
        if entry.waiter.send(state).is_err() {
            tracing::debug!(%connection, %request_id, "waiter gone before completion");
        }
        true
    }

    /// Route a CALLRESULT received on `connection`.
    pub fn handle_response(&self, connection: ConnectionId, response: Response) -> bool {
        let id = response.id.clone();
        let matched = self.complete(connection, &id, Completion::Response(response));
        if !matched {
            tracing::warn!(%connection, request_id = %id, "CALLRESULT for unknown request id; dropped");
        }
        matched
    }

    /// Route a CALLERROR received on `connection`.
    pub fn handle_error(&self, connection: ConnectionId, error: RequestError) -> bool {
        let id = error.id.clone();
        let code = error.code.clone();
        let matched = self.complete(connection, &id, Completion::Error(error));
        if !matched {
            tracing::warn!(%connection, request_id = %id, %code, "CALLERROR for unknown request id; dropped");
        }
        matched
    }

    /// Action of a pending request; binary CALLRESULTs need this to be read.
    pub fn action_of(&self, connection: ConnectionId, request_id: &RequestId) -> Option<String> {
        self.entries
            .get(&PendingKey::new(connection, request_id.clone()))
            .map(|e| e.action.clone())
    }

    pub fn contains(&self, connection: ConnectionId, request_id: &RequestId) -> bool {
        self.entries
            .contains_key(&PendingKey::new(connection, request_id.clone()))
    }

    pub fn expire(&self, connection: ConnectionId, request_id: &RequestId) -> bool {
        self.complete(connection, request_id, Completion::Timeout)
    }

    pub fn cancel(&self, connection: ConnectionId, request_id: &RequestId) -> bool {
        self.complete(connection, request_id, Completion::Cancelled)
    }

    /// Drop an entry without completing it (its waiter is already gone).
    pub fn discard(&self, connection: ConnectionId, request_id: &RequestId) -> bool {
        let removed = self
            .entries
            .remove(&PendingKey::new(connection, request_id.clone()))
            .is_some();
        if removed {
            self.release_slot();
        }
        removed
    }

    fn reserve_slot(&self) -> bool {
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max_pending).then_some(n + 1))
            .is_ok()
    }

    fn release_slot(&self) {
        self.occupied.fetch_sub(1, Ordering::AcqRel);
    }

    /// Fail every request in flight on a closed connection.
    pub fn connection_lost(&self, connection: ConnectionId) -> usize {
        let keys: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|e| e.key().connection == connection)
            .map(|e| e.key().request_id.clone())
            .collect();

        let failed = keys
            .iter()
            .filter(|id| self.complete(connection, id, Completion::ConnectionLost))
            .count();
        if failed > 0 {
            tracing::info!(%connection, failed, "connection closed with requests in flight");
        }
        failed
    }

    /// Time out every entry whose deadline has passed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let expired: Vec<PendingKey> = self
            .entries
            .iter()
            .filter(|e| e.value().deadline <= now)
            .map(|e| e.key().clone())
            .collect();

        expired
            .iter()
            .filter(|k| self.complete(k.connection, &k.request_id, Completion::Timeout))
            .count()
    }

    /// Background deadline enforcement, independent of inbound traffic.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let table = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        let n = table.sweep_expired(Instant::now());
                        if n > 0 {
                            tracing::debug!(expired = n, "pending sweep");
                        }
                    }
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
