//! Per-connection routing of decoded frames.
//!
//! Requests go through one ordered worker per connection, so decisions,
//! local answers and next-hop writes leave in arrival order. Responses and
//! errors complete pending entries directly.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use ocpp_core::protocol::{Envelope, Request};

use super::connection::{ConnectionId, OcppConnection};
use super::relay::Relay;
use crate::obs::NodeMetrics;
use crate::pending::PendingRequestTable;

const REQUEST_QUEUE: usize = 256;

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Request handed to the connection's worker.
    Queued,
    /// Response or error completed a pending request.
    Matched,
    /// Response or error for nothing in flight; dropped.
    Unmatched,
    /// Worker already stopped; request dropped.
    Closed,
}

pub struct InboundRouter {
    connection: ConnectionId,
    table: Arc<PendingRequestTable>,
    metrics: Arc<NodeMetrics>,
    requests: mpsc::Sender<Request>,
}

impl InboundRouter {
    /// Start the request worker for `conn`. The worker drains its queue and
    /// exits once the router is dropped.
    pub fn spawn(
        conn: Arc<dyn OcppConnection>,
        relay: Arc<Relay>,
        table: Arc<PendingRequestTable>,
        metrics: Arc<NodeMetrics>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Request>(REQUEST_QUEUE);
        let connection = conn.id();
        let worker = tokio::spawn(
            async move {
                while let Some(request) = rx.recv().await {
                    relay.handle_in_order(Arc::clone(&conn), request, cancel.clone()).await;
                }
            }
            .in_current_span(),
        );
        let router = Self {
            connection,
            table,
            metrics,
            requests: tx,
        };
        (router, worker)
    }

    pub async fn route(&self, env: Envelope) -> Routed {
        match env {
            Envelope::Request(request) => {
                if self.requests.send(request).await.is_err() {
                    tracing::debug!(connection = %self.connection, "request worker stopped; dropping request");
                    return Routed::Closed;
                }
                Routed::Queued
            }
            Envelope::Response(response) => {
                // a binary result only means something next to the request it answers
                if response.payload.is_binary() {
                    match self.table.action_of(self.connection, &response.id) {
                        Some(action) => tracing::trace!(request_id = %response.id, %action, "binary result"),
                        None => {
                            tracing::warn!(request_id = %response.id, "binary CALLRESULT for unknown request id; dropped");
                            return self.unmatched("result");
                        }
                    }
                }
                if self.table.handle_response(self.connection, response) {
                    Routed::Matched
                } else {
                    self.unmatched("result")
                }
            }
            Envelope::RequestError(error) => {
                if self.table.handle_error(self.connection, error) {
                    Routed::Matched
                } else {
                    self.unmatched("error")
                }
            }
        }
    }

    fn unmatched(&self, kind: &'static str) -> Routed {
        self.metrics.unmatched_responses.inc(&[("kind", kind)]);
        Routed::Unmatched
    }
}
