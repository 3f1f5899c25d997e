use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ocpp_core::error::Result;
use ocpp_core::protocol::{binary, json, Envelope, Payload, Request, RequestError, RequestId, ResultCode};

use crate::obs::metrics::NodeMetrics;
use crate::pending::{Completion, PendingRequestTable, SendRequestState};
use crate::signing::SignaturePolicy;
use crate::transport::{ConnectionId, OcppConnection};

/// Transport-level result of putting a request on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitStatus {
    Success,
    Failed(String),
    /// Refused locally before any byte was written.
    NotAttempted(String),
}

impl TransmitStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TransmitStatus::Success => "success",
            TransmitStatus::Failed(_) => "failed",
            TransmitStatus::NotAttempted(_) => "not_attempted",
        }
    }
}

/// Monotonic request ids for node-originated requests.
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicU64,
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl RequestIdGenerator {
    pub fn next_id(&self) -> RequestId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        // a u64 renders in at most 20 characters
        RequestId::parse(&n.to_string()).unwrap_or_else(|_| RequestId::unknown())
    }
}

enum Frame {
    Text(String),
    Binary(Bytes),
}

fn encode_frame(request: &Request) -> Result<Frame> {
    let env = Envelope::Request(request.clone());
    if request.payload.is_binary() {
        Ok(Frame::Binary(binary::encode(&env)?))
    } else {
        Ok(Frame::Text(json::encode(&env)?))
    }
}

fn canonical_payload(payload: &Payload) -> Vec<u8> {
    match payload {
        Payload::Json(o) => serde_json::to_vec(o).unwrap_or_default(),
        Payload::Binary(b) => b.to_vec(),
    }
}

/// Removes the pending entry if the `send` future is dropped mid-flight.
struct PendingGuard<'a> {
    table: &'a PendingRequestTable,
    connection: ConnectionId,
    request_id: Option<RequestId>,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.request_id = None;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.request_id.take() {
            if self.table.discard(self.connection, &id) {
                tracing::debug!(connection = %self.connection, request_id = %id, "send dropped: removed pending entry");
            }
        }
    }
}

/// Sends requests and waits for their completion.
pub struct OutboundDispatcher {
    table: Arc<PendingRequestTable>,
    ids: RequestIdGenerator,
    signer: Option<Arc<dyn SignaturePolicy>>,
    metrics: Option<Arc<NodeMetrics>>,
    default_timeout: Duration,
}

impl OutboundDispatcher {
    pub fn new(table: Arc<PendingRequestTable>, default_timeout: Duration) -> Self {
        Self {
            table,
            ids: RequestIdGenerator::default(),
            signer: None,
            metrics: None,
            default_timeout,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn SignaturePolicy>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn table(&self) -> &Arc<PendingRequestTable> {
        &self.table
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn next_request_id(&self) -> RequestId {
        self.ids.next_id()
    }

    /// Originate a request from this node with a fresh id and the default timeout.
    pub async fn call(
        &self,
        conn: &dyn OcppConnection,
        action: &str,
        payload: Payload,
        cancel: &CancellationToken,
    ) -> SendRequestState {
        let request = Request::new(self.next_request_id(), action, payload);
        self.send(conn, request, self.default_timeout, cancel).await
    }

    pub async fn send(
        &self,
        conn: &dyn OcppConnection,
        request: Request,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> SendRequestState {
        self.send_observed(conn, request, timeout, cancel, |_| {}).await
    }

    /// Like `send`, calling `on_transmit` once the frame was written (or refused).
    pub async fn send_observed<F>(
        &self,
        conn: &dyn OcppConnection,
        mut request: Request,
        timeout: Duration,
        cancel: &CancellationToken,
        on_transmit: F,
    ) -> SendRequestState
    where
        F: FnOnce(&TransmitStatus) + Send,
    {
        let connection = conn.id();

        if cancel.is_cancelled() {
            on_transmit(&TransmitStatus::NotAttempted("cancelled".into()));
            return self.finish(local_state(connection, &request, Completion::Cancelled));
        }

        if let Some(signer) = &self.signer {
            let serialized = canonical_payload(&request.payload);
            if let Err(errors) = signer.sign_request(&mut request, &serialized) {
                tracing::warn!(%connection, request_id = %request.id, action = %request.action, ?errors, "signing failed; request not sent");
                on_transmit(&TransmitStatus::NotAttempted("signing failed".into()));
                let error = RequestError::signature_error(request.id.clone(), &errors);
                return self.finish(local_state(connection, &request, Completion::Error(error)));
            }
        }

        let frame = match encode_frame(&request) {
            Ok(f) => f,
            Err(e) => {
                on_transmit(&TransmitStatus::NotAttempted(e.to_string()));
                let completion = Completion::NotSent {
                    code: e.result_code(),
                    reason: e.to_string(),
                };
                return self.finish(local_state(connection, &request, completion));
            }
        };

        // register before writing so a fast reply cannot miss its entry
        let mut rx = match self.table.register(connection, &request, timeout) {
            Ok(rx) => rx,
            Err(completion) => {
                on_transmit(&TransmitStatus::NotAttempted("refused by pending table".into()));
                return self.finish(local_state(connection, &request, completion));
            }
        };
        let deadline = Instant::now() + timeout;
        let mut guard = PendingGuard {
            table: &self.table,
            connection,
            request_id: Some(request.id.clone()),
        };

        let written = match frame {
            Frame::Text(t) => conn.send_text(t).await,
            Frame::Binary(b) => conn.send_binary(b).await,
        };
        match written {
            Ok(()) => on_transmit(&TransmitStatus::Success),
            Err(e) => {
                tracing::warn!(%connection, request_id = %request.id, error = %e, "transmit failed");
                on_transmit(&TransmitStatus::Failed(e.to_string()));
                self.table.complete(
                    connection,
                    &request.id,
                    Completion::NotSent {
                        code: ResultCode::NetworkError,
                        reason: e.to_string(),
                    },
                );
            }
        }

        // whichever path removes the entry first delivers through `rx`
        let received = tokio::select! {
            biased;
            res = &mut rx => res,
            _ = tokio::time::sleep_until(deadline) => {
                self.table.expire(connection, &request.id);
                (&mut rx).await
            }
            _ = cancel.cancelled() => {
                self.table.cancel(connection, &request.id);
                (&mut rx).await
            }
        };
        guard.disarm();

        let state = received.unwrap_or_else(|_| {
            local_state(connection, &request, Completion::ConnectionLost)
        });
        self.finish(state)
    }

    fn finish(&self, state: SendRequestState) -> SendRequestState {
        tracing::debug!(
            connection = %state.connection,
            request_id = %state.request_id,
            action = %state.action,
            outcome = state.completion.label(),
            "request completed"
        );
        if let Some(m) = &self.metrics {
            m.pending_completions
                .inc(&[("action", state.action.as_str()), ("outcome", state.completion.label())]);
            if let Some(rtt) = state.round_trip() {
                m.round_trip.observe(&[("action", state.action.as_str())], rtt);
            }
        }
        state
    }
}

fn local_state(connection: ConnectionId, request: &Request, completion: Completion) -> SendRequestState {
    SendRequestState {
        request_id: request.id.clone(),
        action: request.action.clone(),
        connection,
        destination: request.destination().cloned(),
        sent_at: None,
        completed_at: Instant::now(),
        completion,
    }
}
