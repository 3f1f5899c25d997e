//! Outcome of a dispatched request.

use std::time::Duration;

use tokio::time::Instant;

use ocpp_core::protocol::{NetworkingNodeId, RequestError, RequestId, Response, ResultCode};

use crate::transport::ConnectionId;

/// How a pending request left the table.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Matching CALLRESULT.
    Response(Response),
    /// Matching CALLERROR (also used for local signing failures).
    Error(RequestError),
    Timeout,
    ConnectionLost,
    Cancelled,
    /// Never reached the wire.
    NotSent { code: ResultCode, reason: String },
}

impl Completion {
    pub fn result_code(&self) -> ResultCode {
        match self {
            Completion::Response(_) => ResultCode::Ok,
            Completion::Error(e) => e.code.clone(),
            Completion::Timeout => ResultCode::Timeout,
            Completion::ConnectionLost => ResultCode::NetworkError,
            Completion::Cancelled => ResultCode::GenericError,
            Completion::NotSent { code, .. } => code.clone(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Completion::Response(_) => "response",
            Completion::Error(_) => "error",
            Completion::Timeout => "timeout",
            Completion::ConnectionLost => "connection_lost",
            Completion::Cancelled => "cancelled",
            Completion::NotSent { .. } => "not_sent",
        }
    }
}

/// Result handed back to the caller of `OutboundDispatcher::send`.
#[derive(Debug, Clone)]
pub struct SendRequestState {
    pub request_id: RequestId,
    pub action: String,
    pub connection: ConnectionId,
    pub destination: Option<NetworkingNodeId>,
    /// `None` when the request never reached the wire.
    pub sent_at: Option<Instant>,
    pub completed_at: Instant,
    pub completion: Completion,
}

impl SendRequestState {
    pub fn result_code(&self) -> ResultCode {
        self.completion.result_code()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.completion, Completion::Response(_))
    }

    pub fn response(&self) -> Option<&Response> {
        match &self.completion {
            Completion::Response(r) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RequestError> {
        match &self.completion {
            Completion::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn round_trip(&self) -> Option<Duration> {
        self.sent_at.map(|s| self.completed_at.saturating_duration_since(s))
    }
}
