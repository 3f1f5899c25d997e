use std::fmt;

use serde::Deserialize;

use ocpp_core::protocol::{Envelope, NetworkingNodeId, Request, RequestError, RequestId, Response, ResultCode};

use crate::dispatch::TransmitStatus;

/// Log message attached to rejections nobody explained.
pub const DEFAULT_REJECT_MESSAGE: &str = "Default handler";

/// FORWARD or REJECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingResult {
    Forward,
    Reject,
}

impl ForwardingResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ForwardingResult::Forward => "forward",
            ForwardingResult::Reject => "reject",
        }
    }
}

/// What goes back to the originator of a rejected request.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectResponse {
    /// Action-specific "Rejected" CALLRESULT, classified `Filtered`.
    Filtered { response: Response, description: String },
    /// CALLERROR (parse failure, filter failure, unknown action...).
    Error(RequestError),
}

impl RejectResponse {
    pub fn result_code(&self) -> ResultCode {
        match self {
            RejectResponse::Filtered { .. } => ResultCode::Filtered,
            RejectResponse::Error(e) => e.code.clone(),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            RejectResponse::Filtered { response, .. } => &response.id,
            RejectResponse::Error(e) => &e.id,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            RejectResponse::Filtered { description, .. } => description,
            RejectResponse::Error(e) => &e.description,
        }
    }

    /// Frame to send back to the peer.
    pub fn to_envelope(&self) -> Envelope {
        match self {
            RejectResponse::Filtered { response, .. } => Envelope::Response(response.clone()),
            RejectResponse::Error(e) => Envelope::RequestError(e.clone()),
        }
    }
}

/// Callback run once the forwarded request has been written (or refused).
pub type SentHook = Box<dyn FnOnce(&TransmitStatus) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
enum Verdict {
    Forward { rewritten: Option<Request> },
    Reject { response: RejectResponse },
}

/// Outcome of the forwarding pipeline for one inbound request.
///
/// A REJECT always carries a response; there is no way to build one without.
pub struct ForwardingDecision {
    request: Request,
    verdict: Verdict,
    log_message: Option<String>,
    sent_hook: Option<SentHook>,
}

impl ForwardingDecision {
    pub fn forward(request: Request, rewritten: Option<Request>) -> Self {
        Self {
            request,
            verdict: Verdict::Forward { rewritten },
            log_message: None,
            sent_hook: None,
        }
    }

    pub fn reject(request: Request, response: RejectResponse) -> Self {
        let log_message = Some(response.description().to_string());
        Self {
            request,
            verdict: Verdict::Reject { response },
            log_message,
            sent_hook: None,
        }
    }

    pub fn with_log_message(mut self, message: impl Into<String>) -> Self {
        self.log_message = Some(message.into());
        self
    }

    pub(crate) fn attach_sent_hook(&mut self, hook: SentHook) {
        if self.is_forward() {
            self.sent_hook = Some(hook);
        }
    }

    /// The request as received.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn result(&self) -> ForwardingResult {
        match self.verdict {
            Verdict::Forward { .. } => ForwardingResult::Forward,
            Verdict::Reject { .. } => ForwardingResult::Reject,
        }
    }

    pub fn is_forward(&self) -> bool {
        self.result() == ForwardingResult::Forward
    }

    pub fn is_reject(&self) -> bool {
        self.result() == ForwardingResult::Reject
    }

    pub fn reject_response(&self) -> Option<&RejectResponse> {
        match &self.verdict {
            Verdict::Reject { response } => Some(response),
            Verdict::Forward { .. } => None,
        }
    }

    /// Request as modified by a filter, if any filter modified it.
    pub fn rewritten(&self) -> Option<&Request> {
        match &self.verdict {
            Verdict::Forward { rewritten } => rewritten.as_ref(),
            Verdict::Reject { .. } => None,
        }
    }

    pub fn log_message(&self) -> Option<&str> {
        self.log_message.as_deref()
    }

    /// Request to relay: the rewritten one if present, else the original.
    pub fn outgoing(&self) -> &Request {
        self.rewritten().unwrap_or(&self.request)
    }

    /// `outgoing()` stamped for the next hop.
    ///
    /// Relayed (multi-hop) JSON requests get `via` appended to their network
    /// path. Direct requests and binary requests keep their form.
    pub fn next_hop_request(&self, via: &NetworkingNodeId) -> Request {
        let next = self.outgoing().clone();
        if next.payload.is_binary() {
            return next;
        }
        next.via(via.clone())
    }

    pub fn has_sent_hook(&self) -> bool {
        self.sent_hook.is_some()
    }

    pub fn take_sent_hook(&mut self) -> Option<SentHook> {
        self.sent_hook.take()
    }

    /// Run the sent hook, at most once.
    pub fn notify_sent(&mut self, status: &TransmitStatus) {
        if let Some(hook) = self.sent_hook.take() {
            hook(status);
        }
    }
}

impl fmt::Debug for ForwardingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingDecision")
            .field("request_id", &self.request.id)
            .field("action", &self.request.action)
            .field("verdict", &self.verdict)
            .field("log_message", &self.log_message)
            .field("sent_hook", &self.sent_hook.is_some())
            .finish()
    }
}
