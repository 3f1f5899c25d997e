//! Message envelope: CALL / CALLRESULT / CALLERROR.
//!
//! These are the decoded shapes shared by the JSON and binary codecs. The
//! codecs live in `json` and `binary`; nothing here touches the wire.

use bytes::Bytes;
use serde_json::{Map, Value};

use super::ids::{NetworkPath, NetworkingNodeId, RequestId};
use super::result_code::ResultCode;

/// JSON object payload.
pub type JsonObject = Map<String, Value>;

/// Message-type discriminator (element 0 of the wire array, or the binary tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Response,
    RequestError,
}

impl MessageType {
    pub const REQUEST_TAG: u8 = 2;
    pub const RESPONSE_TAG: u8 = 3;
    pub const REQUEST_ERROR_TAG: u8 = 4;

    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            2 => Some(MessageType::Request),
            3 => Some(MessageType::Response),
            4 => Some(MessageType::RequestError),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            MessageType::Request => Self::REQUEST_TAG,
            MessageType::Response => Self::RESPONSE_TAG,
            MessageType::RequestError => Self::REQUEST_ERROR_TAG,
        }
    }
}

/// Request/response body: a JSON object for text frames, opaque bytes for binary frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(JsonObject),
    Binary(Bytes),
}

impl Payload {
    pub fn empty_json() -> Self {
        Payload::Json(JsonObject::new())
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Payload::Binary(_))
    }

    pub fn as_json(&self) -> Option<&JsonObject> {
        match self {
            Payload::Json(o) => Some(o),
            Payload::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Payload::Binary(b) => Some(b),
            Payload::Json(_) => None,
        }
    }

    /// Diagnostic rendering used when a payload has to be echoed into an error.
    pub fn to_diagnostic_value(&self) -> Value {
        match self {
            Payload::Json(o) => Value::Object(o.clone()),
            Payload::Binary(b) => Value::String(format!("<{} bytes>", b.len())),
        }
    }
}

impl From<JsonObject> for Payload {
    fn from(o: JsonObject) -> Self {
        Payload::Json(o)
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Binary(b)
    }
}

/// CALL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub action: String,
    pub payload: Payload,
    // Set together through `with_routing`: a path never exists without a destination.
    destination: Option<NetworkingNodeId>,
    network_path: NetworkPath,
}

impl Request {
    pub fn new(id: RequestId, action: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            id,
            action: action.into(),
            payload: payload.into(),
            destination: None,
            network_path: NetworkPath::empty(),
        }
    }

    pub fn with_routing(mut self, destination: NetworkingNodeId, network_path: NetworkPath) -> Self {
        self.destination = Some(destination);
        self.network_path = network_path;
        self
    }

    /// Final addressee when relayed through networking nodes.
    pub fn destination(&self) -> Option<&NetworkingNodeId> {
        self.destination.as_ref()
    }

    pub fn network_path(&self) -> &NetworkPath {
        &self.network_path
    }

    /// Append `hop` to the network path of a routed request. Direct requests
    /// are returned unchanged.
    pub fn via(mut self, hop: NetworkingNodeId) -> Self {
        if self.destination.is_some() {
            self.network_path = self.network_path.append(hop);
        }
        self
    }

    /// Whether this request uses the 6-element networking form.
    ///
    /// A destination selects the networking form even with an empty path, so
    /// `[2,"CS001",[],...]` re-encodes as received.
    pub fn is_multi_hop(&self) -> bool {
        self.destination.is_some()
    }
}

/// CALLRESULT.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub payload: Payload,
}

impl Response {
    pub fn new(id: RequestId, payload: impl Into<Payload>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// CALLERROR.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestError {
    pub id: RequestId,
    pub code: ResultCode,
    pub description: String,
    pub details: JsonObject,
}

impl RequestError {
    pub fn new(id: RequestId, code: ResultCode, description: impl Into<String>) -> Self {
        Self {
            id,
            code,
            description: description.into(),
            details: JsonObject::new(),
        }
    }

    pub fn with_details(mut self, details: JsonObject) -> Self {
        self.details = details;
        self
    }
}

/// Any decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(Request),
    Response(Response),
    RequestError(RequestError),
}

impl Envelope {
    pub fn request_id(&self) -> &RequestId {
        match self {
            Envelope::Request(r) => &r.id,
            Envelope::Response(r) => &r.id,
            Envelope::RequestError(e) => &e.id,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Envelope::Request(_) => MessageType::Request,
            Envelope::Response(_) => MessageType::Response,
            Envelope::RequestError(_) => MessageType::RequestError,
        }
    }
}

impl From<Request> for Envelope {
    fn from(r: Request) -> Self {
        Envelope::Request(r)
    }
}

impl From<Response> for Envelope {
    fn from(r: Response) -> Self {
        Envelope::Response(r)
    }
}

impl From<RequestError> for Envelope {
    fn from(e: RequestError) -> Self {
        Envelope::RequestError(e)
    }
}
