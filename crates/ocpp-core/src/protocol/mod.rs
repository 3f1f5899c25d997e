//! Protocol modules (envelope model + JSON and binary codecs).
//!
//! This module hosts the OCPP RPC framing:
//! - JSON arrays for text frames, including the networking (multi-hop) form.
//! - Length-prefixed binary frames for binary payloads.
//!
//! All parsers are panic-free: malformed input is reported as `OcppError`
//! instead of panicking or indexing raw buffers, so a misbehaving charging
//! station cannot take the node down.

pub mod binary;
pub mod envelope;
pub mod ids;
pub mod json;
pub mod request_error;
pub mod result_code;

pub use envelope::{Envelope, JsonObject, MessageType, Payload, Request, RequestError, Response};
pub use ids::{NetworkPath, NetworkingNodeId, RequestId};
pub use result_code::ResultCode;
