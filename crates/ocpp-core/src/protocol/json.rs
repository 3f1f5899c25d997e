//! JSON array codec (text frames).
//!
//! Shapes:
//! - `[2, id, action, {payload}]`
//! - `[2, destination, [networkPath...], id, action, {payload}]`
//! - `[3, id, {payload}]`
//! - `[4, id, errorCode, errorDescription, {errorDetails}]`
//!
//! Parsing rules:
//! - The message-type tag is checked first.
//! - Arity and the JSON kind of every position are checked before any field
//!   is extracted, so a half-valid frame never yields a partial envelope.
//! - Every failure is an `OcppError::Decode`; nothing here panics.

use serde_json::{json, Value};

use crate::error::{OcppError, Result};

use super::envelope::{Envelope, JsonObject, MessageType, Payload, Request, RequestError, Response};
use super::ids::{NetworkPath, NetworkingNodeId, RequestId};
use super::result_code::ResultCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    StrArray,
    Object,
}

impl Kind {
    fn matches(self, v: &Value) -> bool {
        match self {
            Kind::Str => v.is_string(),
            Kind::StrArray => v
                .as_array()
                .map(|a| a.iter().all(Value::is_string))
                .unwrap_or(false),
            Kind::Object => v.is_object(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Str => "string",
            Kind::StrArray => "array of strings",
            Kind::Object => "object",
        }
    }
}

const CALL_DIRECT: [Kind; 3] = [Kind::Str, Kind::Str, Kind::Object];
const CALL_MULTI_HOP: [Kind; 5] = [Kind::Str, Kind::StrArray, Kind::Str, Kind::Str, Kind::Object];
const CALL_RESULT: [Kind; 2] = [Kind::Str, Kind::Object];
const CALL_ERROR: [Kind; 4] = [Kind::Str, Kind::Str, Kind::Str, Kind::Object];

/// Check positions `1..` against `shape`.
fn check_shape(what: &str, frame: &[Value], shape: &[Kind]) -> Result<()> {
    if frame.len() != shape.len() + 1 {
        return Err(OcppError::decode(format!(
            "{what} must have {} elements, got {}",
            shape.len() + 1,
            frame.len()
        )));
    }
    for (i, (v, kind)) in frame.iter().skip(1).zip(shape.iter()).enumerate() {
        if !kind.matches(v) {
            return Err(OcppError::decode(format!(
                "{what} element {} must be {}",
                i + 1,
                kind.name()
            )));
        }
    }
    Ok(())
}

fn str_at(frame: &[Value], i: usize) -> Result<&str> {
    frame
        .get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| OcppError::decode(format!("element {i} must be string")))
}

fn object_at(frame: &[Value], i: usize) -> Result<JsonObject> {
    frame
        .get(i)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| OcppError::decode(format!("element {i} must be object")))
}

fn parse_action(s: &str) -> Result<String> {
    if s.is_empty() {
        return Err(OcppError::decode("action must not be empty"));
    }
    Ok(s.to_string())
}

fn parse_path(frame: &[Value], i: usize) -> Result<NetworkPath> {
    let hops = frame
        .get(i)
        .and_then(Value::as_array)
        .ok_or_else(|| OcppError::decode(format!("element {i} must be array")))?;
    let mut out = Vec::with_capacity(hops.len());
    for hop in hops {
        let s = hop
            .as_str()
            .ok_or_else(|| OcppError::decode("network path entries must be strings"))?;
        out.push(NetworkingNodeId::parse(s)?);
    }
    Ok(NetworkPath::from_hops(out))
}

fn message_type(frame: &[Value]) -> Result<MessageType> {
    let tag = frame
        .first()
        .ok_or_else(|| OcppError::decode("empty frame"))?
        .as_u64()
        .ok_or_else(|| OcppError::decode("message type must be an unsigned integer"))?;
    MessageType::from_tag(tag).ok_or_else(|| {
        OcppError::decode_with(
            ResultCode::MessageTypeNotSupported,
            format!("unsupported message type: {tag}"),
        )
    })
}

/// Decode a text frame.
pub fn decode(text: &str) -> Result<Envelope> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| OcppError::decode(format!("invalid json: {e}")))?;
    decode_value(&value)
}

/// Decode an already-parsed JSON value.
pub fn decode_value(value: &Value) -> Result<Envelope> {
    let frame = value
        .as_array()
        .ok_or_else(|| OcppError::decode("frame must be a JSON array"))?;

    match message_type(frame)? {
        MessageType::Request => {
            if frame.len() == 6 {
                check_shape("CALL", frame, &CALL_MULTI_HOP)?;
                let destination = NetworkingNodeId::parse(str_at(frame, 1)?)?;
                let network_path = parse_path(frame, 2)?;
                let id = RequestId::parse(str_at(frame, 3)?)?;
                let action = parse_action(str_at(frame, 4)?)?;
                let payload = object_at(frame, 5)?;
                Ok(Envelope::Request(
                    Request::new(id, action, payload).with_routing(destination, network_path),
                ))
            } else {
                check_shape("CALL", frame, &CALL_DIRECT)?;
                let id = RequestId::parse(str_at(frame, 1)?)?;
                let action = parse_action(str_at(frame, 2)?)?;
                let payload = object_at(frame, 3)?;
                Ok(Envelope::Request(Request::new(id, action, payload)))
            }
        }
        MessageType::Response => {
            check_shape("CALLRESULT", frame, &CALL_RESULT)?;
            let id = RequestId::parse(str_at(frame, 1)?)?;
            let payload = object_at(frame, 2)?;
            Ok(Envelope::Response(Response::new(id, payload)))
        }
        MessageType::RequestError => {
            check_shape("CALLERROR", frame, &CALL_ERROR)?;
            let id = RequestId::parse(str_at(frame, 1)?)?;
            let code = ResultCode::parse(str_at(frame, 2)?)?;
            let description = str_at(frame, 3)?.to_string();
            let details = object_at(frame, 4)?;
            Ok(Envelope::RequestError(
                RequestError::new(id, code, description).with_details(details),
            ))
        }
    }
}

fn json_payload<'a>(payload: &'a Payload, what: &str) -> Result<&'a JsonObject> {
    payload
        .as_json()
        .ok_or_else(|| OcppError::Encode(format!("{what} carries a binary payload")))
}

/// Encode to the JSON array form.
pub fn encode_value(env: &Envelope) -> Result<Value> {
    match env {
        Envelope::Request(r) => {
            let payload = json_payload(&r.payload, "CALL")?;
            if let Some(destination) = r.destination() {
                let path: Vec<&str> = r.network_path().iter().map(|h| h.as_str()).collect();
                Ok(json!([
                    MessageType::REQUEST_TAG,
                    destination.as_str(),
                    path,
                    r.id.as_str(),
                    r.action,
                    payload
                ]))
            } else {
                Ok(json!([MessageType::REQUEST_TAG, r.id.as_str(), r.action, payload]))
            }
        }
        Envelope::Response(r) => {
            let payload = json_payload(&r.payload, "CALLRESULT")?;
            Ok(json!([MessageType::RESPONSE_TAG, r.id.as_str(), payload]))
        }
        Envelope::RequestError(e) => Ok(json!([
            MessageType::REQUEST_ERROR_TAG,
            e.id.as_str(),
            e.code.as_str(),
            e.description,
            e.details
        ])),
    }
}

/// Encode to a text frame.
pub fn encode(env: &Envelope) -> Result<String> {
    let value = encode_value(env)?;
    serde_json::to_string(&value).map_err(|e| OcppError::Encode(format!("json encode failed: {e}")))
}

/// Best-effort request id of a frame that failed to decode, for the error reply.
pub fn salvage_request_id(text: &str) -> RequestId {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return RequestId::unknown();
    };
    let Some(frame) = value.as_array() else {
        return RequestId::unknown();
    };
    let index = match (frame.first().and_then(Value::as_u64), frame.len()) {
        (Some(2), 6) => 3,
        _ => 1,
    };
    frame
        .get(index)
        .and_then(Value::as_str)
        .and_then(|s| RequestId::parse(s).ok())
        .unwrap_or_else(RequestId::unknown)
}
