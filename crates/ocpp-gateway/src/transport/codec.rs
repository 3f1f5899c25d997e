//! Decode-once codec for the transport layer.
//!
//! - Text frames => JSON envelope
//! - Binary frames => binary envelope (panic-free `bytes::Buf` parsing)
//! - Undecodable frames => the CALLERROR to answer them with
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use bytes::Bytes;

use ocpp_core::error::OcppError;
use ocpp_core::protocol::{binary, json, Envelope, RequestError, RequestId, ResultCode};

#[derive(Debug)]
pub enum Inbound {
    Frame { env: Envelope, bytes_len: usize },
    Malformed { reply: RequestError, bytes_len: usize },
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Size of a frame before any parsing.
pub fn frame_len(msg: &Message) -> usize {
    match msg {
        Message::Text(s) => s.len(),
        Message::Binary(b) => b.len(),
        Message::Ping(v) | Message::Pong(v) => v.len(),
        Message::Close(_) => 0,
    }
}

pub fn decode(msg: Message) -> Inbound {
    match msg {
        Message::Text(s) => {
            let bytes_len = s.len();
            match json::decode(&s) {
                Ok(env) => Inbound::Frame { env, bytes_len },
                Err(e) => Inbound::Malformed {
                    reply: malformed_reply(json::salvage_request_id(&s), &e),
                    bytes_len,
                },
            }
        }
        Message::Binary(b) => {
            let bytes_len = b.len();
            match binary::decode(Bytes::from(b)) {
                Ok(env) => Inbound::Frame { env, bytes_len },
                Err(e) => Inbound::Malformed {
                    reply: malformed_reply(RequestId::unknown(), &e),
                    bytes_len,
                },
            }
        }
        Message::Ping(v) => Inbound::Ping(v),
        Message::Pong(v) => Inbound::Pong(v),
        Message::Close(_) => Inbound::Close,
    }
}

/// CALLERROR answering a frame that could not be decoded.
pub fn malformed_reply(id: RequestId, err: &OcppError) -> RequestError {
    match err.result_code() {
        ResultCode::FormationViolation => RequestError::formation_violation(id, "malformed OCPP frame", err),
        code => RequestError::new(id, code, err.to_string()),
    }
}
