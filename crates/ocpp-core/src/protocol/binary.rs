//! Binary frame codec (panic-free).
//!
//! Layout (big-endian length prefixes):
//! - CALL:       `u8 2 | u16 len | id | u16 len | action | u64 len | payload`
//! - CALLRESULT: `u8 3 | u16 len | id | u64 len | payload`
//!
//! A CALLRESULT does not name its action. Callers must look the id up in the
//! pending-request table before interpreting the payload.
//!
//! Parsing rules:
//! - Never index (`buf[0]`); use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{OcppError, Result};

use super::envelope::{Envelope, MessageType, Payload, Request, Response};
use super::ids::RequestId;
use super::result_code::ResultCode;

fn get_short_str(buf: &mut Bytes, what: &str) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(OcppError::decode(format!("{what} length prefix missing")));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(OcppError::decode(format!(
            "{what} truncated: need {len} bytes, have {}",
            buf.remaining()
        )));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| OcppError::decode(format!("{what} is not utf-8")))
}

fn get_block(buf: &mut Bytes) -> Result<Bytes> {
    if buf.remaining() < 8 {
        return Err(OcppError::decode("payload length prefix missing"));
    }
    let len = buf.get_u64();
    let len = usize::try_from(len)
        .ok()
        .filter(|l| *l <= buf.remaining())
        .ok_or_else(|| {
            OcppError::decode(format!(
                "payload truncated: need {len} bytes, have {}",
                buf.remaining()
            ))
        })?;
    Ok(buf.copy_to_bytes(len))
}

fn put_short_str(out: &mut BytesMut, s: &str, what: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| OcppError::Encode(format!("{what} longer than {} bytes", u16::MAX)))?;
    out.put_u16(len);
    out.put_slice(s.as_bytes());
    Ok(())
}

fn put_block(out: &mut BytesMut, b: &Bytes) {
    out.put_u64(b.len() as u64);
    out.put_slice(b);
}

/// Decode a binary frame.
pub fn decode(mut buf: Bytes) -> Result<Envelope> {
    if buf.remaining() < 1 {
        return Err(OcppError::decode("binary frame too short"));
    }

    let tag = buf.get_u8();
    let envelope = match MessageType::from_tag(u64::from(tag)) {
        Some(MessageType::Request) => {
            let id = RequestId::parse(&get_short_str(&mut buf, "request id")?)?;
            let action = get_short_str(&mut buf, "action")?;
            if action.is_empty() {
                return Err(OcppError::decode("action must not be empty"));
            }
            let payload = get_block(&mut buf)?;
            Envelope::Request(Request::new(id, action, payload))
        }
        Some(MessageType::Response) => {
            let id = RequestId::parse(&get_short_str(&mut buf, "request id")?)?;
            let payload = get_block(&mut buf)?;
            Envelope::Response(Response::new(id, payload))
        }
        Some(MessageType::RequestError) | None => {
            return Err(OcppError::decode_with(
                ResultCode::MessageTypeNotSupported,
                format!("unsupported binary message type: {tag}"),
            ));
        }
    };

    if buf.has_remaining() {
        return Err(OcppError::decode(format!(
            "{} trailing bytes after binary frame",
            buf.remaining()
        )));
    }
    Ok(envelope)
}

fn binary_payload<'a>(payload: &'a Payload, what: &str) -> Result<&'a Bytes> {
    payload
        .as_binary()
        .ok_or_else(|| OcppError::Encode(format!("{what} carries a JSON payload")))
}

/// Encode to a binary frame.
pub fn encode(env: &Envelope) -> Result<Bytes> {
    let mut out = BytesMut::new();
    match env {
        Envelope::Request(r) => {
            if r.is_multi_hop() {
                return Err(OcppError::Encode(
                    "binary frames carry no networking header".into(),
                ));
            }
            let payload = binary_payload(&r.payload, "CALL")?;
            out.reserve(1 + 2 + r.id.as_str().len() + 2 + r.action.len() + 8 + payload.len());
            out.put_u8(MessageType::REQUEST_TAG);
            put_short_str(&mut out, r.id.as_str(), "request id")?;
            put_short_str(&mut out, &r.action, "action")?;
            put_block(&mut out, payload);
        }
        Envelope::Response(r) => {
            let payload = binary_payload(&r.payload, "CALLRESULT")?;
            out.reserve(1 + 2 + r.id.as_str().len() + 8 + payload.len());
            out.put_u8(MessageType::RESPONSE_TAG);
            put_short_str(&mut out, r.id.as_str(), "request id")?;
            put_block(&mut out, payload);
        }
        Envelope::RequestError(_) => {
            return Err(OcppError::Encode("CALLERROR has no binary form".into()));
        }
    }
    Ok(out.freeze())
}
