//! Protocol-level result codes.
//!
//! The wire vocabulary is effectively fixed, so well-known codes are plain
//! enum arms. Anything else is kept as `Other` so a peer's unexpected code
//! still round-trips. Unknown spellings are interned once per lowercase form:
//! `"fooError"` and `"FOOERROR"` resolve to the same value.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{OcppError, Result};

/// Longest error code accepted from the wire.
pub const MAX_RESULT_CODE_LEN: usize = 64;

/// Closed set of protocol outcomes plus a preserved fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    FormatViolation,
    PropertyConstraintViolation,
    OccurenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
    MessageTypeNotSupported,
    RpcFrameworkError,
    // transport-local
    UnknownClient,
    NetworkError,
    Timeout,
    // node-local
    Filtered,
    SignatureError,
    /// Unrecognized wire value, interned case-insensitively.
    Other(Arc<str>),
}

const KNOWN: [ResultCode; 19] = [
    ResultCode::Ok,
    ResultCode::NotImplemented,
    ResultCode::NotSupported,
    ResultCode::InternalError,
    ResultCode::ProtocolError,
    ResultCode::SecurityError,
    ResultCode::FormationViolation,
    ResultCode::FormatViolation,
    ResultCode::PropertyConstraintViolation,
    ResultCode::OccurenceConstraintViolation,
    ResultCode::TypeConstraintViolation,
    ResultCode::GenericError,
    ResultCode::MessageTypeNotSupported,
    ResultCode::RpcFrameworkError,
    ResultCode::UnknownClient,
    ResultCode::NetworkError,
    ResultCode::Timeout,
    ResultCode::Filtered,
    ResultCode::SignatureError,
];

fn interned() -> &'static DashMap<String, Arc<str>> {
    static TABLE: OnceLock<DashMap<String, Arc<str>>> = OnceLock::new();
    TABLE.get_or_init(DashMap::new)
}

impl ResultCode {
    /// Parse a wire value (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(OcppError::decode("error code must not be empty"));
        }
        if s.len() > MAX_RESULT_CODE_LEN {
            return Err(OcppError::decode(format!(
                "error code exceeds {MAX_RESULT_CODE_LEN} characters"
            )));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(OcppError::decode(format!("invalid error code: {s}")));
        }

        if let Some(known) = KNOWN.iter().find(|k| k.as_str().eq_ignore_ascii_case(s)) {
            return Ok(known.clone());
        }

        let canonical = interned()
            .entry(s.to_ascii_lowercase())
            .or_insert_with(|| {
                tracing::debug!(code = s, "interning unrecognized result code");
                Arc::from(s)
            })
            .value()
            .clone();
        Ok(ResultCode::Other(canonical))
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::NotImplemented => "NotImplemented",
            ResultCode::NotSupported => "NotSupported",
            ResultCode::InternalError => "InternalError",
            ResultCode::ProtocolError => "ProtocolError",
            ResultCode::SecurityError => "SecurityError",
            ResultCode::FormationViolation => "FormationViolation",
            ResultCode::FormatViolation => "FormatViolation",
            ResultCode::PropertyConstraintViolation => "PropertyConstraintViolation",
            ResultCode::OccurenceConstraintViolation => "OccurenceConstraintViolation",
            ResultCode::TypeConstraintViolation => "TypeConstraintViolation",
            ResultCode::GenericError => "GenericError",
            ResultCode::MessageTypeNotSupported => "MessageTypeNotSupported",
            ResultCode::RpcFrameworkError => "RpcFrameworkError",
            ResultCode::UnknownClient => "UnknownClient",
            ResultCode::NetworkError => "NetworkError",
            ResultCode::Timeout => "Timeout",
            ResultCode::Filtered => "Filtered",
            ResultCode::SignatureError => "SignatureError",
            ResultCode::Other(s) => s,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResultCode::Ok)
    }

    /// True for codes the node itself never receives from a peer.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ResultCode::UnknownClient
                | ResultCode::NetworkError
                | ResultCode::Timeout
                | ResultCode::Filtered
                | ResultCode::SignatureError
        )
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultCode {
    type Err = OcppError;

    fn from_str(s: &str) -> Result<Self> {
        ResultCode::parse(s)
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResultCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ResultCode::parse(&s).map_err(serde::de::Error::custom)
    }
}
