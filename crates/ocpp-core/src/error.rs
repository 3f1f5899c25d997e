//! Shared error type across the OCPP crates.

use thiserror::Error;

use crate::protocol::result_code::ResultCode;

/// Shared result type.
pub type Result<T> = std::result::Result<T, OcppError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum OcppError {
    /// Malformed or untrusted inbound frame.
    #[error("decode failed: {message}")]
    Decode {
        code: ResultCode,
        message: String,
    },
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("signature error: {0}")]
    Signature(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl OcppError {
    /// Decode failure classified as `FormationViolation`.
    pub fn decode(message: impl Into<String>) -> Self {
        OcppError::Decode {
            code: ResultCode::FormationViolation,
            message: message.into(),
        }
    }

    /// Decode failure with an explicit classification.
    pub fn decode_with(code: ResultCode, message: impl Into<String>) -> Self {
        OcppError::Decode {
            code,
            message: message.into(),
        }
    }

    /// Map internal error to a stable protocol-level code.
    pub fn result_code(&self) -> ResultCode {
        match self {
            OcppError::Decode { code, .. } => code.clone(),
            OcppError::Encode(_) => ResultCode::InternalError,
            OcppError::UnknownAction(_) => ResultCode::NotImplemented,
            OcppError::Signature(_) => ResultCode::SignatureError,
            OcppError::Transport(_) => ResultCode::NetworkError,
            OcppError::Timeout => ResultCode::Timeout,
            OcppError::Cancelled => ResultCode::GenericError,
            OcppError::Config(_) => ResultCode::GenericError,
            OcppError::Internal(_) => ResultCode::InternalError,
        }
    }
}
