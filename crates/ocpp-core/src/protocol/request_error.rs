//! Canonical CALLERROR constructors.
//!
//! Pure builders: nothing is logged or sent from here.

use std::error::Error as StdError;

use serde_json::Value;

use super::envelope::{JsonObject, RequestError};
use super::ids::{NetworkingNodeId, RequestId};
use super::result_code::ResultCode;

/// Render an error and its `source()` chain, outermost first.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut cur = err.source();
    while let Some(e) = cur {
        lines.push(format!("caused by: {e}"));
        cur = e.source();
    }
    lines.join("\n")
}

fn details(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> JsonObject {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

impl RequestError {
    /// The request could not be parsed; echoes what was received.
    pub fn could_not_parse(id: RequestId, original: Value, explanation: impl Into<String>) -> Self {
        let explanation = explanation.into();
        RequestError::new(id, ResultCode::FormationViolation, explanation.clone()).with_details(
            details([
                ("payload", original),
                ("explanation", Value::String(explanation)),
            ]),
        )
    }

    /// Formation violation raised by a failing parser or filter.
    ///
    /// Only the error text is carried, never the payload fields.
    pub fn formation_violation(
        id: RequestId,
        context: impl Into<String>,
        err: &(dyn StdError + 'static),
    ) -> Self {
        RequestError::new(id, ResultCode::FormationViolation, context).with_details(details([
            ("exceptionMessage", Value::String(err.to_string())),
            ("exceptionStackTrace", Value::String(error_chain(err))),
        ]))
    }

    /// Local failure while handling a peer's request.
    pub fn internal_error(
        id: RequestId,
        sender: &NetworkingNodeId,
        event_tracking_id: &str,
        err: &(dyn StdError + 'static),
    ) -> Self {
        RequestError::new(
            id,
            ResultCode::InternalError,
            format!("internal error while processing request from {sender}"),
        )
        .with_details(details([
            ("sender", Value::String(sender.to_string())),
            ("eventTrackingId", Value::String(event_tracking_id.to_string())),
            ("exceptionMessage", Value::String(err.to_string())),
            ("exceptionStackTrace", Value::String(error_chain(err))),
        ]))
    }

    /// Signing failed; the request was not sent.
    pub fn signature_error(id: RequestId, errors: &[String]) -> Self {
        RequestError::new(id, ResultCode::SignatureError, "request could not be signed").with_details(
            details([(
                "signingErrors",
                Value::Array(errors.iter().cloned().map(Value::String).collect()),
            )]),
        )
    }

    pub fn not_implemented(id: RequestId, action: &str) -> Self {
        RequestError::new(
            id,
            ResultCode::NotImplemented,
            format!("action {action} is not supported by this node"),
        )
    }

    pub fn unknown_client(id: RequestId, destination: &NetworkingNodeId) -> Self {
        RequestError::new(
            id,
            ResultCode::UnknownClient,
            format!("networking node {destination} is not connected"),
        )
    }
}
