//! Signing hook invoked before any request leaves the node.
//!
//! The policy itself (keys, algorithms, which actions to sign) lives outside
//! this crate; the dispatcher only calls it.

use ocpp_core::protocol::Request;

/// Signs outgoing requests, typically by adding signature fields to the payload.
pub trait SignaturePolicy: Send + Sync {
    /// `serialized` is the payload as it would go on the wire before signing.
    ///
    /// On failure the request is not sent; the returned messages are reported
    /// back to the caller in a `SignatureError`.
    fn sign_request(&self, request: &mut Request, serialized: &[u8]) -> Result<(), Vec<String>>;
}
