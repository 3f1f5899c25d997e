//! Outbound dispatcher exports.
//!
//! Re-exports the dispatcher and its transmit/id helpers so downstream
//! consumers can depend on this module directly.

pub mod dispatcher;

pub use dispatcher::{OutboundDispatcher, RequestIdGenerator, TransmitStatus};
