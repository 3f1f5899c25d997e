//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler, the decode-once codec, per-connection
//! inbound routing, the connection registry, and the relay that turns
//! inbound requests into next-hop sends.

pub mod codec;
pub mod connection;
pub mod inbound;
pub mod registry;
pub mod relay;
pub mod ws;

pub use connection::{send_envelope, ConnectionId, OcppConnection, WsConnection};
pub use inbound::{InboundRouter, Routed};
pub use registry::ConnectionRegistry;
pub use relay::{relayed_reply, Relay};
