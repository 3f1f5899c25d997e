//! OCPP networking node library.
//!
//! Wires the WebSocket transport, pending-request table, outbound
//! dispatcher and forwarding pipeline into a relaying node. Consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod forwarding;
pub mod obs;
pub mod ops;
pub mod pending;
pub mod router;
pub mod signing;
pub mod transport;
