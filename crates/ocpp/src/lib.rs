//! Top-level facade crate for the OCPP networking node.
//!
//! Re-exports the protocol core and the gateway library so users can depend on a single crate.

pub mod core {
    pub use ocpp_core::*;
}

pub mod gateway {
    pub use ocpp_gateway::*;
}
