//! Pending-request tracking for outbound requests.
//!
//! `PendingRequestTable` is the only structure shared across connection
//! workers that they all mutate; `SendRequestState` is what a dispatch
//! eventually resolves to.

pub mod state;
pub mod table;

pub use state::{Completion, SendRequestState};
pub use table::{PendingKey, PendingRequest, PendingRequestTable, Waiter};
