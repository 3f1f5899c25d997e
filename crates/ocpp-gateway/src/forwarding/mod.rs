//! Forwarding decision pipeline.
//!
//! For every request a networking node receives on behalf of someone else:
//! parse it with the action's schema, consult filters, fall back to the
//! node default, and hand back a `ForwardingDecision`.

pub mod action;
pub mod context;
pub mod decision;
pub mod observer;
pub mod pipeline;

pub use action::{filter_fn, ActionPipeline, ActionSchema, FilterVerdict, ForwardingFilter};
pub use context::RequestContext;
pub use decision::{ForwardingDecision, ForwardingResult, RejectResponse, SentHook, DEFAULT_REJECT_MESSAGE};
pub use observer::{ForwardingObserver, MetricsObserver, ObserverList, TracingObserver};
pub use pipeline::ForwardingPipeline;
