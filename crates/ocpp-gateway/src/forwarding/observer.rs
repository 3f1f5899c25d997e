//! Received / filtered / sent notifications.
//!
//! Observers are called inline and must return quickly. A panicking observer
//! is caught and logged; the remaining observers still run and the pipeline
//! carries on.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use ocpp_core::protocol::Request;

use super::context::RequestContext;
use super::decision::ForwardingDecision;
use crate::dispatch::TransmitStatus;
use crate::obs::metrics::NodeMetrics;

pub trait ForwardingObserver: Send + Sync {
    fn on_request_received(&self, _ctx: &RequestContext, _request: &Request) {}

    fn on_request_filtered(&self, _ctx: &RequestContext, _decision: &ForwardingDecision) {}

    fn on_request_sent(&self, _ctx: &RequestContext, _status: &TransmitStatus) {}
}

/// Subscribers in registration order.
#[derive(Default)]
pub struct ObserverList {
    inner: RwLock<Vec<Arc<dyn ForwardingObserver>>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn ForwardingObserver>) {
        // Poisoned lock means an earlier writer panicked; keep serving.
        match self.inner.write() {
            Ok(mut g) => g.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn ForwardingObserver>> {
        match self.inner.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn each(&self, event: &'static str, f: impl Fn(&dyn ForwardingObserver)) {
        for o in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| f(o.as_ref()))).is_err() {
                tracing::error!(event, "forwarding observer panicked");
            }
        }
    }

    pub fn request_received(&self, ctx: &RequestContext, request: &Request) {
        self.each("received", |o| o.on_request_received(ctx, request));
    }

    pub fn request_filtered(&self, ctx: &RequestContext, decision: &ForwardingDecision) {
        self.each("filtered", |o| o.on_request_filtered(ctx, decision));
    }

    pub fn request_sent(&self, ctx: &RequestContext, status: &TransmitStatus) {
        self.each("sent", |o| o.on_request_sent(ctx, status));
    }
}

/// Logs every notification through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ForwardingObserver for TracingObserver {
    fn on_request_received(&self, ctx: &RequestContext, request: &Request) {
        tracing::debug!(
            source = %ctx.source,
            request_id = %ctx.request_id,
            action = %request.action,
            destination = ?ctx.destination.as_ref().map(|d| d.as_str()),
            event = %ctx.event_tracking_id,
            "request received"
        );
    }

    fn on_request_filtered(&self, ctx: &RequestContext, decision: &ForwardingDecision) {
        let code = decision.reject_response().map(|r| r.result_code());
        tracing::info!(
            source = %ctx.source,
            request_id = %ctx.request_id,
            action = %ctx.action,
            result = decision.result().as_str(),
            code = ?code.as_ref().map(|c| c.as_str()),
            rewritten = decision.rewritten().is_some(),
            log = ?decision.log_message(),
            event = %ctx.event_tracking_id,
            "request filtered"
        );
    }

    fn on_request_sent(&self, ctx: &RequestContext, status: &TransmitStatus) {
        match status {
            TransmitStatus::Success => tracing::debug!(
                request_id = %ctx.request_id,
                action = %ctx.action,
                event = %ctx.event_tracking_id,
                "request sent"
            ),
            other => tracing::warn!(
                request_id = %ctx.request_id,
                action = %ctx.action,
                status = ?other,
                event = %ctx.event_tracking_id,
                "request not sent"
            ),
        }
    }
}

/// Counts decisions and transmits per action.
pub struct MetricsObserver {
    metrics: Arc<NodeMetrics>,
}

impl MetricsObserver {
    pub fn new(metrics: Arc<NodeMetrics>) -> Self {
        Self { metrics }
    }
}

impl ForwardingObserver for MetricsObserver {
    fn on_request_filtered(&self, ctx: &RequestContext, decision: &ForwardingDecision) {
        self.metrics
            .forwarding_decisions
            .inc(&[("action", &*ctx.action), ("result", decision.result().as_str())]);
    }

    fn on_request_sent(&self, ctx: &RequestContext, status: &TransmitStatus) {
        self.metrics
            .forwarded_sends
            .inc(&[("action", &*ctx.action), ("status", status.label())]);
    }
}
