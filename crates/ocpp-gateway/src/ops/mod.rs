//! Operational HTTP endpoints.
//!
//! - `/healthz` : process is up
//! - `/readyz`  : node can relay (not draining, upstream link present)
//! - `/metrics` : Prometheus text format

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use ocpp_core::protocol::NetworkingNodeId;

use crate::app_state::AppState;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Draining,
    /// Configured upstream has no live connection, so only directly
    /// connected destinations are reachable.
    UpstreamDown(NetworkingNodeId),
}

impl Readiness {
    pub fn of(state: &AppState) -> Self {
        if state.is_draining() {
            return Readiness::Draining;
        }
        match &state.cfg().node.upstream {
            Some(up) if !state.registry().contains(up) => Readiness::UpstreamDown(up.clone()),
            _ => Readiness::Ready,
        }
    }
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz(State(state): State<AppState>) -> Response {
    match Readiness::of(&state) {
        Readiness::Ready => (StatusCode::OK, "ready").into_response(),
        Readiness::Draining => (StatusCode::SERVICE_UNAVAILABLE, "draining").into_response(),
        Readiness::UpstreamDown(up) => {
            (StatusCode::SERVICE_UNAVAILABLE, format!("upstream {up} not connected")).into_response()
        }
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render(&state.metrics_extra());
    ([(header::CONTENT_TYPE, PROMETHEUS_TEXT)], body).into_response()
}
