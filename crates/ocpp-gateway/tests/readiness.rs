#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use tokio::sync::mpsc;

use ocpp_core::protocol::NetworkingNodeId;
use ocpp_gateway::app_state::AppState;
use ocpp_gateway::config;
use ocpp_gateway::ops::Readiness;
use ocpp_gateway::transport::WsConnection;

fn state(yaml: &str) -> AppState {
    AppState::new(config::parse(yaml).unwrap()).unwrap()
}

#[tokio::test]
async fn node_without_upstream_is_ready() {
    let s = state("version: 1\nnode: { id: \"LC-1\" }\n");
    assert_eq!(Readiness::of(&s), Readiness::Ready);
}

#[tokio::test]
async fn readiness_follows_the_upstream_link() {
    let s = state("version: 1\nnode: { id: \"LC-1\", upstream: \"CSMS1\" }\n");
    let csms = NetworkingNodeId::parse("CSMS1").unwrap();
    assert_eq!(Readiness::of(&s), Readiness::UpstreamDown(csms.clone()));

    let (tx, _rx) = mpsc::channel(1);
    let conn_id = s.registry().next_connection_id();
    s.registry().insert(Arc::new(WsConnection::new(conn_id, csms.clone(), tx)));
    assert_eq!(Readiness::of(&s), Readiness::Ready);

    s.begin_drain();
    assert_eq!(Readiness::of(&s), Readiness::Draining);
    s.registry().remove(&csms, conn_id);
    assert_eq!(Readiness::of(&s), Readiness::Draining);
}
