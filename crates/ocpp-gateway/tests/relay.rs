#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{id, node, MockConnection};
use ocpp_core::protocol::{json, Envelope, NetworkPath, Payload, Request, Response, ResultCode};
use ocpp_gateway::dispatch::OutboundDispatcher;
use ocpp_gateway::forwarding::{ForwardingPipeline, ForwardingResult};
use ocpp_gateway::pending::PendingRequestTable;
use ocpp_gateway::transport::{ConnectionRegistry, OcppConnection, Relay, WsConnection};

struct Node {
    registry: Arc<ConnectionRegistry>,
    table: Arc<PendingRequestTable>,
    relay: Arc<Relay>,
}

fn build(default_result: ForwardingResult, upstream: Option<&str>) -> Node {
    let registry = Arc::new(ConnectionRegistry::new());
    let table = Arc::new(PendingRequestTable::new(64));
    let dispatcher = Arc::new(OutboundDispatcher::new(Arc::clone(&table), Duration::from_secs(1)));
    let pipeline = Arc::new(ForwardingPipeline::new(node("LC-1"), default_result));
    let relay = Arc::new(Relay::new(
        upstream.map(node),
        Arc::clone(&registry),
        pipeline,
        dispatcher,
    ));
    Node { registry, table, relay }
}

fn attach(n: &Node, peer: &str) -> (Arc<WsConnection>, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(16);
    let conn = Arc::new(WsConnection::new(n.registry.next_connection_id(), node(peer), tx));
    n.registry.insert(Arc::clone(&conn));
    (conn, rx)
}

async fn next_envelope(rx: &mut mpsc::Receiver<Message>) -> Envelope {
    match rx.recv().await.unwrap() {
        Message::Text(t) => json::decode(&t).unwrap(),
        other => panic!("unexpected frame {other:?}"),
    }
}

fn status_notification(req_id: &str) -> Request {
    let payload = json!({"connectorId": 1, "status": "Available"});
    Request::new(id(req_id), "StatusNotification", payload.as_object().unwrap().clone())
}

#[tokio::test(start_paused = true)]
async fn forwards_upstream_and_relays_answer_under_original_id() {
    let n = build(ForwardingResult::Forward, Some("CSMS1"));
    let (upstream, mut upstream_rx) = attach(&n, "CSMS1");
    let (station, mut station_rx) = MockConnection::new(100, "CS001");

    let task = {
        let relay = Arc::clone(&n.relay);
        let station = Arc::clone(&station);
        tokio::spawn(async move {
            relay
                .handle(station.as_ref(), status_notification("abc"), &CancellationToken::new())
                .await
        })
    };

    let Envelope::Request(hop) = next_envelope(&mut upstream_rx).await else { panic!("expected CALL") };
    assert_eq!(hop.action, "StatusNotification");
    assert_ne!(hop.id.as_str(), "abc");
    assert!(!hop.is_multi_hop());

    let answer = Response::new(hop.id.clone(), Payload::empty_json());
    assert!(n.table.handle_response(upstream.id(), answer));
    task.await.unwrap();

    let reply = station_rx.recv().await.unwrap().envelope();
    assert_eq!(reply, Envelope::Response(Response::new(id("abc"), Payload::empty_json())));
    assert!(n.table.is_empty());
}

#[tokio::test(start_paused = true)]
async fn relayed_request_goes_to_connected_destination_with_hop_appended() {
    let n = build(ForwardingResult::Forward, None);
    let (_dest, mut dest_rx) = attach(&n, "CS001");
    let (csms, mut csms_rx) = MockConnection::new(100, "CSMS1");

    let req = status_notification("19223201")
        .with_routing(node("CS001"), NetworkPath::from_hops(vec![node("CSMS1")]));
    let task = {
        let relay = Arc::clone(&n.relay);
        let csms = Arc::clone(&csms);
        tokio::spawn(async move { relay.handle(csms.as_ref(), req, &CancellationToken::new()).await })
    };

    let Envelope::Request(hop) = next_envelope(&mut dest_rx).await else { panic!("expected CALL") };
    assert_eq!(hop.destination(), Some(&node("CS001")));
    let hops: Vec<&str> = hop.network_path().iter().map(|h| h.as_str()).collect();
    assert_eq!(hops, vec!["CSMS1", "LC-1"]);

    // no answer: the originator hears about the timeout
    task.await.unwrap();
    let Envelope::RequestError(err) = csms_rx.recv().await.unwrap().envelope() else { panic!("expected CALLERROR") };
    assert_eq!(err.id.as_str(), "19223201");
    assert_eq!(err.code, ResultCode::Timeout);
}

#[tokio::test]
async fn unknown_destination_is_unknown_client() {
    let n = build(ForwardingResult::Forward, None);
    let (csms, mut csms_rx) = MockConnection::new(100, "CSMS1");

    let req = status_notification("9").with_routing(node("CS999"), NetworkPath::from_hops(vec![node("CSMS1")]));
    n.relay.handle(csms.as_ref(), req, &CancellationToken::new()).await;

    let Envelope::RequestError(err) = csms_rx.recv().await.unwrap().envelope() else { panic!("expected CALLERROR") };
    assert_eq!(err.code, ResultCode::UnknownClient);
    assert_eq!(err.id.as_str(), "9");
}

#[tokio::test]
async fn never_routes_back_to_the_sender() {
    let n = build(ForwardingResult::Forward, Some("CSMS1"));
    let (csms, mut csms_rx) = attach(&n, "CSMS1");

    n.relay
        .handle(csms.as_ref(), status_notification("1"), &CancellationToken::new())
        .await;

    let Envelope::RequestError(err) = next_envelope(&mut csms_rx).await else { panic!("expected CALLERROR") };
    assert_eq!(err.code, ResultCode::UnknownClient);
}

#[tokio::test]
async fn rejected_request_is_answered_locally() {
    let n = build(ForwardingResult::Reject, Some("CSMS1"));
    let (_upstream, mut upstream_rx) = attach(&n, "CSMS1");
    let (station, mut station_rx) = MockConnection::new(100, "CS001");

    n.relay
        .handle(station.as_ref(), status_notification("5"), &CancellationToken::new())
        .await;

    let Envelope::RequestError(err) = station_rx.recv().await.unwrap().envelope() else { panic!("expected CALLERROR") };
    assert_eq!(err.code, ResultCode::NotImplemented);
    assert_eq!(err.id.as_str(), "5");
    assert!(upstream_rx.try_recv().is_err());
}

#[test]
fn replaced_session_does_not_evict_successor() {
    let n = build(ForwardingResult::Forward, None);
    let (old, _rx1) = attach(&n, "CS001");
    let (new, _rx2) = attach(&n, "CS001");

    assert!(!n.registry.remove(&node("CS001"), old.connection_id()));
    assert_eq!(n.registry.get(&node("CS001")).unwrap().connection_id(), new.connection_id());
    assert!(n.registry.remove(&node("CS001"), new.connection_id()));
    assert!(n.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn destination_on_arrival_connection_falls_back_to_upstream() {
    let n = build(ForwardingResult::Forward, Some("CSMS1"));
    let (upstream, mut upstream_rx) = attach(&n, "CSMS1");
    let (station, mut station_rx) = attach(&n, "CS001");

    let req = status_notification("77").with_routing(node("CS001"), NetworkPath::from_hops(vec![node("CS001")]));
    let task = {
        let relay = Arc::clone(&n.relay);
        let station = Arc::clone(&station);
        tokio::spawn(async move { relay.handle(station.as_ref(), req, &CancellationToken::new()).await })
    };

    let Envelope::Request(hop) = next_envelope(&mut upstream_rx).await else { panic!("expected CALL") };
    assert_eq!(hop.action, "StatusNotification");
    assert!(n.table.handle_response(upstream.id(), Response::new(hop.id.clone(), Payload::empty_json())));
    task.await.unwrap();

    let Envelope::Response(answer) = next_envelope(&mut station_rx).await else { panic!("expected CALLRESULT") };
    assert_eq!(answer.id.as_str(), "77");
}
