#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use common::{id, node, MockConnection};
use ocpp_core::error::Result;
use ocpp_core::protocol::{binary, Envelope, Payload, Request, RequestError, Response, ResultCode};
use ocpp_gateway::dispatch::OutboundDispatcher;
use ocpp_gateway::forwarding::{
    ActionPipeline, ActionSchema, FilterVerdict, ForwardingFilter, ForwardingPipeline, ForwardingResult,
    RequestContext,
};
use ocpp_gateway::obs::NodeMetrics;
use ocpp_gateway::pending::{Completion, PendingRequestTable};
use ocpp_gateway::transport::codec::{self, Inbound};
use ocpp_gateway::transport::{ConnectionRegistry, InboundRouter, OcppConnection, Relay, Routed};

fn malformed(msg: Message) -> RequestError {
    match codec::decode(msg) {
        Inbound::Malformed { reply, .. } => reply,
        other => panic!("expected a malformed frame, got {other:?}"),
    }
}

// ---- decode path

#[test]
fn wrong_payload_kind_is_a_formation_violation_with_salvaged_id() {
    let reply = malformed(Message::Text(r#"[2,"abc","Heartbeat",1]"#.into()));
    assert_eq!(reply.code, ResultCode::FormationViolation);
    assert_eq!(reply.id.as_str(), "abc");
    assert_eq!(reply.description, "malformed OCPP frame");
    assert!(reply.details["exceptionMessage"].as_str().unwrap().contains("object"));
}

#[test]
fn unknown_message_type_is_not_supported() {
    let reply = malformed(Message::Text(r#"[7,"x"]"#.into()));
    assert_eq!(reply.code, ResultCode::MessageTypeNotSupported);
    assert_eq!(reply.id.as_str(), "x");
    assert!(reply.description.contains("unsupported message type: 7"));
    assert!(reply.details.is_empty());
}

#[test]
fn unreadable_text_is_answered_under_placeholder_id() {
    let reply = malformed(Message::Text("not json".into()));
    assert_eq!(reply.code, ResultCode::FormationViolation);
    assert_eq!(reply.id.as_str(), "-1");
}

#[test]
fn malformed_binary_frames_use_placeholder_id() {
    let truncated = malformed(Message::Binary(vec![2, 0, 5, b'a']));
    assert_eq!(truncated.code, ResultCode::FormationViolation);
    assert_eq!(truncated.id.as_str(), "-1");

    let error_tag = malformed(Message::Binary(vec![4]));
    assert_eq!(error_tag.code, ResultCode::MessageTypeNotSupported);
    assert_eq!(error_tag.id.as_str(), "-1");
}

#[test]
fn well_formed_frames_decode_once() {
    let text = r#"[2,"19223201","Heartbeat",{}]"#;
    match codec::decode(Message::Text(text.into())) {
        Inbound::Frame { env, bytes_len } => {
            assert_eq!(env.request_id().as_str(), "19223201");
            assert_eq!(bytes_len, text.len());
        }
        other => panic!("expected a frame, got {other:?}"),
    }
    assert!(matches!(codec::decode(Message::Close(None)), Inbound::Close));
    assert_eq!(codec::frame_len(&Message::Binary(vec![0; 9])), 9);
}

// ---- routing

struct Node {
    table: Arc<PendingRequestTable>,
    metrics: Arc<NodeMetrics>,
    relay: Arc<Relay>,
}

fn build(pipeline: ForwardingPipeline) -> Node {
    let registry = Arc::new(ConnectionRegistry::new());
    let table = Arc::new(PendingRequestTable::new(64));
    let metrics = Arc::new(NodeMetrics::default());
    let dispatcher = Arc::new(OutboundDispatcher::new(Arc::clone(&table), Duration::from_secs(5)));
    let relay = Arc::new(Relay::new(None, registry, Arc::new(pipeline), dispatcher));
    Node { table, metrics, relay }
}

fn router(n: &Node, conn: Arc<dyn OcppConnection>) -> InboundRouter {
    let (router, _worker) = InboundRouter::spawn(
        conn,
        Arc::clone(&n.relay),
        Arc::clone(&n.table),
        Arc::clone(&n.metrics),
        CancellationToken::new(),
    );
    router
}

fn binary_request(s: &str) -> Request {
    Request::new(id(s), "DataTransfer", Bytes::from_static(b"\x01\x02"))
}

#[tokio::test]
async fn unmatched_binary_result_is_dropped() {
    let n = build(ForwardingPipeline::new(node("LC-1"), ForwardingResult::Reject));
    let (conn, _frames) = MockConnection::new(3, "CS001");
    let r = router(&n, conn);

    let stray = Response::new(id("404"), Bytes::from_static(b"\x00"));
    assert_eq!(r.route(Envelope::Response(stray)).await, Routed::Unmatched);
    assert_eq!(n.metrics.unmatched_responses.get(&[("kind", "result")]), 1);
    assert!(n.table.is_empty());
}

#[tokio::test]
async fn matched_binary_result_completes_pending_request() {
    let n = build(ForwardingPipeline::new(node("LC-1"), ForwardingResult::Reject));
    let (conn, _frames) = MockConnection::new(3, "CS001");
    let waiter = n.table.register(conn.id(), &binary_request("42"), Duration::from_secs(30)).unwrap();
    let r = router(&n, conn);

    // binary frames go through the wire codec first
    let wire = binary::encode(&Envelope::Response(Response::new(id("42"), Bytes::from_static(b"\x09")))).unwrap();
    let Inbound::Frame { env, .. } = codec::decode(Message::Binary(wire.to_vec())) else { panic!("expected frame") };
    assert_eq!(r.route(env).await, Routed::Matched);

    let state = waiter.await.unwrap();
    assert_eq!(state.action, "DataTransfer");
    let Completion::Response(resp) = state.completion else { panic!("expected response") };
    assert_eq!(resp.payload, Payload::Binary(Bytes::from_static(b"\x09")));
    assert_eq!(n.metrics.unmatched_responses.get(&[("kind", "result")]), 0);
}

#[tokio::test]
async fn errors_complete_or_count_as_unmatched() {
    let n = build(ForwardingPipeline::new(node("LC-1"), ForwardingResult::Reject));
    let (conn, _frames) = MockConnection::new(3, "CS001");
    let heartbeat = Request::new(id("7"), "Heartbeat", Payload::empty_json());
    let _waiter = n.table.register(conn.id(), &heartbeat, Duration::from_secs(30)).unwrap();
    let r = router(&n, conn);

    let err = RequestError::new(id("7"), ResultCode::InternalError, "boom");
    assert_eq!(r.route(Envelope::RequestError(err.clone())).await, Routed::Matched);
    assert_eq!(r.route(Envelope::RequestError(err)).await, Routed::Unmatched);
    assert_eq!(n.metrics.unmatched_responses.get(&[("kind", "error")]), 1);
}

// ---- per-connection ordering

struct Heartbeat;

impl ActionSchema for Heartbeat {
    type Request = ();
    type Response = ();
    const ACTION: &'static str = "Heartbeat";

    fn parse_request(_ctx: &RequestContext, _payload: &Payload) -> Result<()> {
        Ok(())
    }

    fn serialize_request(_request: &()) -> Result<Payload> {
        Ok(Payload::empty_json())
    }

    fn rejected_response(_request: &()) {}

    fn serialize_response(_response: &()) -> Result<Payload> {
        Ok(Payload::empty_json())
    }
}

/// Rejects everything, taking longer over the first request.
struct SlowFirst;

#[async_trait]
impl ForwardingFilter<Heartbeat> for SlowFirst {
    async fn filter(&self, ctx: &RequestContext, _request: &()) -> Result<Option<FilterVerdict<Heartbeat>>> {
        if ctx.request_id.as_str() == "1" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(Some(FilterVerdict::reject()))
    }
}

#[tokio::test(start_paused = true)]
async fn requests_from_one_peer_are_answered_in_arrival_order() {
    let pipeline = ForwardingPipeline::new(node("LC-1"), ForwardingResult::Forward);
    pipeline.register(ActionPipeline::<Heartbeat>::new().with_filter(Arc::new(SlowFirst)));
    let n = build(pipeline);
    let (conn, mut frames) = MockConnection::new(3, "CS001");
    let r = router(&n, conn);

    for req_id in ["1", "2", "3"] {
        let req = Request::new(id(req_id), "Heartbeat", Payload::empty_json());
        assert_eq!(r.route(Envelope::Request(req)).await, Routed::Queued);
    }

    let mut answered = Vec::new();
    for _ in 0..3 {
        let Envelope::Response(resp) = frames.recv().await.unwrap().envelope() else { panic!("expected CALLRESULT") };
        answered.push(resp.id.as_str().to_string());
    }
    assert_eq!(answered, vec!["1", "2", "3"]);
}
