#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ocpp_core::protocol::{Payload, Request, RequestError, RequestId, Response, ResultCode};
use ocpp_gateway::pending::{Completion, PendingRequestTable};
use ocpp_gateway::transport::ConnectionId;

fn id(s: &str) -> RequestId {
    RequestId::parse(s).unwrap()
}

fn heartbeat(s: &str) -> Request {
    Request::new(id(s), "Heartbeat", Payload::empty_json())
}

const CONN: ConnectionId = ConnectionId::new(7);

#[tokio::test]
async fn response_completes_exactly_once() {
    let table = PendingRequestTable::new(16);
    let rx = table.register(CONN, &heartbeat("19223201"), Duration::from_secs(30)).unwrap();
    assert!(table.contains(CONN, &id("19223201")));

    let resp = Response::new(id("19223201"), Payload::empty_json());
    assert!(table.handle_response(CONN, resp.clone()));
    // second arrival and a late timeout are both no-ops
    assert!(!table.handle_response(CONN, resp));
    assert!(!table.expire(CONN, &id("19223201")));

    let state = rx.await.unwrap();
    assert!(state.is_success());
    assert_eq!(state.result_code(), ResultCode::Ok);
    assert_eq!(state.action, "Heartbeat");
    assert!(table.is_empty());
}

#[tokio::test]
async fn error_is_matched_by_connection_and_id() {
    let table = PendingRequestTable::new(16);
    let rx = table.register(CONN, &heartbeat("a"), Duration::from_secs(30)).unwrap();

    // same id on another connection is not ours
    let stray = RequestError::new(id("a"), ResultCode::NotSupported, "nope");
    assert!(!table.handle_error(ConnectionId::new(8), stray.clone()));
    assert!(table.handle_error(CONN, stray));

    let state = rx.await.unwrap();
    assert_eq!(state.result_code(), ResultCode::NotSupported);
    assert_eq!(state.error().unwrap().description, "nope");
}

#[tokio::test]
async fn unmatched_response_is_dropped() {
    let table = PendingRequestTable::new(16);
    assert!(!table.handle_response(CONN, Response::new(id("ghost"), Payload::empty_json())));
    assert!(table.is_empty());
}

#[test]
fn duplicate_and_capacity_are_refused() {
    let table = PendingRequestTable::new(2);
    let _a = table.register(CONN, &heartbeat("1"), Duration::from_secs(30)).unwrap();

    let dup = table.register(CONN, &heartbeat("1"), Duration::from_secs(30)).unwrap_err();
    assert_eq!(dup.result_code(), ResultCode::ProtocolError);

    // same id on another connection is a different key
    let _b = table.register(ConnectionId::new(8), &heartbeat("1"), Duration::from_secs(30)).unwrap();

    let full = table.register(CONN, &heartbeat("3"), Duration::from_secs(30)).unwrap_err();
    assert_eq!(full.result_code(), ResultCode::NetworkError);
    assert!(matches!(full, Completion::NotSent { .. }));
    assert_eq!(table.len(), 2);
}

#[tokio::test]
async fn connection_lost_fails_only_that_connection() {
    let table = PendingRequestTable::new(16);
    let rx1 = table.register(CONN, &heartbeat("1"), Duration::from_secs(30)).unwrap();
    let rx2 = table.register(CONN, &heartbeat("2"), Duration::from_secs(30)).unwrap();
    let _other = table.register(ConnectionId::new(8), &heartbeat("1"), Duration::from_secs(30)).unwrap();

    assert_eq!(table.connection_lost(CONN), 2);
    assert_eq!(table.len(), 1);

    for rx in [rx1, rx2] {
        let state = rx.await.unwrap();
        assert_eq!(state.completion, Completion::ConnectionLost);
        assert_eq!(state.result_code(), ResultCode::NetworkError);
    }
}

#[tokio::test(start_paused = true)]
async fn sweep_expires_only_past_deadlines() {
    let table = PendingRequestTable::new(16);
    let short = table.register(CONN, &heartbeat("short"), Duration::from_secs(1)).unwrap();
    let _long = table.register(CONN, &heartbeat("long"), Duration::from_secs(60)).unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(table.sweep_expired(Instant::now()), 1);
    assert!(table.contains(CONN, &id("long")));

    let state = short.await.unwrap();
    assert_eq!(state.completion, Completion::Timeout);
    assert_eq!(state.round_trip(), Some(Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn background_sweeper_times_out_without_traffic() {
    let table = Arc::new(PendingRequestTable::new(16));
    let shutdown = CancellationToken::new();
    let sweeper = table.spawn_sweeper(Duration::from_millis(100), shutdown.clone());

    let rx = table.register(CONN, &heartbeat("1"), Duration::from_millis(500)).unwrap();
    let state = rx.await.unwrap();
    assert_eq!(state.result_code(), ResultCode::Timeout);
    assert!(table.is_empty());

    shutdown.cancel();
    sweeper.await.unwrap();
}

#[test]
fn action_is_available_while_pending() {
    let table = PendingRequestTable::new(16);
    let req = Request::new(id("9"), "DataTransfer", Payload::empty_json());
    let _rx = table.register(CONN, &req, Duration::from_secs(30)).unwrap();
    assert_eq!(table.action_of(CONN, &id("9")).as_deref(), Some("DataTransfer"));
    assert!(table.cancel(CONN, &id("9")));
    assert_eq!(table.action_of(CONN, &id("9")), None);
}

#[test]
fn concurrent_registrations_never_exceed_capacity() {
    let table = Arc::new(PendingRequestTable::new(8));

    let accepted: usize = std::thread::scope(|s| {
        let workers: Vec<_> = (0..32)
            .map(|i| {
                let table = Arc::clone(&table);
                s.spawn(move || {
                    (0..4)
                        .filter(|j| {
                            let req = heartbeat(&format!("{i}-{j}"));
                            table.register(CONN, &req, Duration::from_secs(30)).is_ok()
                        })
                        .count()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).sum()
    });

    assert_eq!(accepted, 8);
    assert_eq!(table.len(), 8);

    // completed entries give their slots back
    assert_eq!(table.connection_lost(CONN), 8);
    for i in 0..8 {
        table.register(CONN, &heartbeat(&format!("again-{i}")), Duration::from_secs(30)).unwrap();
    }
    assert!(table.register(CONN, &heartbeat("one-too-many"), Duration::from_secs(30)).is_err());
}
