//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS for `/v1/ws/:node_id`
//! - Register the connection under the peer's networking node id
//! - Lifecycle: ping/pong + idle timeout + frame size limit
//! - Decode once, then hand frames to the connection's `InboundRouter`
//! - On close: fail everything still in flight on this connection

use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

use ocpp_core::protocol::{Envelope, NetworkingNodeId};

use crate::app_state::AppState;
use crate::transport::codec::{decode, frame_len, Inbound};
use crate::transport::connection::{send_envelope, ConnectionId, OcppConnection, WsConnection};
use crate::transport::inbound::InboundRouter;

const OUTBOUND_QUEUE: usize = 1024;

pub async fn ws_upgrade(
    State(app): State<AppState>,
    Path(node_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if app.metrics().is_draining() {
        return (StatusCode::SERVICE_UNAVAILABLE, "draining").into_response();
    }
    let peer = match NetworkingNodeId::parse(&node_id) {
        Ok(p) => p,
        Err(e) => {
            app.metrics().ws_upgrades.inc(&[("result", "rejected")]);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    app.metrics().ws_upgrades.inc(&[("result", "accepted")]);
    let max_frame = app.cfg().gateway.max_frame_bytes;
    let connection_id = app.registry().next_connection_id();
    let span = tracing::info_span!("session", node = %peer, connection = %connection_id);
    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| run_session(app, peer, connection_id, socket).instrument(span))
}

async fn run_session(app: AppState, peer: NetworkingNodeId, connection_id: ConnectionId, socket: WebSocket) {
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let conn = Arc::new(WsConnection::new(connection_id, peer.clone(), out_tx));
    app.registry().insert(Arc::clone(&conn));
    tracing::info!("connection opened");
    app.metrics().ws_active_sessions.inc(&[]);

    let gw = &app.cfg().gateway;
    let ping_every = Duration::from_millis(gw.ping_interval_ms);
    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);
    let max_frame = gw.max_frame_bytes;

    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();
    let shutdown = app.shutdown().child_token();
    let (router, _worker) = InboundRouter::spawn(
        Arc::clone(&conn) as Arc<dyn OcppConnection>,
        app.relay(),
        Arc::clone(app.table()),
        Arc::clone(app.metrics()),
        shutdown.clone(),
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }

            maybe_out = out_rx.recv() => {
                let Some(m) = maybe_out else { break; };
                if ws_tx.send(m).await.is_err() {
                    break;
                }
            }

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break; };
                last_activity = Instant::now();

                if frame_len(&msg) > max_frame {
                    app.metrics().decode_errors.inc(&[("reason", "frame_too_large")]);
                    tracing::warn!(max_frame, "frame exceeds limit; closing");
                    break;
                }

                match decode(msg) {
                    Inbound::Frame { env, .. } => {
                        router.route(env).await;
                    }
                    Inbound::Malformed { reply, bytes_len } => {
                        app.metrics().decode_errors.inc(&[("reason", reply.code.as_str())]);
                        tracing::warn!(request_id = %reply.id, code = %reply.code, bytes_len, "malformed frame");
                        if let Err(e) = send_envelope(conn.as_ref(), &Envelope::RequestError(reply)).await {
                            tracing::debug!(error = %e, "could not answer malformed frame");
                        }
                    }
                    Inbound::Ping(payload) => {
                        let _ = ws_tx.send(Message::Pong(payload)).await;
                    }
                    Inbound::Pong(_) => {}
                    Inbound::Close => break,
                }
            }

            _ = ping_tick.tick() => {
                let _ = ws_tx.send(Message::Ping(Vec::new())).await;
            }

            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::info!("idle timeout");
                    break;
                }
            }
        }
    }

    app.registry().remove(&peer, connection_id);
    let failed = app.table().connection_lost(connection_id);
    app.metrics().ws_active_sessions.dec(&[]);
    tracing::info!(failed, "connection closed");
}
