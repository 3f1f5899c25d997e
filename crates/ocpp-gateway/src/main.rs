//! OCPP networking node.
//!
//! - WebSocket endpoint: /v1/ws/{node_id}
//! - Decode-once: WS Message -> Envelope (JSON or binary)
//! - Requests run through the forwarding pipeline and are relayed
//! - Ops: /healthz, /readyz, /metrics

use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use ocpp_core::error::Result;
use ocpp_gateway::{app_state::AppState, config, router};

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "ocpp-gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = config::config_path();
    let cfg = config::load(&path)?;
    let listen = cfg.gateway.listen_addr()?;
    let sweep_every = cfg.forwarding.sweep_interval();

    let state = AppState::new(cfg)?;
    let sweeper = state
        .table()
        .spawn_sweeper(sweep_every, state.shutdown().clone());
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config = %path.display(), "ocpp-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| ocpp_core::OcppError::Transport(format!("bind {listen} failed: {e}")))?;

    let drain = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "ctrl_c handler failed; shutting down");
            }
            tracing::info!("shutdown requested");
            drain.begin_drain();
        })
        .await
        .map_err(|e| ocpp_core::OcppError::Transport(format!("server failed: {e}")))?;

    let _ = sweeper.await;
    tracing::info!("ocpp-gateway stopped");
    Ok(())
}
