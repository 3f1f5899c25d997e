//! Shared application state for the networking node.
//!
//! Wires config, connection registry, pending-request table, dispatcher,
//! forwarding pipeline and relay. Startup errors are returned, not panicked.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ocpp_core::error::Result;

use crate::config::GatewayConfig;
use crate::dispatch::OutboundDispatcher;
use crate::forwarding::{ForwardingPipeline, MetricsObserver, TracingObserver};
use crate::obs::NodeMetrics;
use crate::pending::PendingRequestTable;
use crate::signing::SignaturePolicy;
use crate::transport::{ConnectionRegistry, Relay};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    metrics: Arc<NodeMetrics>,
    registry: Arc<ConnectionRegistry>,
    table: Arc<PendingRequestTable>,
    dispatcher: Arc<OutboundDispatcher>,
    pipeline: Arc<ForwardingPipeline>,
    relay: Arc<Relay>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        Self::build(cfg, None)
    }

    /// Like `new`, signing every request this node sends.
    pub fn with_signer(cfg: GatewayConfig, signer: Arc<dyn SignaturePolicy>) -> Result<Self> {
        Self::build(cfg, Some(signer))
    }

    fn build(cfg: GatewayConfig, signer: Option<Arc<dyn SignaturePolicy>>) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(NodeMetrics::default());
        let registry = Arc::new(ConnectionRegistry::new());
        let table = Arc::new(PendingRequestTable::new(cfg.forwarding.max_pending));

        let mut dispatcher = OutboundDispatcher::new(Arc::clone(&table), cfg.forwarding.request_timeout())
            .with_metrics(Arc::clone(&metrics));
        if let Some(signer) = signer {
            dispatcher = dispatcher.with_signer(signer);
        }
        let dispatcher = Arc::new(dispatcher);

        let pipeline = Arc::new(ForwardingPipeline::new(
            cfg.node.id.clone(),
            cfg.forwarding.default_result,
        ));
        pipeline.subscribe(Arc::new(TracingObserver));
        pipeline.subscribe(Arc::new(MetricsObserver::new(Arc::clone(&metrics))));

        let relay = Arc::new(Relay::new(
            cfg.node.upstream.clone(),
            Arc::clone(&registry),
            Arc::clone(&pipeline),
            Arc::clone(&dispatcher),
        ));

        tracing::info!(
            node = %cfg.node.id,
            upstream = ?cfg.node.upstream.as_ref().map(|u| u.as_str()),
            default_result = cfg.forwarding.default_result.as_str(),
            "node state ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                metrics,
                registry,
                table,
                dispatcher,
                pipeline,
                relay,
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.inner.metrics
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.registry
    }

    pub fn table(&self) -> &Arc<PendingRequestTable> {
        &self.inner.table
    }

    pub fn dispatcher(&self) -> &Arc<OutboundDispatcher> {
        &self.inner.dispatcher
    }

    /// Register per-action pipelines here before serving.
    pub fn pipeline(&self) -> &Arc<ForwardingPipeline> {
        &self.inner.pipeline
    }

    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.inner.relay)
    }

    /// Cancelled once on shutdown; sessions and the sweeper watch it.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Stop accepting connections and wind down the live ones.
    pub fn begin_drain(&self) {
        self.inner.metrics.set_draining();
        self.inner.shutdown.cancel();
    }

    /// Point-in-time gauges appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("ocpp_pending_requests", self.inner.table.len() as u64),
            ("ocpp_connected_nodes", self.inner.registry.len() as u64),
        ]
    }
}
