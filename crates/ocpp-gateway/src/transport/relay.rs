//! Relay loop: inbound request -> forwarding decision -> next hop -> reply.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use ocpp_core::protocol::{Envelope, NetworkingNodeId, Request, RequestError, RequestId, Response, ResultCode};

use super::connection::{send_envelope, OcppConnection, WsConnection};
use super::registry::ConnectionRegistry;
use crate::dispatch::{OutboundDispatcher, TransmitStatus};
use crate::forwarding::{ForwardingPipeline, RequestContext};
use crate::pending::{Completion, SendRequestState};

pub struct Relay {
    node_id: NetworkingNodeId,
    upstream: Option<NetworkingNodeId>,
    registry: Arc<ConnectionRegistry>,
    pipeline: Arc<ForwardingPipeline>,
    dispatcher: Arc<OutboundDispatcher>,
    tracking: AtomicU64,
}

impl Relay {
    pub fn new(
        upstream: Option<NetworkingNodeId>,
        registry: Arc<ConnectionRegistry>,
        pipeline: Arc<ForwardingPipeline>,
        dispatcher: Arc<OutboundDispatcher>,
    ) -> Self {
        Self {
            node_id: pipeline.node_id().clone(),
            upstream,
            registry,
            pipeline,
            dispatcher,
            tracking: AtomicU64::new(1),
        }
    }

    pub fn pipeline(&self) -> &Arc<ForwardingPipeline> {
        &self.pipeline
    }

    fn next_tracking_id(&self) -> String {
        let n = self.tracking.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.node_id, n)
    }

    /// Handle one request received on `from`, answering it on `from`.
    pub async fn handle(&self, from: &dyn OcppConnection, request: Request, cancel: &CancellationToken) {
        self.relay_request(from, request, cancel, None).await;
    }

    /// Handle `request` on a task of its own, returning once it has been
    /// answered locally or written to the next hop. The round trip to the
    /// next hop continues in the background.
    pub async fn handle_in_order(
        self: &Arc<Self>,
        from: Arc<dyn OcppConnection>,
        request: Request,
        cancel: CancellationToken,
    ) {
        let (release, released) = oneshot::channel::<()>();
        let relay = Arc::clone(self);
        tokio::spawn(
            async move {
                relay.relay_request(from.as_ref(), request, &cancel, Some(release)).await;
            }
            .in_current_span(),
        );
        // the sender is dropped once the request left this node, or on panic
        let _ = released.await;
    }

    async fn relay_request(
        &self,
        from: &dyn OcppConnection,
        request: Request,
        cancel: &CancellationToken,
        release: Option<oneshot::Sender<()>>,
    ) {
        let ctx = RequestContext::for_request(from.id(), from.peer().clone(), &request, self.next_tracking_id());

        let mut decision = match self.pipeline.process(&ctx, request, cancel).await {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(connection = %ctx.connection, request_id = %ctx.request_id, error = %e, "forwarding abandoned");
                return;
            }
        };

        if let Some(reject) = decision.reject_response() {
            reply(from, reject.to_envelope()).await;
            return;
        }

        let original_id = decision.request().id.clone();
        let target = match self.next_hop(from, decision.outgoing()) {
            Ok(t) => t,
            Err(error) => {
                decision.notify_sent(&TransmitStatus::NotAttempted(error.description.clone()));
                reply(from, Envelope::RequestError(error)).await;
                return;
            }
        };

        let mut outgoing = decision.next_hop_request(&self.node_id);
        // fresh id on the next hop; peers' ids may collide there
        outgoing.id = self.dispatcher.next_request_id();
        tracing::debug!(
            request_id = %original_id,
            hop_request_id = %outgoing.id,
            action = %outgoing.action,
            next_hop = %target.peer_id(),
            "relaying request"
        );

        let hook = decision.take_sent_hook();
        let state = self
            .dispatcher
            .send_observed(target.as_ref(), outgoing, self.dispatcher.default_timeout(), cancel, move |status| {
                if let Some(hook) = hook {
                    hook(status);
                }
                drop(release);
            })
            .await;

        reply(from, relayed_reply(original_id, state)).await;
    }

    /// Destination if connected, else the configured upstream. Never back
    /// over the connection the request arrived on.
    fn next_hop(&self, from: &dyn OcppConnection, request: &Request) -> Result<Arc<WsConnection>, RequestError> {
        let reachable = |node: &NetworkingNodeId| {
            self.registry
                .get(node)
                .filter(|c| c.connection_id() != from.id())
        };
        let candidate = request
            .destination()
            .and_then(reachable)
            .or_else(|| self.upstream.as_ref().and_then(reachable));

        candidate.ok_or_else(|| match request.destination() {
            Some(dest) => RequestError::unknown_client(request.id.clone(), dest),
            None => RequestError::new(
                request.id.clone(),
                ResultCode::UnknownClient,
                format!("no route from {} for action {}", self.node_id, request.action),
            ),
        })
    }
}

/// Map the next hop's outcome back onto the originator's request id.
pub fn relayed_reply(original_id: RequestId, state: SendRequestState) -> Envelope {
    let code = state.result_code();
    match state.completion {
        Completion::Response(r) => Envelope::Response(Response::new(original_id, r.payload)),
        Completion::Error(mut e) => {
            e.id = original_id;
            Envelope::RequestError(e)
        }
        Completion::NotSent { reason, .. } => Envelope::RequestError(RequestError::new(original_id, code, reason)),
        other => Envelope::RequestError(RequestError::new(
            original_id,
            code,
            format!("relayed request ended: {}", other.label()),
        )),
    }
}

async fn reply(to: &dyn OcppConnection, env: Envelope) {
    if let Err(e) = send_envelope(to, &env).await {
        tracing::warn!(connection = %to.id(), request_id = %env.request_id(), error = %e, "could not answer peer");
    }
}
