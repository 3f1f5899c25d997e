//! Node-wide forwarding pipeline: action registry plus observers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use ocpp_core::error::{OcppError, Result};
use ocpp_core::protocol::{NetworkingNodeId, Request, RequestError};

use super::action::{ActionPipeline, ActionSchema, ErasedAction, PipelineEnv};
use super::context::RequestContext;
use super::decision::{ForwardingDecision, ForwardingResult, RejectResponse};
use super::observer::{ForwardingObserver, ObserverList};

pub struct ForwardingPipeline {
    node_id: NetworkingNodeId,
    default_result: ForwardingResult,
    actions: DashMap<&'static str, Arc<dyn ErasedAction>>,
    observers: Arc<ObserverList>,
}

impl ForwardingPipeline {
    pub fn new(node_id: NetworkingNodeId, default_result: ForwardingResult) -> Self {
        Self {
            node_id,
            default_result,
            actions: DashMap::new(),
            observers: Arc::new(ObserverList::new()),
        }
    }

    /// Install the pipeline for `A::ACTION`, replacing any earlier one.
    pub fn register<A: ActionSchema>(&self, pipeline: ActionPipeline<A>) {
        let filters = pipeline.filter_count();
        if self.actions.insert(A::ACTION, Arc::new(pipeline)).is_some() {
            tracing::warn!(action = A::ACTION, "replaced forwarding pipeline");
        } else {
            tracing::debug!(action = A::ACTION, filters, "registered forwarding pipeline");
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn ForwardingObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn observers(&self) -> &Arc<ObserverList> {
        &self.observers
    }

    pub fn registered_actions(&self) -> Vec<&'static str> {
        let mut v: Vec<&'static str> = self.actions.iter().map(|e| *e.key()).collect();
        v.sort_unstable();
        v
    }

    pub fn node_id(&self) -> &NetworkingNodeId {
        &self.node_id
    }

    pub fn default_result(&self) -> ForwardingResult {
        self.default_result
    }

    /// Decide FORWARD or REJECT for one inbound request.
    ///
    /// Returns `Err(Cancelled)` only when `cancel` fires while filters run.
    pub async fn process(
        &self,
        ctx: &RequestContext,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<ForwardingDecision> {
        if cancel.is_cancelled() {
            return Err(OcppError::Cancelled);
        }

        let env = PipelineEnv {
            node_id: &self.node_id,
            default_result: self.default_result,
            observers: &self.observers,
        };

        // clone out so no shard lock is held across the await
        let handler = self
            .actions
            .get(request.action.as_str())
            .map(|e| Arc::clone(e.value()));

        match handler {
            Some(h) => h.decide(&env, ctx, request, cancel).await,
            None => Ok(self.unknown_action(ctx, request)),
        }
    }

    /// No schema for this action: relay it opaquely or refuse it.
    fn unknown_action(&self, ctx: &RequestContext, request: Request) -> ForwardingDecision {
        self.observers.request_received(ctx, &request);

        let mut decision = match self.default_result {
            ForwardingResult::Forward => ForwardingDecision::forward(request, None),
            ForwardingResult::Reject => {
                tracing::debug!(request_id = %request.id, action = %request.action, node = %self.node_id, "no pipeline for action");
                let error = RequestError::not_implemented(request.id.clone(), &request.action);
                ForwardingDecision::reject(request, RejectResponse::Error(error))
            }
        };

        self.observers.request_filtered(ctx, &decision);

        if decision.is_forward() {
            let observers = Arc::clone(&self.observers);
            let hook_ctx = ctx.clone();
            decision.attach_sent_hook(Box::new(move |status| observers.request_sent(&hook_ctx, status)));
        }
        decision
    }
}
