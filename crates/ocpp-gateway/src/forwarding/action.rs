//! Per-action forwarding: schema plug-in, filters, and the typed pipeline.
//!
//! One generic `ActionPipeline<A>` serves every OCPP action; the action only
//! contributes its `ActionSchema` (parse / serialize / default rejection).

use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use ocpp_core::error::{OcppError, Result};
use ocpp_core::protocol::{NetworkingNodeId, Payload, Request, RequestError, Response};

use super::context::RequestContext;
use super::decision::{ForwardingDecision, ForwardingResult, RejectResponse, DEFAULT_REJECT_MESSAGE};
use super::observer::ObserverList;

/// Schema layer for one action, supplied from outside the core.
pub trait ActionSchema: Send + Sync + 'static {
    type Request: Clone + Send + Sync + 'static;
    type Response: Send + Sync + 'static;

    /// Action name as it appears on the wire.
    const ACTION: &'static str;

    fn parse_request(ctx: &RequestContext, payload: &Payload) -> Result<Self::Request>;

    fn serialize_request(request: &Self::Request) -> Result<Payload>;

    /// The action's "Rejected" status response.
    fn rejected_response(request: &Self::Request) -> Self::Response;

    fn serialize_response(response: &Self::Response) -> Result<Payload>;
}

/// A filter's opinion on one request.
pub enum FilterVerdict<A: ActionSchema> {
    Forward {
        rewritten: Option<A::Request>,
    },
    Reject {
        response: Option<A::Response>,
        log_message: Option<String>,
    },
}

impl<A: ActionSchema> FilterVerdict<A> {
    pub fn forward() -> Self {
        FilterVerdict::Forward { rewritten: None }
    }

    pub fn forward_rewritten(request: A::Request) -> Self {
        FilterVerdict::Forward {
            rewritten: Some(request),
        }
    }

    pub fn reject() -> Self {
        FilterVerdict::Reject {
            response: None,
            log_message: None,
        }
    }

    pub fn reject_because(log_message: impl Into<String>) -> Self {
        FilterVerdict::Reject {
            response: None,
            log_message: Some(log_message.into()),
        }
    }

    pub fn reject_with(response: A::Response, log_message: impl Into<String>) -> Self {
        FilterVerdict::Reject {
            response: Some(response),
            log_message: Some(log_message.into()),
        }
    }
}

/// Caller-supplied decision hook. `Ok(None)` means "no opinion".
#[async_trait]
pub trait ForwardingFilter<A: ActionSchema>: Send + Sync {
    async fn filter(&self, ctx: &RequestContext, request: &A::Request) -> Result<Option<FilterVerdict<A>>>;
}

/// Adapter for synchronous closures.
pub struct FnFilter<A, F> {
    f: F,
    _action: PhantomData<fn() -> A>,
}

pub fn filter_fn<A, F>(f: F) -> Arc<dyn ForwardingFilter<A>>
where
    A: ActionSchema,
    F: Fn(&RequestContext, &A::Request) -> Option<FilterVerdict<A>> + Send + Sync + 'static,
{
    Arc::new(FnFilter {
        f,
        _action: PhantomData,
    })
}

#[async_trait]
impl<A, F> ForwardingFilter<A> for FnFilter<A, F>
where
    A: ActionSchema,
    F: Fn(&RequestContext, &A::Request) -> Option<FilterVerdict<A>> + Send + Sync + 'static,
{
    async fn filter(&self, ctx: &RequestContext, request: &A::Request) -> Result<Option<FilterVerdict<A>>> {
        Ok((self.f)(ctx, request))
    }
}

/// A filter or schema plug-in that returned an error or panicked.
#[derive(Debug, Error)]
enum PluginFailure {
    #[error("{stage} failed: {source}")]
    Failed {
        stage: &'static str,
        #[source]
        source: OcppError,
    },
    #[error("{stage} panicked: {message}")]
    Panicked { stage: &'static str, message: String },
}

/// Run a synchronous schema call with panics caught.
fn isolate<T>(stage: &'static str, f: impl FnOnce() -> Result<T>) -> std::result::Result<T, PluginFailure> {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(source)) => Err(PluginFailure::Failed { stage, source }),
        Err(panic) => Err(PluginFailure::Panicked {
            stage,
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Node-wide settings the per-action pipelines run under.
pub(crate) struct PipelineEnv<'a> {
    pub node_id: &'a NetworkingNodeId,
    pub default_result: ForwardingResult,
    pub observers: &'a Arc<ObserverList>,
}

/// Type-erased view so pipelines for different actions share one registry.
#[async_trait]
pub(crate) trait ErasedAction: Send + Sync {
    async fn decide(
        &self,
        env: &PipelineEnv<'_>,
        ctx: &RequestContext,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<ForwardingDecision>;
}

/// Filters for one action, consulted in registration order; the first
/// verdict wins.
pub struct ActionPipeline<A: ActionSchema> {
    filters: Vec<Arc<dyn ForwardingFilter<A>>>,
}

impl<A: ActionSchema> Default for ActionPipeline<A> {
    fn default() -> Self {
        Self { filters: Vec::new() }
    }
}

impl<A: ActionSchema> ActionPipeline<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Arc<dyn ForwardingFilter<A>>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    async fn run_filters(
        &self,
        ctx: &RequestContext,
        request: &A::Request,
    ) -> std::result::Result<Option<FilterVerdict<A>>, PluginFailure> {
        const STAGE: &str = "forwarding filter";
        for f in &self.filters {
            match AssertUnwindSafe(f.filter(ctx, request)).catch_unwind().await {
                Ok(Ok(Some(verdict))) => return Ok(Some(verdict)),
                Ok(Ok(None)) => continue,
                Ok(Err(source)) => return Err(PluginFailure::Failed { stage: STAGE, source }),
                Err(panic) => {
                    return Err(PluginFailure::Panicked {
                        stage: STAGE,
                        message: panic_message(panic.as_ref()),
                    })
                }
            }
        }
        Ok(None)
    }

    fn internal_error(ctx: &RequestContext, request: Request, err: &(dyn std::error::Error + 'static)) -> ForwardingDecision {
        let error = RequestError::internal_error(request.id.clone(), &ctx.source, &ctx.event_tracking_id, err);
        ForwardingDecision::reject(request, RejectResponse::Error(error))
    }

    /// Apply the node default when no filter spoke, then serialize.
    fn resolve(
        env: &PipelineEnv<'_>,
        ctx: &RequestContext,
        request: Request,
        typed: &A::Request,
        verdict: Option<FilterVerdict<A>>,
    ) -> ForwardingDecision {
        let verdict = verdict.unwrap_or_else(|| match env.default_result {
            ForwardingResult::Forward => FilterVerdict::forward(),
            ForwardingResult::Reject => FilterVerdict::reject(),
        });

        match verdict {
            FilterVerdict::Forward { rewritten: None } => ForwardingDecision::forward(request, None),
            FilterVerdict::Forward {
                rewritten: Some(rewritten),
            } => match isolate("request serializer", || A::serialize_request(&rewritten)) {
                Ok(payload) => {
                    let mut outgoing = request.clone();
                    outgoing.payload = payload;
                    ForwardingDecision::forward(request, Some(outgoing))
                }
                Err(e) => Self::internal_error(ctx, request, &e),
            },
            FilterVerdict::Reject {
                response,
                log_message,
            } => {
                let description = log_message.unwrap_or_else(|| DEFAULT_REJECT_MESSAGE.to_string());
                let payload = isolate("response serializer", || {
                    let response = match response {
                        Some(r) => r,
                        None => A::rejected_response(typed),
                    };
                    A::serialize_response(&response)
                });
                match payload {
                    Ok(payload) => {
                        let response = Response::new(request.id.clone(), payload);
                        ForwardingDecision::reject(request, RejectResponse::Filtered { response, description })
                    }
                    Err(e) => Self::internal_error(ctx, request, &e),
                }
            }
        }
    }
}

#[async_trait]
impl<A: ActionSchema> ErasedAction for ActionPipeline<A> {
    async fn decide(
        &self,
        env: &PipelineEnv<'_>,
        ctx: &RequestContext,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<ForwardingDecision> {
        let typed = match isolate("request parser", || A::parse_request(ctx, &request.payload)) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(request_id = %request.id, action = A::ACTION, error = %e, "request could not be parsed");
                let explanation = match e {
                    PluginFailure::Failed { source, .. } => source.to_string(),
                    panicked @ PluginFailure::Panicked { .. } => panicked.to_string(),
                };
                let error = RequestError::could_not_parse(
                    request.id.clone(),
                    request.payload.to_diagnostic_value(),
                    explanation,
                );
                let decision = ForwardingDecision::reject(request, RejectResponse::Error(error));
                env.observers.request_filtered(ctx, &decision);
                return Ok(decision);
            }
        };

        env.observers.request_received(ctx, &request);

        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OcppError::Cancelled),
            v = self.run_filters(ctx, &typed) => v,
        };

        let mut decision = match verdict {
            Ok(v) => Self::resolve(env, ctx, request, &typed, v),
            Err(failure) => {
                tracing::warn!(node = %env.node_id, request_id = %ctx.request_id, action = A::ACTION, error = %failure, "filter failure; rejecting");
                Self::internal_error(ctx, request, &failure)
            }
        };

        env.observers.request_filtered(ctx, &decision);

        if decision.is_forward() {
            let observers = Arc::clone(env.observers);
            let hook_ctx = ctx.clone();
            decision.attach_sent_hook(Box::new(move |status| observers.request_sent(&hook_ctx, status)));
        }

        Ok(decision)
    }
}
