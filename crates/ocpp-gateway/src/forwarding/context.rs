use std::sync::Arc;

use tokio::time::Instant;

use ocpp_core::protocol::{NetworkPath, NetworkingNodeId, Request, RequestId};

use crate::transport::ConnectionId;

/// Everything a parser or filter may want to know about an inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Connection the frame arrived on.
    pub connection: ConnectionId,
    /// Networking node at the other end of that connection.
    pub source: NetworkingNodeId,
    pub request_id: RequestId,
    pub action: Arc<str>,
    pub destination: Option<NetworkingNodeId>,
    pub network_path: NetworkPath,
    pub received_at: Instant,
    /// Correlates log lines about this request across components.
    pub event_tracking_id: Arc<str>,
}

impl RequestContext {
    pub fn for_request(
        connection: ConnectionId,
        source: NetworkingNodeId,
        request: &Request,
        event_tracking_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            connection,
            source,
            request_id: request.id.clone(),
            action: Arc::from(request.action.as_str()),
            destination: request.destination().cloned(),
            network_path: request.network_path().clone(),
            received_at: Instant::now(),
            event_tracking_id: event_tracking_id.into(),
        }
    }
}
