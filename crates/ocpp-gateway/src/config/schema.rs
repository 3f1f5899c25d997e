use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use ocpp_core::error::{OcppError, Result};
use ocpp_core::protocol::NetworkingNodeId;

use crate::forwarding::ForwardingResult;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    pub node: NodeSection,

    #[serde(default)]
    pub forwarding: ForwardingSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(OcppError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.gateway.validate()?;
        self.node.validate()?;
        self.forwarding.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(OcppError::Config(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(OcppError::Config(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(OcppError::Config(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.max_frame_bytes < 64 {
            return Err(OcppError::Config(
                "gateway.max_frame_bytes must be at least 64".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| OcppError::Config(format!("gateway.listen is not a socket address: {e}")))
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_max_frame_bytes() -> usize {
    65536
}

/// Identity of this networking node.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    pub id: NetworkingNodeId,

    /// Next hop for requests whose destination is not directly connected.
    #[serde(default)]
    pub upstream: Option<NetworkingNodeId>,
}

impl NodeSection {
    pub fn validate(&self) -> Result<()> {
        if self.upstream.as_ref() == Some(&self.id) {
            return Err(OcppError::Config("node.upstream must differ from node.id".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardingSection {
    #[serde(default = "default_result")]
    pub default_result: ForwardingResult,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for ForwardingSection {
    fn default() -> Self {
        Self {
            default_result: default_result(),
            request_timeout_ms: default_request_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_pending: default_max_pending(),
        }
    }
}

impl ForwardingSection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=300000).contains(&self.request_timeout_ms) {
            return Err(OcppError::Config(
                "forwarding.request_timeout_ms must be between 1000 and 300000".into(),
            ));
        }
        if !(100..=60000).contains(&self.sweep_interval_ms) {
            return Err(OcppError::Config(
                "forwarding.sweep_interval_ms must be between 100 and 60000".into(),
            ));
        }
        if self.max_pending == 0 {
            return Err(OcppError::Config("forwarding.max_pending must not be 0".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_result() -> ForwardingResult {
    ForwardingResult::Reject
}
fn default_request_timeout_ms() -> u64 {
    30000
}
fn default_sweep_interval_ms() -> u64 {
    1000
}
fn default_max_pending() -> usize {
    4096
}
