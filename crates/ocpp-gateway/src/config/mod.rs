//! Node configuration.
//!
//! The YAML file is parsed with unknown keys refused and validated as a
//! whole before the node binds its listener.

pub mod schema;

use std::path::{Path, PathBuf};

use ocpp_core::error::{OcppError, Result};

pub use schema::{ForwardingSection, GatewayConfig, GatewaySection, NodeSection};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "OCPP_GATEWAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "ocpp-gateway.yaml";

pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read and validate the file at `path`. Errors name the file.
pub fn load(path: &Path) -> Result<GatewayConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| OcppError::Config(format!("{}: {e}", path.display())))?;
    parse(&text).map_err(|e| match e {
        OcppError::Config(msg) => OcppError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn parse(text: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(text).map_err(|e| {
        let at = e
            .location()
            .map(|l| format!(" (line {}, column {})", l.line(), l.column()))
            .unwrap_or_default();
        OcppError::Config(format!("invalid yaml{at}: {e}"))
    })?;
    cfg.validate()?;
    Ok(cfg)
}
