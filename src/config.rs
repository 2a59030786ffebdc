//! Configuration for onlycat-gateway

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::GatewayError;
use crate::transport::TransportConfig;

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("onlycat-gateway")
        .join("config.toml")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Gateway base URL (http/https, mapped to ws/wss on connect)
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Socket.IO namespace to join
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Value of the `platform` header sent on connect
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Value of the `device` header sent on connect
    #[serde(default = "default_device")]
    pub device: String,

    /// Reconnect automatically when an established session is lost
    #[serde(default = "default_true")]
    pub reconnect: bool,

    /// Fixed delay between reconnection attempts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Maximum reconnection attempts per outage (0 = unlimited)
    #[serde(default)]
    pub max_reconnect_attempts: u32,

    /// Timeout for a correlated call, enforced by the transport
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Timeout for the connect handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_gateway_url() -> String {
    "https://gateway.onlycat.com".to_string()
}

fn default_namespace() -> String {
    "/".to_string()
}

fn default_platform() -> String {
    "home-assistant".to_string()
}

fn default_device() -> String {
    "onlycat-hass".to_string()
}

fn default_true() -> bool {
    true
}

fn default_reconnect_delay() -> u64 {
    10
}

fn default_call_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            namespace: default_namespace(),
            platform: default_platform(),
            device: default_device(),
            reconnect: true,
            reconnect_delay_secs: 10,
            max_reconnect_attempts: 0,
            call_timeout_secs: 60,
            connect_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        toml::from_str(&content).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), GatewayError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| GatewayError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content).map_err(|e| {
            GatewayError::Config(format!("Failed to write {}: {}", path.as_ref().display(), e))
        })
    }

    /// Headers identifying this integration to the gateway.
    pub fn identity_headers(&self) -> Vec<(String, String)> {
        vec![
            ("platform".to_string(), self.platform.clone()),
            ("device".to_string(), self.device.clone()),
        ]
    }

    /// Settings for the bundled Socket.IO transport.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            reconnect: self.reconnect,
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            max_reconnect_attempts: self.max_reconnect_attempts,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}
