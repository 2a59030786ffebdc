//! Error types for onlycat-gateway

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Anything not otherwise classified.
    #[error("Client error: {0}")]
    Client(String),

    /// Transport or network failure, including handshake failures that are
    /// not credential rejections and in-flight call failures.
    #[error("Communication error: {0}")]
    Communication(String),

    /// The gateway explicitly rejected the supplied token.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Malformed frame or packet received from the gateway.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// True for failures the host should treat as "retry later".
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication(_) | Self::Protocol(_))
    }

    /// True when the host should re-prompt for credentials.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}
