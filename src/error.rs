//! Error types for the Morphik gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Morphik API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session timed out after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the failure came from talking to the Morphik backend
    pub fn is_remote(&self) -> bool {
        matches!(self, GatewayError::Api { .. } | GatewayError::Http(_))
    }

    /// Get error code for MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::InvalidParams(_) => -32602,
            GatewayError::Api { .. } | GatewayError::Http(_) => -32001,
            GatewayError::AccessDenied(_) => -32003,
            GatewayError::Internal(_) | GatewayError::Timeout(_) => -32603,
            _ => -32000,
        }
    }
}
