//! Morphik MCP - stateless MCP-over-HTTP gateway
//!
//! Exposes the Morphik document ingestion and retrieval API, plus a small
//! set of sandboxed file tools, as Model Context Protocol tools.

pub mod client;
pub mod config;
pub mod error;
pub mod files;
pub mod gateway;
pub mod mcp;
pub mod types;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
