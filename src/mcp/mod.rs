//! MCP (Model Context Protocol) server implementation
//!
//! JSON-RPC over stateless streamable HTTP: one server and transport per request.

pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use protocol::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, ToolCallResult, ToolContent,
};
pub use server::{MorphikServer, MorphikServerFactory};
pub use session::{ServerFactory, Session, SessionManager, SessionObserver, SessionState};
pub use tools::{get_tool_definitions, TOOL_DEFINITIONS};
pub use transport::{StatelessTransport, TransportReply};
