//! Stateless streamable-HTTP transport
//!
//! Translates one HTTP body into JSON-RPC messages, feeds them to the bound
//! handler and turns the replies into one HTTP reply. No session id is ever
//! issued, so nothing carries over between calls.

use axum::http::StatusCode;
use serde_json::Value;

use super::protocol::{codes, McpHandler, McpRequest, McpResponse, JSONRPC_VERSION};
use crate::error::{GatewayError, Result};

/// What the transport wants written to the HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportReply {
    pub status: StatusCode,
    /// `None` means an empty body
    pub body: Option<Value>,
}

impl TransportReply {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    /// Reply for a payload made only of notifications
    pub fn accepted() -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            body: None,
        }
    }
}

/// One JSON-RPC message from the body: parsed, or rejected with the id it carried
enum Incoming {
    Request(McpRequest),
    Invalid { id: Option<Value>, reason: String },
}

/// Transport for a single stateless exchange
#[derive(Default)]
pub struct StatelessTransport {
    server: Option<Box<dyn McpHandler>>,
    closed: bool,
}

impl StatelessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a protocol server to this transport
    pub fn connect(&mut self, server: Box<dyn McpHandler>) -> Result<()> {
        if self.closed {
            return Err(GatewayError::Internal("transport already closed".into()));
        }
        if self.server.is_some() {
            return Err(GatewayError::Internal("transport already connected".into()));
        }
        self.server = Some(server);
        Ok(())
    }

    /// Drive one request/response exchange
    pub async fn handle_request(&self, body: &[u8]) -> Result<TransportReply> {
        let server = self
            .server
            .as_deref()
            .ok_or_else(|| GatewayError::Internal("transport is not connected".into()))?;

        let payload: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("rejecting unparseable MCP payload: {}", e);
                return Ok(error_reply(
                    StatusCode::BAD_REQUEST,
                    codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        match payload {
            Value::Array(items) => {
                if items.is_empty() {
                    return Ok(error_reply(
                        StatusCode::BAD_REQUEST,
                        codes::INVALID_REQUEST,
                        "Invalid Request: empty batch".to_string(),
                    ));
                }
                let mut replies = Vec::new();
                for item in items {
                    if let Some(reply) = dispatch(server, classify(item)).await {
                        replies.push(serde_json::to_value(reply)?);
                    }
                }
                if replies.is_empty() {
                    Ok(TransportReply::accepted())
                } else {
                    Ok(TransportReply::json(StatusCode::OK, Value::Array(replies)))
                }
            }
            single => match dispatch(server, classify(single)).await {
                Some(reply) => Ok(TransportReply::json(
                    StatusCode::OK,
                    serde_json::to_value(reply)?,
                )),
                None => Ok(TransportReply::accepted()),
            },
        }
    }

    /// Release the bound server; later calls are no-ops
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(server) = self.server.take() {
            server.close();
        }
    }
}

fn classify(message: Value) -> Incoming {
    // An explicit null id is neither a request nor a notification
    if matches!(message.get("id"), Some(Value::Null)) {
        return Incoming::Invalid {
            id: None,
            reason: "id must not be null".to_string(),
        };
    }
    let id = message.get("id").cloned();
    if message.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Incoming::Invalid {
            id,
            reason: "jsonrpc must be \"2.0\"".to_string(),
        };
    }
    match serde_json::from_value::<McpRequest>(message) {
        Ok(request) => Incoming::Request(request),
        Err(e) => Incoming::Invalid {
            id,
            reason: e.to_string(),
        },
    }
}

async fn dispatch(server: &dyn McpHandler, incoming: Incoming) -> Option<McpResponse> {
    match incoming {
        Incoming::Request(request) => {
            let notification = request.is_notification();
            let method = request.method.clone();
            let reply = server.handle_request(request).await;
            if notification {
                tracing::debug!(method = %method, "notification handled");
                None
            } else {
                Some(reply)
            }
        }
        Incoming::Invalid { id, reason } => Some(McpResponse::error(
            id,
            codes::INVALID_REQUEST,
            format!("Invalid Request: {}", reason),
        )),
    }
}

fn error_reply(status: StatusCode, code: i64, message: String) -> TransportReply {
    let body = serde_json::to_value(McpResponse::error(None, code, message))
        .unwrap_or(Value::Null);
    TransportReply::json(status, body)
}
