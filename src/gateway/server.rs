//! HTTP listener for the MCP gateway

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::Result;
use crate::mcp::protocol::{codes, McpResponse};
use crate::mcp::{MorphikServerFactory, SessionManager, TransportReply};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct GatewayState {
    config: Arc<Config>,
    sessions: SessionManager,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, sessions: SessionManager) -> Self {
        Self { config, sessions }
    }

    /// State wired to the real Morphik server factory
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let factory = MorphikServerFactory::new(config.clone())?;
        let sessions = SessionManager::new(Arc::new(factory), config.session_timeout);
        Ok(Self::new(config, sessions))
    }
}

/// MCP gateway HTTP server
pub struct GatewayServer {
    state: GatewayState,
    addr: SocketAddr,
}

impl GatewayServer {
    /// Create a server listening on all interfaces at `port`
    pub fn new(state: GatewayState, port: u16) -> Self {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        Self { state, addr }
    }

    /// Build the router
    pub fn router(state: GatewayState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route(
                "/mcp",
                get(method_not_allowed)
                    .post(mcp_handler)
                    .delete(method_not_allowed),
            )
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the listening socket
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.addr).await
    }

    /// Serve until `shutdown` resolves, then wait for in-flight requests
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Self::router(self.state);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Bind and serve until SIGINT/SIGTERM
    pub async fn start(self) -> std::io::Result<()> {
        let listener = self.bind().await?;
        tracing::info!("Morphik MCP gateway listening on {}", listener.local_addr()?);
        self.serve(listener, shutdown_signal()).await?;
        tracing::info!("Server shut down successfully");
        Ok(())
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutting down server...");
}

impl IntoResponse for TransportReply {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// Health check endpoint
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "apiBase": state.config.api_base,
        "hasAuthToken": state.config.has_auth_token(),
        "allowedDirectories": state.config.allowed_directories.len(),
    }))
}

/// One stateless MCP exchange
async fn mcp_handler(State(state): State<GatewayState>, body: Bytes) -> Response {
    state.sessions.handle(&body).await.into_response()
}

/// GET and DELETE have no meaning without sessions
async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(McpResponse::error(
            None,
            codes::SERVER_ERROR,
            "Method not allowed.".to_string(),
        )),
    )
}
