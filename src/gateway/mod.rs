//! HTTP gateway exposing `/health` and the stateless `/mcp` endpoint

mod server;

pub use server::{shutdown_signal, GatewayServer, GatewayState, MAX_BODY_BYTES};
