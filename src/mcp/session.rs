//! Per-request session lifecycle
//!
//! Every POST to the MCP endpoint gets its own protocol server and
//! transport. A session moves through
//! `Created → Bound → InFlight → {Completed | Disconnected | Failed} → Released`
//! and is released exactly once: either explicitly after the exchange, or
//! from `Drop` when the request future is cancelled because the client went
//! away.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures::FutureExt;

use super::protocol::{McpHandler, McpResponse};
use super::transport::{StatelessTransport, TransportReply};
use crate::error::{GatewayError, Result};

/// Lifecycle state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Bound,
    InFlight,
    Completed,
    Disconnected,
    Failed,
    Released,
}

impl SessionState {
    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Bound)
                | (Bound, InFlight)
                | (InFlight, Completed)
                | (InFlight, Disconnected)
                | (InFlight, Failed)
                | (Created | Bound | Completed | Disconnected | Failed, Released)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Bound => "bound",
            SessionState::InFlight => "in-flight",
            SessionState::Completed => "completed",
            SessionState::Disconnected => "disconnected",
            SessionState::Failed => "failed",
            SessionState::Released => "released",
        };
        write!(f, "{}", s)
    }
}

/// Builds a fresh protocol server for each session
pub trait ServerFactory: Send + Sync {
    fn create_server(&self) -> Box<dyn McpHandler>;
}

/// Hook for observing session teardown
pub trait SessionObserver: Send + Sync {
    /// Called exactly once per session with the state it ended in
    fn on_release(&self, outcome: SessionState);
}

/// One stateless exchange: a server bound to a transport
pub struct Session {
    state: SessionState,
    transport: StatelessTransport,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl Session {
    /// Create the transport and bind a freshly built server to it
    pub fn open(
        server: Box<dyn McpHandler>,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Result<Self> {
        let mut session = Self {
            state: SessionState::Created,
            transport: StatelessTransport::new(),
            observer,
        };
        session.transport.connect(server)?;
        session.advance(SessionState::Bound);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the exchange, bounded by `timeout`; panics in the handler are
    /// caught and reported as failures
    pub async fn drive(&mut self, body: &[u8], timeout: Duration) -> Result<TransportReply> {
        self.advance(SessionState::InFlight);

        let exchange = AssertUnwindSafe(self.transport.handle_request(body)).catch_unwind();
        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(GatewayError::Internal(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(GatewayError::Timeout(timeout.as_secs())),
        };

        match &result {
            Ok(_) => self.advance(SessionState::Completed),
            Err(_) => self.advance(SessionState::Failed),
        }
        result
    }

    /// Tear down transport and server. Returns false if already released.
    pub fn release(&mut self) -> bool {
        if self.state == SessionState::Released {
            return false;
        }
        if self.state == SessionState::InFlight {
            self.advance(SessionState::Disconnected);
        }
        let outcome = self.state;
        self.transport.close();
        self.advance(SessionState::Released);
        if let Some(observer) = &self.observer {
            observer.on_release(outcome);
        }
        tracing::debug!(outcome = %outcome, "session released");
        true
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {} -> {}",
            self.state,
            next
        );
        tracing::trace!(from = %self.state, to = %next, "session transition");
        self.state = next;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::InFlight {
            tracing::info!("client disconnected mid-request; releasing session");
        }
        self.release();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one isolated session per incoming MCP payload
#[derive(Clone)]
pub struct SessionManager {
    factory: Arc<dyn ServerFactory>,
    timeout: Duration,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn ServerFactory>, timeout: Duration) -> Self {
        Self {
            factory,
            timeout,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Handle one payload end to end. Never fails: internal errors become
    /// the generic JSON-RPC internal error with HTTP 500.
    pub async fn handle(&self, body: &[u8]) -> TransportReply {
        let mut session = match Session::open(self.factory.create_server(), self.observer.clone())
        {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Error opening MCP session: {}", e);
                return internal_error_reply();
            }
        };

        let result = session.drive(body, self.timeout).await;
        session.release();

        match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Error handling MCP request: {}", e);
                internal_error_reply()
            }
        }
    }
}

/// `{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal server error"},"id":null}`
pub fn internal_error_reply() -> TransportReply {
    let body = serde_json::to_value(McpResponse::internal_error()).unwrap_or_default();
    TransportReply::json(StatusCode::INTERNAL_SERVER_ERROR, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::McpRequest;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Echo,
        Panic,
        Hang,
    }

    struct TestServer(Behaviour);

    #[async_trait]
    impl McpHandler for TestServer {
        async fn handle_request(&self, request: McpRequest) -> McpResponse {
            match self.0 {
                Behaviour::Echo => McpResponse::success(request.id, request.params),
                Behaviour::Panic => panic!("boom"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    McpResponse::success(request.id, json!(null))
                }
            }
        }
    }

    struct TestFactory(Behaviour);

    impl ServerFactory for TestFactory {
        fn create_server(&self) -> Box<dyn McpHandler> {
            Box::new(TestServer(self.0))
        }
    }

    #[derive(Default)]
    struct Recorder {
        releases: AtomicUsize,
        outcomes: Mutex<Vec<SessionState>>,
    }

    impl SessionObserver for Recorder {
        fn on_release(&self, outcome: SessionState) {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.outcomes.lock().unwrap().push(outcome);
        }
    }

    fn manager(behaviour: Behaviour, timeout: Duration) -> (SessionManager, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let manager = SessionManager::new(Arc::new(TestFactory(behaviour)), timeout)
            .with_observer(recorder.clone());
        (manager, recorder)
    }

    const PING: &[u8] = br#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{"x":1}}"#;

    #[tokio::test]
    async fn test_completed_session_released_once() {
        let (manager, recorder) = manager(Behaviour::Echo, Duration::from_secs(5));
        let reply = manager.handle(PING).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body.unwrap()["result"], json!({"x": 1}));
        assert_eq!(recorder.releases.load(Ordering::SeqCst), 1);
        assert_eq!(
            *recorder.outcomes.lock().unwrap(),
            vec![SessionState::Completed]
        );
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_internal_error() {
        let (manager, recorder) = manager(Behaviour::Panic, Duration::from_secs(5));
        let reply = manager.handle(PING).await;
        assert_eq!(reply, internal_error_reply());
        assert_eq!(recorder.releases.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.outcomes.lock().unwrap(), vec![SessionState::Failed]);
    }

    #[tokio::test]
    async fn test_timeout_reaches_released() {
        let (manager, recorder) = manager(Behaviour::Hang, Duration::from_millis(50));
        let reply = manager.handle(PING).await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*recorder.outcomes.lock().unwrap(), vec![SessionState::Failed]);
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_as_disconnected() {
        let (manager, recorder) = manager(Behaviour::Hang, Duration::from_secs(3600));
        let task = tokio::spawn(async move { manager.handle(PING).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(recorder.releases.load(Ordering::SeqCst), 1);
        assert_eq!(
            *recorder.outcomes.lock().unwrap(),
            vec![SessionState::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let recorder = Arc::new(Recorder::default());
        let mut session =
            Session::open(Box::new(TestServer(Behaviour::Echo)), Some(recorder.clone())).unwrap();
        assert_eq!(session.state(), SessionState::Bound);
        session.drive(PING, Duration::from_secs(5)).await.unwrap();
        assert!(session.release());
        assert!(!session.release());
        drop(session);
        assert_eq!(recorder.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;
        assert!(Created.can_transition_to(Bound));
        assert!(InFlight.can_transition_to(Disconnected));
        assert!(Failed.can_transition_to(Released));
        assert!(!Released.can_transition_to(Released));
        assert!(!Completed.can_transition_to(InFlight));
    }
}
