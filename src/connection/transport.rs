//! Transport seam between the connection manager and the wire.
//!
//! The manager is written against these traits; production uses the
//! WebSocket implementation in `ws.rs`, tests drive scripted sessions.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AppResult;

/// An opaque payload as received from the transport. String frames may or may
/// not be JSON; the connection manager decides.
#[derive(Debug, Clone)]
pub enum RawFrame {
    Text(String),
    Structured(Value),
}

/// Lifecycle and payload events emitted by an active session.
///
/// `Reconnecting`/`Reconnected` come from the transport's own (inner)
/// reconnect loop after a post-connect drop. `Closed` is terminal: the
/// session is dead and will produce no further events.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Frame(RawFrame),
    Reconnecting { attempt: u32 },
    Reconnected,
    Closed { reason: Option<String> },
}

/// Connection factory for a hub endpoint.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Establish a session. Failure here feeds the manager's outer retry
    /// loop; drops after success are the session's own business.
    async fn connect(&self) -> AppResult<Box<dyn HubSession>>;
}

/// One established hub session.
#[async_trait]
pub trait HubSession: Send + Sync {
    /// Event stream for this session. The channel closes when the session
    /// ends.
    fn events(&self) -> flume::Receiver<SessionEvent>;

    /// Invoke a hub method (fire-and-forget at the protocol level).
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> AppResult<()>;

    /// Close the session. Idempotent.
    async fn close(&self) -> AppResult<()>;
}
