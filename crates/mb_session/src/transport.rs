//! Transport abstraction for the real-time hub.
//!
//! The hub is an external collaborator: a connect/send/subscribe channel
//! identified by a URL that dispatches named events and accepts
//! invoke-style calls. Production would bind this trait to a WebSocket hub
//! client; tests and the demo binary use [`crate::loopback::LoopbackHub`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use mb_proto::{HubEvent, HubInvocation};

use crate::error::TransportError;

/// Inbound events in the order the hub delivered them.
pub type EventReceiver = mpsc::UnboundedReceiver<HubEvent>;

#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Hub URL, for logging.
    fn endpoint(&self) -> &str;

    /// Perform the handshake and return the inbound event stream.
    ///
    /// Calling `start` again after `stop` opens a fresh stream.
    async fn start(&self) -> Result<EventReceiver, TransportError>;

    /// Tear down the connection. The event stream ends.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Dispatch a call. Resolves once the hub accepted it, not once it was
    /// delivered to anyone.
    async fn invoke(&self, call: HubInvocation) -> Result<(), TransportError>;
}
