use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Handle to one listener registration on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

/// An event delivered by the privileged side.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub channel: String,
    /// Opaque identity of the emitter. Never forwarded to sandboxed listeners.
    pub sender: Option<String>,
    pub args: Vec<Value>,
}

/// Transport-level listener; sees the full event including the sender.
pub type TransportHandler = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// Sandbox-facing listener; sees only the event arguments.
pub type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// The privileged command surface the gatekeeper forwards to.
///
/// Implementations do no access control of their own.
#[async_trait]
pub trait IpcTransport: Send + Sync {
    /// Request/response call.
    async fn invoke(&self, channel: &str, args: Vec<Value>) -> Result<Value>;

    /// Fire-and-forget call.
    fn send(&self, channel: &str, args: Vec<Value>) -> Result<()>;

    /// Register a persistent listener.
    fn on(&self, channel: &str, handler: TransportHandler) -> HandlerId;

    /// Register a listener removed after its first delivery.
    fn once(&self, channel: &str, handler: TransportHandler) -> HandlerId;

    /// Remove one registration. Returns false if it was already gone.
    fn remove_listener(&self, channel: &str, id: HandlerId) -> bool;

    /// Remove every registration on a channel and return how many there were.
    fn remove_all_listeners(&self, channel: &str) -> usize;
}
