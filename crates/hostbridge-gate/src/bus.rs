use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GateError, Result};
use crate::transport::{HandlerId, IpcTransport, TransportEvent, TransportHandler};

type InvokeHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
type SendHandler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// Sender identity stamped on events emitted by the bus.
pub const HOST_SENDER: &str = "host";

struct Registration {
    id: HandlerId,
    handler: TransportHandler,
    once: bool,
}

#[derive(Default)]
struct BusState {
    invoke: HashMap<String, InvokeHandler>,
    send: HashMap<String, Vec<SendHandler>>,
    listeners: HashMap<String, Vec<Registration>>,
}

/// In-process privileged side of the gatekeeper.
///
/// The host registers invoke and send handlers and emits events; a
/// [`Gatekeeper`](crate::Gatekeeper) wrapping the bus is what the sandboxed
/// side gets to call.
#[derive(Default)]
pub struct LocalBus {
    state: Mutex<BusState>,
    next_id: AtomicU64,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the invoke handler for `channel`, replacing any previous one.
    pub fn handle<F, Fut>(&self, channel: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let channel = channel.into();
        let handler: InvokeHandler = Arc::new(move |args| handler(args).boxed());
        if self.lock().invoke.insert(channel.clone(), handler).is_some() {
            warn!(channel, "replaced existing invoke handler");
        }
    }

    /// Remove the invoke handler for `channel`.
    pub fn remove_handler(&self, channel: &str) -> bool {
        self.lock().invoke.remove(channel).is_some()
    }

    /// Add a handler for fire-and-forget calls on `channel`.
    pub fn on_send<F>(&self, channel: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.lock().send.entry(channel.into()).or_default().push(Arc::new(handler));
    }

    /// Deliver an event to every listener on `channel`.
    ///
    /// One-shot listeners are removed before delivery. Listeners run outside
    /// the bus lock, so they may register or remove listeners themselves.
    /// Returns the number of listeners called.
    pub fn emit(&self, channel: &str, args: Vec<Value>) -> usize {
        let handlers: Vec<TransportHandler> = {
            let mut state = self.lock();
            let Some(registrations) = state.listeners.get_mut(channel) else {
                debug!(channel, "emit with no listeners");
                return 0;
            };
            let handlers = registrations.iter().map(|r| Arc::clone(&r.handler)).collect();
            registrations.retain(|r| !r.once);
            if registrations.is_empty() {
                state.listeners.remove(channel);
            }
            handlers
        };

        let event = TransportEvent {
            channel: channel.to_string(),
            sender: Some(HOST_SENDER.to_string()),
            args,
        };
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Listener count on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.lock().listeners.get(channel).map_or(0, Vec::len)
    }

    fn register(&self, channel: &str, handler: TransportHandler, once: bool) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .listeners
            .entry(channel.to_string())
            .or_default()
            .push(Registration { id, handler, once });
        id
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IpcTransport for LocalBus {
    async fn invoke(&self, channel: &str, args: Vec<Value>) -> Result<Value> {
        let handler = self.lock().invoke.get(channel).cloned();
        match handler {
            Some(handler) => handler(args).await,
            None => Err(GateError::NoHandler(channel.to_string())),
        }
    }

    fn send(&self, channel: &str, args: Vec<Value>) -> Result<()> {
        let handlers = self.lock().send.get(channel).cloned().unwrap_or_default();
        if handlers.is_empty() {
            debug!(channel, "send with no handlers");
        }
        for handler in handlers {
            handler(args.clone());
        }
        Ok(())
    }

    fn on(&self, channel: &str, handler: TransportHandler) -> HandlerId {
        self.register(channel, handler, false)
    }

    fn once(&self, channel: &str, handler: TransportHandler) -> HandlerId {
        self.register(channel, handler, true)
    }

    fn remove_listener(&self, channel: &str, id: HandlerId) -> bool {
        let mut state = self.lock();
        let Some(registrations) = state.listeners.get_mut(channel) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            state.listeners.remove(channel);
        }
        removed
    }

    fn remove_all_listeners(&self, channel: &str) -> usize {
        self.lock().listeners.remove(channel).map_or(0, |r| r.len())
    }
}
