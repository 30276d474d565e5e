use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Result;
use crate::registry::{ChannelRegistry, InteractionMode};
use crate::transport::{HandlerId, IpcTransport, Listener, TransportEvent, TransportHandler};

/// `(channel, listener identity)`.
type ListenerKey = (String, usize);

/// Mediates a sandboxed caller's access to a privileged transport.
///
/// Every entry point checks the channel shape and the mode's allow-list
/// before anything reaches the transport. Allowed calls are forwarded
/// unchanged.
///
/// Listener identity is the `Arc` allocation of the [`Listener`]: pass the
/// same `Arc` (or a clone of it) to [`remove_listener`](Self::remove_listener)
/// to remove exactly the registration it created.
pub struct Gatekeeper<T: ?Sized> {
    transport: Arc<T>,
    registry: Arc<ChannelRegistry>,
    listeners: Mutex<HashMap<ListenerKey, Vec<HandlerId>>>,
}

impl<T: IpcTransport + ?Sized> Gatekeeper<T> {
    pub fn new(transport: Arc<T>, registry: impl Into<Arc<ChannelRegistry>>) -> Self {
        Self {
            transport,
            registry: registry.into(),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Forward a request/response call. No timeout is applied.
    pub async fn invoke(&self, channel: &str, args: Vec<Value>) -> Result<Value> {
        self.registry.check(InteractionMode::Invoke, channel)?;
        trace!(channel, "invoke");
        self.transport.invoke(channel, args).await
    }

    /// Forward a fire-and-forget call.
    pub fn send(&self, channel: &str, args: Vec<Value>) -> Result<()> {
        self.registry.check(InteractionMode::Send, channel)?;
        trace!(channel, "send");
        self.transport.send(channel, args)
    }

    /// Subscribe `listener` to `channel`.
    ///
    /// A refused channel registers nothing on the transport. The returned id
    /// can be passed to [`unsubscribe`](Self::unsubscribe) instead of keeping
    /// the listener around for [`remove_listener`](Self::remove_listener).
    pub fn on(&self, channel: &str, listener: &Listener) -> Result<HandlerId> {
        self.registry.check(InteractionMode::On, channel)?;
        let id = self.transport.on(channel, wrap(listener));
        self.lock_listeners()
            .entry((channel.to_string(), identity(listener)))
            .or_default()
            .push(id);
        debug!(channel, ?id, "listener registered");
        Ok(id)
    }

    /// Subscribe for a single delivery.
    ///
    /// One-shot registrations are not tracked by listener identity; they go
    /// away after delivery or through
    /// [`remove_all_listeners`](Self::remove_all_listeners).
    pub fn once(&self, channel: &str, listener: &Listener) -> Result<()> {
        self.registry.check(InteractionMode::On, channel)?;
        let id = self.transport.once(channel, wrap(listener));
        debug!(channel, ?id, "one-shot listener registered");
        Ok(())
    }

    /// Remove the most recent registration `listener` made on `channel`.
    ///
    /// Requires the channel to pass the subscribe allow-list. Returns false
    /// if the listener has no tracked registration there.
    pub fn remove_listener(&self, channel: &str, listener: &Listener) -> Result<bool> {
        self.registry.check(InteractionMode::On, channel)?;
        let key = (channel.to_string(), identity(listener));
        let id = {
            let mut listeners = self.lock_listeners();
            let Some(ids) = listeners.get_mut(&key) else {
                return Ok(false);
            };
            let id = ids.pop();
            if ids.is_empty() {
                listeners.remove(&key);
            }
            id
        };

        Ok(match id {
            Some(id) => {
                debug!(channel, ?id, "listener removed");
                self.transport.remove_listener(channel, id)
            }
            None => false,
        })
    }

    /// Remove the registration `on` returned as `id`.
    ///
    /// Returns false if `id` is not a tracked registration on `channel`.
    pub fn unsubscribe(&self, channel: &str, id: HandlerId) -> Result<bool> {
        self.registry.check(InteractionMode::On, channel)?;
        let tracked = {
            let mut listeners = self.lock_listeners();
            let mut found = false;
            listeners.retain(|(name, _), ids| {
                if !found && name == channel {
                    if let Some(pos) = ids.iter().position(|tracked| *tracked == id) {
                        ids.remove(pos);
                        found = true;
                    }
                }
                !ids.is_empty()
            });
            found
        };

        if !tracked {
            return Ok(false);
        }
        debug!(channel, ?id, "listener unsubscribed");
        Ok(self.transport.remove_listener(channel, id))
    }

    /// Remove every listener on `channel`, tracked or not.
    ///
    /// Requires the channel to pass the subscribe allow-list.
    pub fn remove_all_listeners(&self, channel: &str) -> Result<usize> {
        self.registry.check(InteractionMode::On, channel)?;
        self.lock_listeners().retain(|(name, _), _| name != channel);
        let removed = self.transport.remove_all_listeners(channel);
        debug!(channel, removed, "all listeners removed");
        Ok(removed)
    }

    /// Number of tracked registrations (one-shots excluded).
    pub fn tracked_listeners(&self) -> usize {
        self.lock_listeners().values().map(Vec::len).sum()
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, HashMap<ListenerKey, Vec<HandlerId>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn identity(listener: &Listener) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

/// Strip the transport event down to its arguments.
fn wrap(listener: &Listener) -> TransportHandler {
    let listener = Arc::clone(listener);
    Arc::new(move |event: &TransportEvent| listener(&event.args))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::GateError;
    use crate::registry::ChannelRules;

    /// Records every call that reaches it.
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(&'static str, String)>>,
        handlers: Mutex<HashMap<HandlerId, (String, TransportHandler)>>,
        next_id: AtomicU64,
    }

    impl RecordingTransport {
        fn record(&self, op: &'static str, channel: &str) {
            self.calls.lock().unwrap().push((op, channel.to_string()));
        }

        fn calls(&self) -> Vec<(&'static str, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn emit(&self, channel: &str, args: Vec<Value>) {
            let event = TransportEvent {
                channel: channel.to_string(),
                sender: Some("main".into()),
                args,
            };
            let handlers: Vec<TransportHandler> = self
                .handlers
                .lock()
                .unwrap()
                .values()
                .filter(|(name, _)| name == channel)
                .map(|(_, handler)| Arc::clone(handler))
                .collect();
            for handler in handlers {
                handler(&event);
            }
        }

        fn register(
            &self,
            op: &'static str,
            channel: &str,
            handler: TransportHandler,
        ) -> HandlerId {
            self.record(op, channel);
            let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
            self.handlers
                .lock()
                .unwrap()
                .insert(id, (channel.to_string(), handler));
            id
        }
    }

    #[async_trait]
    impl IpcTransport for RecordingTransport {
        async fn invoke(&self, channel: &str, args: Vec<Value>) -> Result<Value> {
            self.record("invoke", channel);
            Ok(json!({ "echo": args }))
        }

        fn send(&self, channel: &str, _args: Vec<Value>) -> Result<()> {
            self.record("send", channel);
            Ok(())
        }

        fn on(&self, channel: &str, handler: TransportHandler) -> HandlerId {
            self.register("on", channel, handler)
        }

        fn once(&self, channel: &str, handler: TransportHandler) -> HandlerId {
            self.register("once", channel, handler)
        }

        fn remove_listener(&self, channel: &str, id: HandlerId) -> bool {
            self.record("remove_listener", channel);
            self.handlers.lock().unwrap().remove(&id).is_some()
        }

        fn remove_all_listeners(&self, channel: &str) -> usize {
            self.record("remove_all_listeners", channel);
            let mut handlers = self.handlers.lock().unwrap();
            let before = handlers.len();
            handlers.retain(|_, (name, _)| name != channel);
            before - handlers.len()
        }
    }

    fn registry() -> ChannelRegistry {
        ChannelRegistry {
            invoke: ChannelRules::new(["get-platform"], ["settings."]),
            send: ChannelRules::new(["hide"], Vec::<String>::new()),
            on: ChannelRules::new(["notification"], ["gsm-"]),
        }
    }

    fn counting_listener(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = Arc::clone(counter);
        Arc::new(move |_args: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn invoke_allowed_by_prefix_is_forwarded() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());

        let reply = gate.invoke("settings.save", vec![json!({"a": 1})]).await.unwrap();

        assert_eq!(reply, json!({"echo": [{"a": 1}]}));
        assert_eq!(transport.calls(), vec![("invoke", "settings.save".to_string())]);
    }

    #[tokio::test]
    async fn names_with_spaces_are_rejected_for_every_mode() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());
        let listener: Listener = Arc::new(|_: &[Value]| {});

        assert!(gate.invoke("settings. save", vec![]).await.unwrap_err().is_access_violation());
        assert!(gate.send("hide now", vec![]).unwrap_err().is_access_violation());
        assert!(gate.on("gsm- x", &listener).unwrap_err().is_access_violation());
        assert!(gate.once("gsm- x", &listener).unwrap_err().is_access_violation());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn blocked_subscription_never_reaches_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());
        let listener: Listener = Arc::new(|_: &[Value]| {});

        let err = gate.on("app-close", &listener).unwrap_err();

        assert!(matches!(err, GateError::AccessDenied { mode: InteractionMode::On, .. }));
        assert!(transport.calls().is_empty());
        assert_eq!(gate.tracked_listeners(), 0);
    }

    #[test]
    fn send_denial_is_synchronous_and_names_channel() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());

        let err = gate.send("get-platform", vec![]).unwrap_err();
        assert!(err.to_string().contains("get-platform"));
        assert!(err.to_string().contains("send"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn removing_one_listener_keeps_the_others() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());
        let first_hits = Arc::new(AtomicUsize::new(0));
        let second_hits = Arc::new(AtomicUsize::new(0));
        let first = counting_listener(&first_hits);
        let second = counting_listener(&second_hits);

        gate.on("notification", &first).unwrap();
        gate.on("notification", &second).unwrap();
        assert!(gate.remove_listener("notification", &first).unwrap());

        transport.emit("notification", vec![json!("hello")]);

        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
        assert!(!gate.remove_listener("notification", &first).unwrap());
    }

    #[test]
    fn listener_receives_args_without_sender() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Listener =
            Arc::new(move |args: &[Value]| sink.lock().unwrap().extend_from_slice(args));

        gate.on("gsm-status", &listener).unwrap();
        transport.emit("gsm-status", vec![json!(1), json!("two")]);

        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!("two")]);
    }

    #[test]
    fn same_listener_twice_needs_two_removals() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());
        let hits = Arc::new(AtomicUsize::new(0));
        let listener = counting_listener(&hits);

        gate.on("notification", &listener).unwrap();
        gate.on("notification", &listener).unwrap();
        assert!(gate.remove_listener("notification", &listener).unwrap());
        transport.emit("notification", vec![]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(gate.remove_listener("notification", &listener).unwrap());
        assert_eq!(gate.tracked_listeners(), 0);
    }

    #[test]
    fn remove_all_requires_subscribe_permission() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());

        assert!(gate.remove_all_listeners("hide").unwrap_err().is_access_violation());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn remove_all_clears_tracked_and_one_shot_listeners() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());
        let listener: Listener = Arc::new(|_: &[Value]| {});

        gate.on("notification", &listener).unwrap();
        gate.once("notification", &listener).unwrap();
        gate.on("gsm-x", &listener).unwrap();

        assert_eq!(gate.remove_all_listeners("notification").unwrap(), 2);
        assert_eq!(gate.tracked_listeners(), 1);
        assert!(!gate.remove_listener("notification", &listener).unwrap());
    }

    #[test]
    fn remove_listener_checks_the_channel_first() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());
        let listener: Listener = Arc::new(|_: &[Value]| {});

        let err = gate.remove_listener("bad name", &listener).unwrap_err();
        assert!(err.is_access_violation());
        let err = gate.remove_listener("app-close", &listener).unwrap_err();
        assert!(matches!(err, GateError::AccessDenied { mode: InteractionMode::On, .. }));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn unsubscribe_by_returned_id() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(Arc::clone(&transport), registry());
        let hits = Arc::new(AtomicUsize::new(0));
        let listener = counting_listener(&hits);

        let first = gate.on("notification", &listener).unwrap();
        let second = gate.on("notification", &listener).unwrap();
        assert_ne!(first, second);

        assert!(gate.unsubscribe("notification", first).unwrap());
        assert!(!gate.unsubscribe("notification", first).unwrap());
        assert!(!gate.unsubscribe("gsm-status", second).unwrap());
        assert!(gate.unsubscribe("bad name", second).unwrap_err().is_access_violation());

        transport.emit("notification", vec![]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(gate.tracked_listeners(), 1);
    }

    #[tokio::test]
    async fn works_through_a_trait_object() {
        let transport: Arc<dyn IpcTransport> = Arc::new(RecordingTransport::default());
        let gate = Gatekeeper::new(transport, registry());
        assert!(gate.invoke("get-platform", vec![]).await.is_ok());
    }
}
