use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hostbridge_frame::Message;
use hostbridge_transport::PortAssignment;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::control::{
    ControlCommand, ControlConfig, ON_CONNECT, OPEN_SETTINGS, PING, PONG, QUIT_OBS, START_OBS,
};
use crate::error::Result;
use crate::handler::ControlHandler;

/// Upper bound on the WebSocket upgrade after a TCP accept.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The addressable peer. Replaced wholesale when a newer connection arrives.
struct PeerSlot {
    id: u64,
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<String>,
}

struct Shared {
    config: ControlConfig,
    handler: Arc<dyn ControlHandler>,
    local_addr: SocketAddr,
    current: Mutex<Option<PeerSlot>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn lock_current(&self) -> MutexGuard<'_, Option<PeerSlot>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// WebSocket control-channel server with single-peer session semantics.
///
/// The most recently connected peer is the only one outbound messages go
/// to. Older connections stay open and are still served, but are no longer
/// addressable. Cloning yields another handle to the same server, which
/// runs until [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct ControlServer {
    shared: Arc<Shared>,
}

impl ControlServer {
    /// Bind (with port fallback), persist the chosen port, and start
    /// accepting.
    ///
    /// Bind failure is returned to the caller. Must be called inside a Tokio
    /// runtime.
    pub async fn start(config: ControlConfig, handler: Arc<dyn ControlHandler>) -> Result<Self> {
        let assignment = PortAssignment::new(config.store.clone())
            .with_host(config.host)
            .with_key(config.port_key.clone())
            .with_max_probes(config.max_probes);
        let bound = assignment.acquire_preferring(config.port)?;
        let preferred = bound.preferred();

        let std_listener = bound.into_listener();
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            config,
            handler,
            local_addr,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            accept_task: Mutex::new(None),
        });

        let task = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
        *shared.accept_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        info!(%local_addr, preferred, "control server listening");
        Ok(Self { shared })
    }

    /// The port actually bound.
    pub fn port(&self) -> u16 {
        self.shared.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// Address of the current peer, if one is connected.
    pub fn current_peer(&self) -> Option<SocketAddr> {
        self.shared.lock_current().as_ref().map(|slot| slot.addr)
    }

    /// Queue `message` for the current peer.
    ///
    /// With no peer the message is logged and dropped. Never blocks. Returns
    /// whether the message was handed to a live connection.
    pub fn send_message(&self, message: &Message) -> bool {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    function = %message.function,
                    error = %err,
                    "failed to encode control message"
                );
                return false;
            }
        };

        let current = self.shared.lock_current();
        let Some(slot) = current.as_ref() else {
            warn!(function = %message.function, "no control peer connected; dropping message");
            return false;
        };
        if slot.tx.send(text).is_err() {
            warn!(
                function = %message.function,
                peer = %slot.addr,
                "control peer is closing; dropping message"
            );
            return false;
        }
        trace!(function = %message.function, peer = %slot.addr, "queued control message");
        true
    }

    /// Ask the worker to stop OBS.
    pub fn send_quit_obs(&self) -> bool {
        self.send_message(&Message::new(QUIT_OBS))
    }

    /// Ask the worker to start OBS.
    pub fn send_start_obs(&self) -> bool {
        self.send_message(&Message::new(START_OBS))
    }

    /// Ask the worker to open its settings.
    pub fn send_open_settings(&self) -> bool {
        self.send_message(&Message::new(OPEN_SETTINGS))
    }

    /// Stop accepting, close every live connection, and clear the current
    /// peer. Waits for connection tasks to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let task = self
            .shared
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "control accept task failed");
            }
        }
        self.shared.lock_current().take();
        info!(addr = %self.shared.local_addr, "control server stopped");
    }

    /// True once [`shutdown`](Self::shutdown) has been requested.
    pub fn is_shut_down(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    connections.spawn(serve_connection(stream, addr, Arc::clone(&shared)));
                }
                Err(err) => warn!(error = %err, "control accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
    debug!("control accept loop stopped");
}

async fn serve_connection(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared>) {
    let handshake = tokio::select! {
        _ = shared.cancel.cancelled() => {
            debug!(peer = %addr, "shutdown during control handshake");
            return;
        }
        handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, accept_async(stream)) => handshake,
    };
    let ws = match handshake {
        Ok(Ok(ws)) => ws,
        Ok(Err(err)) => {
            warn!(peer = %addr, error = %err, "control handshake failed");
            return;
        }
        Err(_) => {
            warn!(peer = %addr, timeout = ?HANDSHAKE_TIMEOUT, "control handshake timed out");
            return;
        }
    };
    let (mut sink, mut frames) = ws.split();

    let (tx, mut outbound) = mpsc::unbounded_channel::<String>();
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let previous = shared.lock_current().replace(PeerSlot { id, addr, tx });
    match previous {
        Some(previous) => info!(
            peer = %addr,
            previous = %previous.addr,
            "control peer connected; superseding previous"
        ),
        None => info!(peer = %addr, "control peer connected"),
    }
    shared.handler.on_connect(addr);

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
            Some(text) = outbound.recv() => {
                if let Err(err) = sink.send(WsMessage::Text(text.into())).await {
                    debug!(peer = %addr, error = %err, "control send failed");
                    break;
                }
            }
            frame = frames.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(reply) = handle_text(&shared, addr, text.as_str()).await {
                        if let Err(err) = sink.send(WsMessage::Text(reply.into())).await {
                            debug!(peer = %addr, error = %err, "control reply failed");
                            break;
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = sink.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!(peer = %addr, error = %err, "control socket error");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    {
        let mut current = shared.lock_current();
        if current.as_ref().is_some_and(|slot| slot.id == id) {
            *current = None;
        }
    }
    info!(peer = %addr, "control peer disconnected");
    shared.handler.on_disconnect(addr);
}

/// Dispatch one inbound text frame and build the reply, if any.
async fn handle_text(shared: &Shared, addr: SocketAddr, text: &str) -> Option<String> {
    if shared.config.keepalive && text == PING {
        trace!(peer = %addr, "keepalive");
        return Some(PONG.to_string());
    }

    let message = match Message::from_json(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(peer = %addr, error = %err, "dropping malformed control message");
            return None;
        }
    };

    match ControlCommand::from_function(&message.function) {
        Some(command) => {
            info!(peer = %addr, %command, "control command");
            shared.handler.on_command(command, &message).await;
        }
        None if message.function == ON_CONNECT => {
            info!(peer = %addr, "control peer announced itself")
        }
        None => shared.handler.on_unhandled(&message).await,
    }

    let ack = shared.config.ack.ack_for(&message)?;
    match ack.to_json() {
        Ok(text) => Some(text),
        Err(err) => {
            warn!(error = %err, "failed to encode acknowledgment");
            None
        }
    }
}
