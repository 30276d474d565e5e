use std::net::SocketAddr;

use async_trait::async_trait;
use hostbridge_frame::Message;
use tokio::sync::mpsc;
use tracing::debug;

use crate::control::ControlCommand;

/// Host-side callbacks for the control channel.
///
/// Calls for one connection are made in socket order; the next inbound frame
/// is not read until the previous callback returns.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    /// A known verb arrived.
    async fn on_command(&self, command: ControlCommand, message: &Message);

    /// A well-formed message with a verb outside [`ControlCommand`].
    async fn on_unhandled(&self, message: &Message) {
        debug!(function = %message.function, "no dispatch for control verb");
    }

    fn on_connect(&self, _peer: SocketAddr) {}

    fn on_disconnect(&self, _peer: SocketAddr) {}
}

/// Everything a [`ChannelHandler`] forwards.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Connected(SocketAddr),
    Command { command: ControlCommand, message: Message },
    Unhandled(Message),
    Disconnected(SocketAddr),
}

/// Handler that forwards every callback into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl ChannelHandler {
    /// A handler and the receiving end of its event channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ControlEvent) {
        if self.tx.send(event).is_err() {
            debug!("control event receiver dropped");
        }
    }
}

#[async_trait]
impl ControlHandler for ChannelHandler {
    async fn on_command(&self, command: ControlCommand, message: &Message) {
        self.forward(ControlEvent::Command {
            command,
            message: message.clone(),
        });
    }

    async fn on_unhandled(&self, message: &Message) {
        self.forward(ControlEvent::Unhandled(message.clone()));
    }

    fn on_connect(&self, peer: SocketAddr) {
        self.forward(ControlEvent::Connected(peer));
    }

    fn on_disconnect(&self, peer: SocketAddr) {
        self.forward(ControlEvent::Disconnected(peer));
    }
}
