use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hostbridge_frame::Message;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::control::{PING, PONG};
use crate::error::{PeerError, Result};

/// Client end of the control channel.
pub struct ControlClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
}

impl ControlClient {
    /// Connect to `ws://<addr>`.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_url(&format!("ws://{addr}")).await
    }

    pub async fn connect_url(url: &str) -> Result<Self> {
        let (ws, _response) = connect_async(url).await?;
        debug!(url, "control client connected");
        Ok(Self {
            ws,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let text = message.to_json()?;
        self.send_text(&text).await
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.ws.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    /// Next text frame, or `None` once the server closes.
    pub async fn recv_text(&mut self) -> Result<Option<String>> {
        loop {
            match self.ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(err)) => return Err(err.into()),
            }
        }
    }

    /// Next message, or `None` once the server closes.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match self.recv_text().await? {
            Some(text) => Ok(Some(Message::from_json(&text)?)),
            None => Ok(None),
        }
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Message>> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| PeerError::Timeout(timeout))?
    }

    /// Round-trip a `PING` keepalive.
    pub async fn ping(&mut self, timeout: Duration) -> Result<()> {
        self.send_text(PING).await?;
        let reply = tokio::time::timeout(timeout, self.recv_text())
            .await
            .map_err(|_| PeerError::Timeout(timeout))??;
        match reply.as_deref() {
            Some(PONG) => Ok(()),
            Some(other) => Err(PeerError::Disconnected(format!("expected {PONG}, got {other}"))),
            None => Err(PeerError::Disconnected(self.url.clone())),
        }
    }

    /// Send a close frame and drain until the server confirms.
    pub async fn close(mut self) -> Result<()> {
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {}
            Err(err) => return Err(err.into()),
        }
        while let Some(frame) = self.ws.next().await {
            if frame.is_err() {
                break;
            }
        }
        Ok(())
    }
}
