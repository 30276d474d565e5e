use std::time::Duration;

/// Errors that can occur in control-channel and worker operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Port selection or persisted configuration failed.
    #[error("transport error: {0}")]
    Transport(#[from] hostbridge_transport::TransportError),

    /// Line framing or message parsing failed.
    #[error("frame error: {0}")]
    Frame(#[from] hostbridge_frame::FrameError),

    /// WebSocket protocol error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The remote side closed the connection.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// An operation did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, PeerError>;
