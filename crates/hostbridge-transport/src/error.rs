use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Errors that can occur while selecting or persisting a port.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Every probed port was occupied.
    #[error("no free port on {host} in {first}..={last}")]
    PortsExhausted { host: IpAddr, first: u16, last: u16 },

    /// Failed to read the shared config file.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the shared config file.
    #[error("failed to write config {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The platform exposes no per-user config directory.
    #[error("no platform config directory available")]
    NoConfigDir,

    /// An I/O error occurred on a bound socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
