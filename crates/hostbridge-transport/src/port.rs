use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Default number of consecutive ports tried before giving up.
pub const DEFAULT_MAX_PROBES: u16 = 1024;

/// A listening TCP socket together with the port selection that produced it.
///
/// The socket stays bound for as long as this value lives, so the port
/// cannot be taken by another process between probing and accepting.
#[derive(Debug)]
pub struct BoundPort {
    listener: TcpListener,
    addr: SocketAddr,
    preferred: u16,
}

impl BoundPort {
    /// The port actually bound.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The full local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The port that was asked for.
    pub fn preferred(&self) -> u16 {
        self.preferred
    }

    /// True when the preferred port was occupied and another one was chosen.
    pub fn fell_back(&self) -> bool {
        self.preferred != 0 && self.addr.port() != self.preferred
    }

    /// Consume and return the bound listener.
    pub fn into_listener(self) -> TcpListener {
        self.listener
    }
}

/// Bind `host:preferred`, falling back to the next free port above it.
///
/// Preferred port `0` asks the OS for an ephemeral port.
pub fn bind_with_fallback(host: IpAddr, preferred: u16) -> Result<BoundPort> {
    bind_with_fallback_limit(host, preferred, DEFAULT_MAX_PROBES)
}

/// Like [`bind_with_fallback`] with an explicit probe budget.
///
/// Candidates are tried in ascending order starting at `preferred`, so the
/// choice is deterministic for a given set of occupied ports.
pub fn bind_with_fallback_limit(
    host: IpAddr,
    preferred: u16,
    max_probes: u16,
) -> Result<BoundPort> {
    if preferred == 0 {
        let addr = SocketAddr::new(host, 0);
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let addr = listener.local_addr()?;
        info!(%addr, "bound ephemeral control port");
        return Ok(BoundPort {
            listener,
            addr,
            preferred,
        });
    }

    let budget = max_probes.max(1);
    let last = preferred.saturating_add(budget - 1);

    for candidate in preferred..=last {
        let addr = SocketAddr::new(host, candidate);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                let addr = listener.local_addr()?;
                if candidate == preferred {
                    info!(%addr, "bound preferred control port");
                } else {
                    info!(%addr, preferred, "preferred port busy; bound fallback port");
                }
                return Ok(BoundPort {
                    listener,
                    addr,
                    preferred,
                });
            }
            Err(err) if is_occupied(&err) => {
                debug!(port = candidate, error = %err, "port unavailable");
                continue;
            }
            Err(source) => return Err(TransportError::Bind { addr, source }),
        }
    }

    Err(TransportError::PortsExhausted {
        host,
        first: preferred,
        last,
    })
}

fn is_occupied(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::AddrInUse | ErrorKind::PermissionDenied | ErrorKind::AddrNotAvailable
    )
}
