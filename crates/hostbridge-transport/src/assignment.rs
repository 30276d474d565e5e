use std::net::{IpAddr, Ipv4Addr};

use tracing::info;

use crate::error::Result;
use crate::port::{bind_with_fallback_limit, BoundPort, DEFAULT_MAX_PROBES};
use crate::store::{SharedConfig, PORT_KEY};

/// Persisted port selection: read preference, bind with fallback, write back.
#[derive(Debug, Clone)]
pub struct PortAssignment {
    host: IpAddr,
    store: SharedConfig,
    key: String,
    max_probes: u16,
}

impl PortAssignment {
    /// Loopback host, `port` key, default probe budget.
    pub fn new(store: SharedConfig) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            store,
            key: PORT_KEY.to_string(),
            max_probes: DEFAULT_MAX_PROBES,
        }
    }

    /// Override the bind host.
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Override the config key the port is stored under.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Override how many consecutive ports are probed.
    pub fn with_max_probes(mut self, max_probes: u16) -> Self {
        self.max_probes = max_probes;
        self
    }

    /// Backing store.
    pub fn store(&self) -> &SharedConfig {
        &self.store
    }

    /// Bind the preferred (or next free) port and persist the result.
    ///
    /// The port is written only after the bind succeeded.
    pub fn acquire(&self) -> Result<BoundPort> {
        self.acquire_preferring(None)
    }

    /// Same as [`acquire`](Self::acquire) but an explicit preference wins over
    /// the persisted one.
    pub fn acquire_preferring(&self, preferred: Option<u16>) -> Result<BoundPort> {
        let preferred = match preferred {
            Some(port) => port,
            None => self.store.port_under(&self.key)?,
        };
        let bound = bind_with_fallback_limit(self.host, preferred, self.max_probes)?;
        self.store.store_port(&self.key, bound.port())?;
        info!(
            port = bound.port(),
            preferred,
            path = ?self.store.path(),
            "persisted control port"
        );
        Ok(bound)
    }
}
