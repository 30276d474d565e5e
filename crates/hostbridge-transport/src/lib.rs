//! Port selection and persisted port assignment.
//!
//! The control channel listens on a TCP port chosen at startup:
//! - the preferred port is read from a small shared JSON config file
//! - if it is occupied, the next free port above it is used
//! - the chosen port is written back so the next run prefers it
//!
//! This is the lowest layer of hostbridge. The control-channel listener in
//! `hostbridge-peer` builds on the [`BoundPort`] returned here.

pub mod assignment;
pub mod error;
pub mod port;
pub mod store;

pub use assignment::PortAssignment;
pub use error::{Result, TransportError};
pub use port::{bind_with_fallback, bind_with_fallback_limit, BoundPort, DEFAULT_MAX_PROBES};
pub use store::{SharedConfig, DEFAULT_CONFIG_NAME, DEFAULT_PORT, PORT_KEY};
