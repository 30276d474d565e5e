//! Allow-list gatekeeper between a sandboxed caller and a privileged
//! command surface.
//!
//! Three interaction modes are mediated: `invoke` (request/response),
//! `send` (fire-and-forget) and `on`/`once` (subscribe). Each has its own
//! table of exact channel names and name prefixes. Every name must also
//! match `^[a-zA-Z0-9._:-]+$`. A refused call never reaches the transport.

pub mod bus;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod presets;
pub mod registry;
pub mod transport;

pub use bus::LocalBus;
pub use config::RegistryConfig;
pub use error::{DenyReason, GateError, Result};
pub use gatekeeper::Gatekeeper;
pub use registry::{is_valid_channel_name, ChannelRegistry, ChannelRules, InteractionMode};
pub use transport::{HandlerId, IpcTransport, Listener, TransportEvent, TransportHandler};
