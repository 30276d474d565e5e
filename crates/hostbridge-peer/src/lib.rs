//! Process-to-process plumbing for hostbridge.
//!
//! - [`ControlServer`]: WebSocket control channel with persisted port
//!   selection, last-connected-wins peer tracking, and verb dispatch.
//! - [`ControlClient`]: the other end of that channel.
//! - [`WorkerProcess`]: a supervised child whose stdout is framed into
//!   messages and whose stdin takes `GSMCMD:` commands.

pub mod connector;
pub mod control;
pub mod error;
pub mod handler;
pub mod listener;
pub mod worker;

pub use connector::ControlClient;
pub use control::{
    AckPolicy, ControlCommand, ControlConfig, ON_CONNECT, OPEN_SETTINGS, PING, PONG, QUIT, QUIT_OBS,
    RESTART, START, START_OBS, STOP,
};
pub use error::{PeerError, Result};
pub use handler::{ChannelHandler, ControlEvent, ControlHandler};
pub use listener::ControlServer;
pub use worker::{
    ShutdownReport, WorkerConfig, WorkerProcess, CLEANUP_COMPLETE, DEFAULT_GRACE_PERIOD,
};
