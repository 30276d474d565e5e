use std::net::{IpAddr, Ipv4Addr};

use hostbridge_frame::Message;
use hostbridge_transport::{SharedConfig, DEFAULT_MAX_PROBES, PORT_KEY};

/// Inbound verb: stop the host.
pub const QUIT: &str = "quit";
/// Inbound verb: start the host's managed work.
pub const START: &str = "start";
/// Inbound verb: stop the host's managed work.
pub const STOP: &str = "stop";
/// Inbound verb: restart the host's managed work.
pub const RESTART: &str = "restart";
/// Inbound announcement sent by a peer after it connects.
pub const ON_CONNECT: &str = "on_connect";

/// Outbound verb: ask the worker to stop OBS.
pub const QUIT_OBS: &str = "quit_obs";
/// Outbound verb: ask the worker to start OBS.
pub const START_OBS: &str = "start_obs";
/// Outbound verb: ask the worker to open its settings.
pub const OPEN_SETTINGS: &str = "open_settings";

/// Keepalive text frame sent by peers.
pub const PING: &str = "PING";
/// Keepalive reply.
pub const PONG: &str = "PONG";

/// The closed set of inbound commands the host dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    Quit,
    Start,
    Stop,
    Restart,
}

impl ControlCommand {
    /// Map a message verb to a command. Unknown verbs map to `None`.
    pub fn from_function(function: &str) -> Option<Self> {
        match function {
            QUIT => Some(ControlCommand::Quit),
            START => Some(ControlCommand::Start),
            STOP => Some(ControlCommand::Stop),
            RESTART => Some(ControlCommand::Restart),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlCommand::Quit => QUIT,
            ControlCommand::Start => START,
            ControlCommand::Stop => STOP,
            ControlCommand::Restart => RESTART,
        }
    }

    /// A bare message carrying this verb.
    pub fn to_message(self) -> Message {
        Message::new(self.as_str())
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the server writes back after each well-formed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckPolicy {
    /// Reply with a fixed verb and no payload.
    Fixed(String),
    /// Reply with the inbound verb and correlation id.
    Echo,
    /// Send no acknowledgment.
    Disabled,
}

impl Default for AckPolicy {
    fn default() -> Self {
        AckPolicy::Fixed(START.to_string())
    }
}

impl AckPolicy {
    /// The acknowledgment for `inbound`, if any.
    pub fn ack_for(&self, inbound: &Message) -> Option<Message> {
        match self {
            AckPolicy::Fixed(function) => Some(Message::new(function.clone())),
            AckPolicy::Echo => {
                let mut ack = Message::new(inbound.function.clone());
                ack.id = inbound.id.clone();
                Some(ack)
            }
            AckPolicy::Disabled => None,
        }
    }
}

/// Settings for [`ControlServer`](crate::ControlServer).
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Bind host.
    pub host: IpAddr,
    /// Explicit preferred port; overrides the persisted one.
    pub port: Option<u16>,
    /// Where the chosen port is persisted.
    pub store: SharedConfig,
    /// Key the port is persisted under.
    pub port_key: String,
    /// Consecutive ports tried before startup fails.
    pub max_probes: u16,
    pub ack: AckPolicy,
    /// Answer `PING` text frames with `PONG`.
    pub keepalive: bool,
}

impl ControlConfig {
    pub fn new(store: SharedConfig) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: None,
            store,
            port_key: PORT_KEY.to_string(),
            max_probes: DEFAULT_MAX_PROBES,
            ack: AckPolicy::default(),
            keepalive: true,
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_port_key(mut self, key: impl Into<String>) -> Self {
        self.port_key = key.into();
        self
    }

    pub fn with_max_probes(mut self, max_probes: u16) -> Self {
        self.max_probes = max_probes;
        self
    }

    pub fn with_ack(mut self, ack: AckPolicy) -> Self {
        self.ack = ack;
        self
    }

    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }
}
