use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use hostbridge_gate::InteractionMode;
use hostbridge_transport::{SharedConfig, DEFAULT_MAX_PROBES};

use crate::exit::{io_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod gate;
pub mod send;
pub mod serve;
pub mod spawn;
pub mod version;

/// App directory used for the shared config when `--config` is absent.
pub const DEFAULT_APP_NAME: &str = "hostbridge";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a control-channel server and print inbound traffic.
    Serve(ServeArgs),
    /// Send one message to a control-channel server.
    Send(SendArgs),
    /// Run a worker and print its framed output.
    Spawn(SpawnArgs),
    /// Check a channel name against an allow-list registry.
    Gate(GateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Spawn(args) => spawn::run(args, format),
        Command::Gate(args) => gate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the persisted port lives.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Shared config file. Defaults to `<config dir>/<app-name>/shared_config.json`.
    #[arg(long, value_name = "PATH", env = "HOSTBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,
    /// App directory name under the platform config dir.
    #[arg(long, default_value = DEFAULT_APP_NAME)]
    pub app_name: String,
}

impl StoreArgs {
    pub fn open(&self) -> CliResult<SharedConfig> {
        match &self.config {
            Some(path) => Ok(SharedConfig::open(path)),
            None => SharedConfig::open_default(&self.app_name)
                .map_err(|err| transport_error("shared config unavailable", err)),
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Bind host.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,
    /// Preferred port. Overrides the persisted one.
    #[arg(long, short = 'p')]
    pub port: Option<u16>,
    /// Consecutive ports tried before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_PROBES)]
    pub max_probes: u16,
    /// Reply to each inbound message: a fixed verb, `echo`, or `none`.
    #[arg(long, default_value = "start")]
    pub ack: String,
    /// Treat `PING` frames as ordinary (malformed) messages.
    #[arg(long)]
    pub no_keepalive: bool,
    /// Verb sent to each peer right after it connects.
    #[arg(long, value_name = "VERB")]
    pub greet: Option<String>,
    /// Exit after N inbound messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// `ws://` URL, `host:port`, or a bare port. Defaults to the persisted port on localhost.
    pub target: Option<String>,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Message verb.
    #[arg(long, short = 'f', required_unless_present = "ping")]
    pub function: Option<String>,
    /// JSON object payload.
    #[arg(long, conflicts_with = "ping")]
    pub data: Option<String>,
    /// Correlation id.
    #[arg(long, conflicts_with = "ping")]
    pub id: Option<String>,
    /// Send a `PING` keepalive and wait for `PONG` instead of a message.
    #[arg(long, conflicts_with = "function")]
    pub ping: bool,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct SpawnArgs {
    /// Worker program.
    pub program: String,
    /// Arguments passed to the worker. Put `--` before the program when they start with `-`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// Extra environment, `KEY=VALUE`. Repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
    /// Command message (JSON) written to the worker after start. Repeatable.
    #[arg(long = "command", value_name = "JSON")]
    pub commands: Vec<String>,
    /// Begin graceful shutdown after this long (e.g. 10s).
    #[arg(long, value_name = "DURATION")]
    pub quit_after: Option<String>,
    /// How long shutdown waits for `cleanup_complete` before terminating.
    #[arg(long, default_value = "5s")]
    pub grace: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Invoke,
    Send,
    On,
}

impl From<ModeArg> for InteractionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Invoke => InteractionMode::Invoke,
            ModeArg::Send => InteractionMode::Send,
            ModeArg::On => InteractionMode::On,
        }
    }
}

#[derive(Args, Debug)]
pub struct GateArgs {
    /// Channel name to check.
    pub channel: String,
    /// Modes to check (comma-separated). Default: all.
    #[arg(long, value_delimiter = ',')]
    pub mode: Option<Vec<ModeArg>>,
    /// Registry JSON file.
    #[arg(long, value_name = "FILE", conflicts_with = "preset")]
    pub registry: Option<PathBuf>,
    /// Built-in registry.
    #[arg(long, default_value = "shell", value_parser = hostbridge_gate::presets::PRESET_NAMES)]
    pub preset: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start async runtime", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn explicit_config_path_is_used() {
        let store = StoreArgs {
            config: Some(PathBuf::from("/tmp/hb/shared_config.json")),
            app_name: DEFAULT_APP_NAME.to_string(),
        };
        let opened = store.open().expect("explicit path needs no config dir");
        assert_eq!(opened.path(), std::path::Path::new("/tmp/hb/shared_config.json"));
    }
}
