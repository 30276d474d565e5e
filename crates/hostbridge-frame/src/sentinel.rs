//! Line sentinels for the worker stdio protocol.
//!
//! Worker → host lines on stdout that start with [`MESSAGE_PREFIX`] carry a
//! JSON [`Message`](crate::Message). Host → worker lines on stdin start with
//! [`COMMAND_PREFIX`]. Anything else is plain log output.

/// Prefix of structured worker messages on stdout.
pub const MESSAGE_PREFIX: &str = "GSMMSG:";

/// Prefix of host commands written to the worker's stdin.
pub const COMMAND_PREFIX: &str = "GSMCMD:";

/// Which stream of the worker a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    /// Standard output: may carry messages.
    Stdout,
    /// Standard error: always diagnostic.
    Stderr,
}

impl StreamSource {
    /// Short lowercase name for logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }

    /// Returns true if lines from this stream are ever parsed as messages.
    pub fn carries_messages(self) -> bool {
        matches!(self, StreamSource::Stdout)
    }
}

impl std::fmt::Display for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
