use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::error::Result;
use crate::message::Message;
use crate::sentinel::{StreamSource, COMMAND_PREFIX, MESSAGE_PREFIX};

/// Default maximum line length: 16 MiB.
pub const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

/// Configuration for line decoding.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Maximum bytes in a single line, terminator excluded.
    pub max_line_length: usize,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE,
        }
    }
}

/// One classified line from a worker stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A `GSMMSG:` line that parsed into a message.
    Message(Message),

    /// A plain output line.
    Log { source: StreamSource, line: String },

    /// A `GSMMSG:` line whose body failed to parse. `line` is the raw line.
    ParseError { line: String, reason: String },

    /// A line longer than the configured maximum was dropped.
    Overflow { source: StreamSource, discarded: usize },
}

/// Raw output of [`decode_line`].
#[derive(Debug)]
pub enum RawLine {
    /// A complete line with its terminator stripped.
    Complete(BytesMut),
    /// An over-long line was discarded; `discarded` counts bytes before `\n`.
    Overflow { discarded: usize },
}

impl RawLine {
    /// Classify against the stream it came from.
    pub fn into_event(self, source: StreamSource) -> StreamEvent {
        match self {
            RawLine::Complete(line) => classify_line(&line, source),
            RawLine::Overflow { discarded } => StreamEvent::Overflow { source, discarded },
        }
    }
}

/// Scan state carried across [`decode_line`] calls.
#[derive(Debug, Default, Clone)]
pub struct LineState {
    scanned: usize,
    discarding: bool,
    discarded: usize,
}

impl LineState {
    /// True while the tail of an over-long line is being skipped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }
}

/// Try to split one complete line from the front of `src`.
///
/// Returns `None` until a `\n` is buffered. A trailing `\r` is stripped so
/// `\n` and `\r\n` terminators read the same. Bytes already scanned are not
/// scanned again on the next call.
pub fn decode_line(src: &mut BytesMut, state: &mut LineState, max_line: usize) -> Option<RawLine> {
    let start = state.scanned.min(src.len());
    let Some(offset) = src[start..].iter().position(|b| *b == b'\n') else {
        state.scanned = src.len();
        if src.len() > max_line {
            state.discarding = true;
            state.discarded += src.len();
            state.scanned = 0;
            src.clear();
        }
        return None;
    };

    let end = start + offset;
    let mut line = src.split_to(end + 1);
    state.scanned = 0;

    if state.discarding {
        let discarded = state.discarded + end;
        state.discarding = false;
        state.discarded = 0;
        debug!(discarded, max_line, "dropped over-long line");
        return Some(RawLine::Overflow { discarded });
    }
    if end > max_line {
        debug!(discarded = end, max_line, "dropped over-long line");
        return Some(RawLine::Overflow { discarded: end });
    }

    line.truncate(end);
    if line.last() == Some(&b'\r') {
        line.truncate(end - 1);
    }
    Some(RawLine::Complete(line))
}

/// Classify a terminator-free line.
///
/// Stderr lines are always logs. Stdout lines starting with `GSMMSG:` are
/// parsed as messages; everything else is a log. Invalid UTF-8 is replaced
/// rather than rejected.
pub fn classify_line(line: &[u8], source: StreamSource) -> StreamEvent {
    let text = String::from_utf8_lossy(line).into_owned();
    if !source.carries_messages() {
        return StreamEvent::Log { source, line: text };
    }

    let Some(body) = text.strip_prefix(MESSAGE_PREFIX) else {
        return StreamEvent::Log { source, line: text };
    };

    match Message::from_json(body) {
        Ok(message) => {
            trace!(function = %message.function, "worker message");
            StreamEvent::Message(message)
        }
        Err(err) => {
            debug!(error = %err, "unparseable worker message");
            StreamEvent::ParseError {
                reason: err.to_string(),
                line: text,
            }
        }
    }
}

/// Append a `GSMCMD:` command line for `message` to `dst`.
pub fn encode_command(message: &Message, dst: &mut BytesMut) -> Result<()> {
    let body = serde_json::to_vec(message)?;
    dst.reserve(COMMAND_PREFIX.len() + body.len() + 1);
    dst.put_slice(COMMAND_PREFIX.as_bytes());
    dst.put_slice(&body);
    dst.put_u8(b'\n');
    Ok(())
}
