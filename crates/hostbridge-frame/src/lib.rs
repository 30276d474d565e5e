//! Line framing for a worker process's stdio.
//!
//! The worker writes newline-terminated text. Stdout lines beginning with
//! `GSMMSG:` carry a JSON [`Message`]; every other line (and every stderr
//! line) is log output. The host answers with `GSMCMD:` lines on stdin.
//!
//! Framing is chunk-invariant: the same byte stream yields the same events
//! no matter how reads split it.

pub mod codec;
pub mod error;
pub mod framer;
pub mod message;
pub mod reader;
pub mod sentinel;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::LineCodec;
pub use codec::{
    classify_line, decode_line, encode_command, LineConfig, LineState, RawLine, StreamEvent,
    DEFAULT_MAX_LINE,
};
pub use error::{FrameError, Result};
pub use framer::LineFramer;
pub use message::Message;
pub use reader::LineReader;
pub use sentinel::{StreamSource, COMMAND_PREFIX, MESSAGE_PREFIX};
pub use writer::{CommandWriter, QUIT_FUNCTION};
