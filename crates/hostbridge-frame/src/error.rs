/// Errors that can occur while framing or parsing bridge messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The message body is not valid JSON for a [`Message`](crate::Message).
    #[error("invalid message JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The message has an empty `function` verb.
    #[error("message has an empty `function` field")]
    MissingFunction,

    /// A single line exceeded the configured maximum length.
    #[error("line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// An I/O error occurred while reading or writing lines.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached EOF.
    #[error("stream closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
