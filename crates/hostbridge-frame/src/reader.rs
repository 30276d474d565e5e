use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::debug;

use crate::codec::{decode_line, LineConfig, LineState, StreamEvent};
use crate::error::{FrameError, Result};
use crate::sentinel::StreamSource;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads classified lines from any blocking `Read` stream.
///
/// Handles partial reads internally; callers always get whole lines.
pub struct LineReader<T> {
    inner: T,
    source: StreamSource,
    buf: BytesMut,
    state: LineState,
    config: LineConfig,
}

impl<T: Read> LineReader<T> {
    /// Create a line reader with default configuration.
    pub fn new(inner: T, source: StreamSource) -> Self {
        Self::with_config(inner, source, LineConfig::default())
    }

    /// Create a line reader with explicit configuration.
    pub fn with_config(inner: T, source: StreamSource, config: LineConfig) -> Self {
        Self {
            inner,
            source,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: LineState::default(),
            config,
        }
    }

    /// Read the next classified line (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at EOF. An unterminated
    /// trailing fragment is discarded at that point.
    pub fn read_event(&mut self) -> Result<StreamEvent> {
        loop {
            let max_line_length = self.config.max_line_length;
            if let Some(raw) = decode_line(&mut self.buf, &mut self.state, max_line_length) {
                return Ok(raw.into_event(self.source));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.buf.is_empty() {
                    debug!(
                        source = %self.source,
                        dropped = self.buf.len(),
                        "discarding unterminated trailing line"
                    );
                    self.buf.clear();
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for LineReader<T> {
    type Item = Result<StreamEvent>;

    /// Yields events until EOF.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_event() {
            Err(FrameError::ConnectionClosed) => None,
            other => Some(other),
        }
    }
}
