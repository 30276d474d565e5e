use bytes::BytesMut;
use tracing::debug;

use crate::codec::{decode_line, LineConfig, LineState, StreamEvent};
use crate::sentinel::StreamSource;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Push-style framer for one worker stream.
///
/// Feed it arbitrary chunks; it yields one [`StreamEvent`] per complete line,
/// in input order. The events produced are the same however the input is
/// split into chunks.
#[derive(Debug)]
pub struct LineFramer {
    source: StreamSource,
    buf: BytesMut,
    state: LineState,
    config: LineConfig,
}

impl LineFramer {
    pub fn new(source: StreamSource) -> Self {
        Self::with_config(source, LineConfig::default())
    }

    pub fn with_config(source: StreamSource, config: LineConfig) -> Self {
        Self {
            source,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: LineState::default(),
            config,
        }
    }

    /// Stream this framer classifies.
    pub fn source(&self) -> StreamSource {
        self.source
    }

    /// Append a chunk and return every line it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if chunk.is_empty() {
            return events;
        }
        self.buf.extend_from_slice(chunk);
        let max_line_length = self.config.max_line_length;
        while let Some(raw) = decode_line(&mut self.buf, &mut self.state, max_line_length) {
            events.push(raw.into_event(self.source));
        }
        events
    }

    /// Bytes buffered for an incomplete line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// End of stream. An unterminated trailing fragment is dropped and its
    /// length returned.
    pub fn close(self) -> usize {
        let dropped = self.buf.len();
        if dropped > 0 {
            debug!(source = %self.source, dropped, "discarding unterminated trailing line");
        }
        dropped
    }
}
