use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{decode_line, encode_command, LineConfig, LineState, StreamEvent};
use crate::error::FrameError;
use crate::message::Message;
use crate::sentinel::StreamSource;

/// Host-side `tokio_util` codec for a worker's stdio.
///
/// Decodes worker output lines into [`StreamEvent`]s and encodes
/// [`Message`]s as `GSMCMD:` command lines.
#[derive(Debug, Clone)]
pub struct LineCodec {
    source: StreamSource,
    state: LineState,
    config: LineConfig,
}

impl LineCodec {
    pub fn new(source: StreamSource) -> Self {
        Self::with_config(source, LineConfig::default())
    }

    pub fn with_config(source: StreamSource, config: LineConfig) -> Self {
        Self {
            source,
            state: LineState::default(),
            config,
        }
    }
}

impl Decoder for LineCodec {
    type Item = StreamEvent;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let raw = decode_line(src, &mut self.state, self.config.max_line_length);
        Ok(raw.map(|raw| raw.into_event(self.source)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        if !src.is_empty() {
            debug!(
                source = %self.source,
                dropped = src.len(),
                "discarding unterminated trailing line"
            );
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Message> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_command(&item, dst)
    }
}

impl<'a> Encoder<&'a Message> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &'a Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_command(item, dst)
    }
}
