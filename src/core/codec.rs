//! Tokio codec adapter for framing over byte streams.
//!
//! Wraps [`FrameDecoder`] so transports can drive a
//! `Framed<T, FrameCodec>` like any other codec in the stack. Desyncs are
//! recovered inside the decoder; the stream itself never errors for them.

use crate::config::FrameLimits;
use crate::core::frame::Frame;
use crate::core::receiver::{FrameDecoder, ReceiveEvent};
use crate::error::WireError;
use bytes::BytesMut;
use std::collections::VecDeque;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

pub struct FrameCodec {
    limits: FrameLimits,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
}

impl FrameCodec {
    pub fn new(limits: FrameLimits) -> Self {
        Self {
            decoder: FrameDecoder::new(limits.clone()),
            limits,
            ready: VecDeque::new(),
        }
    }

    /// Resynchronisations seen on this connection
    pub fn desync_count(&self) -> u64 {
        self.decoder.desync_count()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(FrameLimits::default())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        if !src.is_empty() {
            let chunk = src.split_to(src.len());
            for event in self.decoder.feed(&chunk) {
                match event {
                    ReceiveEvent::PacketReady(frame) => self.ready.push_back(frame),
                    ReceiveEvent::Desync => {
                        warn!(desyncs = self.decoder.desync_count(), "frame desync, resynchronising");
                    }
                    ReceiveEvent::NeedMore => {}
                }
            }
        }
        Ok(self.ready.pop_front())
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = WireError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), WireError> {
        let bytes = frame.encode(&self.limits)?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}
