//! Streaming frame decoder.
//!
//! [`FrameDecoder`] consumes transport bytes in whatever chunking they
//! arrive (one byte at a time, mid-field splits, many frames at once) and
//! emits completed frames. It runs the state machine:
//!
//! ```text
//! Kind → HeaderLen → Header → Flags → PayloadLen → Payload → Delimiter
//! ```
//!
//! Every length field is validated against its cap the moment it is read;
//! a violation (or an unknown kind tag, malformed header block, or wrong
//! delimiter) raises a single [`ReceiveEvent::Desync`] and switches the
//! decoder to resynchronisation: it scans byte-by-byte for the delimiter
//! sentinel, keeping the raw bytes of the failed attempt as a bounded
//! lookback window. When the sentinel appears, the decoder tries to parse
//! one complete frame *ending* at it from every candidate start in the
//! window, so a valid frame preceded by garbage is recovered rather than
//! discarded. Afterwards the state machine restarts at `Kind`.
//!
//! Payload bounds always come from the declared payload-length field; the
//! delimiter is never used for length, only for resynchronisation.

use crate::config::{FrameLimits, FRAME_OVERHEAD};
use crate::core::frame::{Frame, DELIMITER_LEN, MIN_FRAME_LEN};
use crate::core::packet::{Headers, PacketFlags, PacketKind};
use std::collections::VecDeque;

/// Outcome of feeding bytes to the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveEvent {
    /// No complete frame yet
    NeedMore,
    /// A frame finished decoding
    PacketReady(Frame),
    /// The stream could not be interpreted as a frame prefix; the decoder
    /// is scanning for the delimiter sentinel
    Desync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Kind,
    HeaderLen,
    Header,
    Flags,
    PayloadLen,
    Payload,
    Delimiter,
    Resync,
}

enum Step {
    Advance,
    Frame(Frame),
    Resync(Vec<u8>),
}

/// Per-connection stream reassembly state. Cleared (not destroyed) after
/// each completed frame; owned exclusively by its session.
#[derive(Debug)]
pub struct FrameDecoder {
    limits: FrameLimits,
    state: DecodeState,
    /// Raw bytes of the in-progress frame attempt; doubles as the resync
    /// lookback window
    received: Vec<u8>,
    kind: Option<PacketKind>,
    flags: PacketFlags,
    header_len: usize,
    payload_len: usize,
    headers: Headers,
    /// Events produced but not yet returned through `append`
    pending: VecDeque<ReceiveEvent>,
    max_window: usize,
    desync_count: u64,
}

impl FrameDecoder {
    pub fn new(limits: FrameLimits) -> Self {
        let max_window = limits.max_frame_bytes();
        Self {
            limits,
            state: DecodeState::Kind,
            received: Vec::new(),
            kind: None,
            flags: PacketFlags::empty(),
            header_len: 0,
            payload_len: 0,
            headers: Headers::new(),
            pending: VecDeque::new(),
            max_window,
            desync_count: 0,
        }
    }

    /// Feed a single byte. A byte can complete at most one frame; events
    /// that pile up behind a resync are returned by subsequent calls.
    pub fn append(&mut self, byte: u8) -> ReceiveEvent {
        let produced = self.run(&[byte]);
        self.pending.extend(produced);
        self.pending.pop_front().unwrap_or(ReceiveEvent::NeedMore)
    }

    /// Feed a chunk, returning every `PacketReady` and `Desync` it caused,
    /// in stream order. A zero-length chunk is a no-op.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ReceiveEvent> {
        let mut events: Vec<ReceiveEvent> = self.pending.drain(..).collect();
        events.extend(self.run(chunk));
        events
    }

    /// Total resynchronisations since this decoder was created
    pub fn desync_count(&self) -> u64 {
        self.desync_count
    }

    /// Whether the decoder is currently scanning for the delimiter
    pub fn is_resyncing(&self) -> bool {
        self.state == DecodeState::Resync
    }

    fn run(&mut self, chunk: &[u8]) -> Vec<ReceiveEvent> {
        let mut events = Vec::new();
        let mut segments: VecDeque<Vec<u8>> = VecDeque::new();
        self.consume(chunk, &mut events, &mut segments);
        while let Some(segment) = segments.pop_front() {
            self.consume(&segment, &mut events, &mut segments);
        }
        events
    }

    fn consume(
        &mut self,
        segment: &[u8],
        events: &mut Vec<ReceiveEvent>,
        segments: &mut VecDeque<Vec<u8>>,
    ) {
        let mut i = 0;
        while i < segment.len() {
            if self.state == DecodeState::Resync {
                self.received.push(segment[i]);
                i += 1;
                self.trim_window();
                if self.window_ends_with_delimiter() {
                    if let Some(frame) = self.resolve_resync() {
                        events.push(ReceiveEvent::PacketReady(frame));
                    }
                }
                continue;
            }

            let wanted = self.target() - self.received.len();
            let take = wanted.min(segment.len() - i);
            self.received.extend_from_slice(&segment[i..i + take]);
            i += take;

            while self.state != DecodeState::Resync && self.received.len() == self.target() {
                match self.on_field_complete() {
                    Step::Advance => {}
                    Step::Frame(frame) => events.push(ReceiveEvent::PacketReady(frame)),
                    Step::Resync(window) => {
                        events.push(ReceiveEvent::Desync);
                        // Re-scan the failed attempt through the resync
                        // window, then the rest of this segment, in order.
                        if i < segment.len() {
                            segments.push_front(segment[i..].to_vec());
                        }
                        segments.push_front(window);
                        return;
                    }
                }
            }
        }
    }

    /// Absolute `received` length at which the current field completes.
    fn target(&self) -> usize {
        match self.state {
            DecodeState::Kind => 1,
            DecodeState::HeaderLen => 3,
            DecodeState::Header => 3 + self.header_len,
            DecodeState::Flags => 4 + self.header_len,
            DecodeState::PayloadLen => FRAME_OVERHEAD + self.header_len,
            DecodeState::Payload => FRAME_OVERHEAD + self.header_len + self.payload_len,
            DecodeState::Delimiter => {
                FRAME_OVERHEAD + self.header_len + self.payload_len + DELIMITER_LEN
            }
            DecodeState::Resync => usize::MAX,
        }
    }

    fn on_field_complete(&mut self) -> Step {
        match self.state {
            DecodeState::Kind => match PacketKind::from_wire(self.received[0]) {
                Some(kind) => {
                    self.kind = Some(kind);
                    self.state = DecodeState::HeaderLen;
                    Step::Advance
                }
                None => self.begin_resync(),
            },
            DecodeState::HeaderLen => {
                let declared = u16::from_be_bytes([self.received[1], self.received[2]]) as usize;
                if declared > self.limits.effective_header_cap() {
                    return self.begin_resync();
                }
                self.header_len = declared;
                self.state = DecodeState::Header;
                Step::Advance
            }
            DecodeState::Header => {
                match Headers::parse(&self.received[3..3 + self.header_len]) {
                    Ok(headers) => {
                        self.headers = headers;
                        self.state = DecodeState::Flags;
                        Step::Advance
                    }
                    Err(_) => self.begin_resync(),
                }
            }
            DecodeState::Flags => {
                self.flags = PacketFlags::from_bits(self.received[3 + self.header_len]);
                self.state = DecodeState::PayloadLen;
                Step::Advance
            }
            DecodeState::PayloadLen => {
                let at = 4 + self.header_len;
                let declared = u32::from_be_bytes([
                    self.received[at],
                    self.received[at + 1],
                    self.received[at + 2],
                    self.received[at + 3],
                ]) as usize;
                if declared > self.limits.max_payload_bytes {
                    return self.begin_resync();
                }
                self.payload_len = declared;
                self.state = DecodeState::Payload;
                Step::Advance
            }
            DecodeState::Payload => {
                self.state = DecodeState::Delimiter;
                Step::Advance
            }
            DecodeState::Delimiter => {
                let delim_at = FRAME_OVERHEAD + self.header_len + self.payload_len;
                if self.received[delim_at..] != self.limits.delimiter {
                    return self.begin_resync();
                }
                let Some(kind) = self.kind else {
                    return self.begin_resync();
                };
                let payload =
                    self.received[FRAME_OVERHEAD + self.header_len..delim_at].to_vec();
                let frame = Frame {
                    kind,
                    flags: self.flags,
                    headers: std::mem::take(&mut self.headers),
                    payload,
                };
                self.reset();
                Step::Frame(frame)
            }
            DecodeState::Resync => Step::Advance,
        }
    }

    fn begin_resync(&mut self) -> Step {
        self.desync_count += 1;
        let window = std::mem::take(&mut self.received);
        self.clear_fields();
        self.state = DecodeState::Resync;
        Step::Resync(window)
    }

    fn resolve_resync(&mut self) -> Option<Frame> {
        let window = std::mem::take(&mut self.received);
        self.state = DecodeState::Kind;
        let end = window.len();
        if end >= MIN_FRAME_LEN {
            // Salvage: one frame may end exactly at this delimiter. The
            // exact-length check inside from_bytes rejects almost every
            // start offset before touching the header block.
            for start in 0..=end - MIN_FRAME_LEN {
                if let Ok(frame) = Frame::from_bytes(&window[start..], &self.limits) {
                    return Some(frame);
                }
            }
        }
        None
    }

    fn window_ends_with_delimiter(&self) -> bool {
        self.received.len() >= DELIMITER_LEN
            && self.received[self.received.len() - DELIMITER_LEN..] == self.limits.delimiter
    }

    fn trim_window(&mut self) {
        if self.received.len() > self.max_window {
            let excess = self.received.len() - self.max_window;
            self.received.drain(..excess);
        }
    }

    fn clear_fields(&mut self) {
        self.kind = None;
        self.flags = PacketFlags::empty();
        self.header_len = 0;
        self.payload_len = 0;
        self.headers = Headers::new();
    }

    /// Clear after a completed frame; the allocation is kept for reuse.
    fn reset(&mut self) {
        self.received.clear();
        self.clear_fields();
        self.state = DecodeState::Kind;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(FrameLimits::default())
    }
}
