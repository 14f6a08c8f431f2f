//! Wire frame serialisation.
//!
//! Frame layout, byte by byte:
//!
//! ```text
//! [kind : 1]
//! [header-length : 2, big-endian]
//! [header-bytes : header-length bytes, UTF-8, key=value joined by LF]
//! [flags : 1]
//! [payload-length : 4, big-endian]
//! [payload : payload-length bytes]
//! [delimiter : 4-byte sentinel]
//! ```
//!
//! The delimiter is redundant with the declared lengths; it exists only so
//! a desynchronised decoder can scan forward to a frame boundary. Payloads
//! are not delimiter-escaped; the length prefix is authoritative.

use crate::config::{FrameLimits, FRAME_OVERHEAD};
use crate::core::packet::{Headers, PacketFlags, PacketKind};
use crate::error::{Result, WireError};

/// Length of the delimiter sentinel
pub const DELIMITER_LEN: usize = 4;

/// Smallest possible frame: empty headers, empty payload
pub const MIN_FRAME_LEN: usize = FRAME_OVERHEAD + DELIMITER_LEN;

/// One wire-level frame. The payload is whatever the flags say it is:
/// possibly compressed, possibly ciphertext.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: PacketKind,
    pub flags: PacketFlags,
    pub headers: Headers,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Serialise into a delimiter-terminated byte sequence.
    ///
    /// # Errors
    /// Returns `WireError::TooLarge` when the header block or payload
    /// exceeds its configured cap
    pub fn encode(&self, limits: &FrameLimits) -> Result<Vec<u8>> {
        let header_bytes = self.headers.encode();
        if header_bytes.len() > limits.effective_header_cap() {
            return Err(WireError::TooLarge(header_bytes.len()));
        }
        if self.payload.len() > limits.max_payload_bytes {
            return Err(WireError::TooLarge(self.payload.len()));
        }

        let total =
            FRAME_OVERHEAD + header_bytes.len() + self.payload.len() + limits.delimiter.len();
        let mut out = Vec::with_capacity(total);
        out.push(self.kind.wire());
        out.extend_from_slice(&(header_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&header_bytes);
        out.push(self.flags.bits());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&limits.delimiter);

        debug_assert_eq!(out.len(), total);
        Ok(out)
    }

    /// Parse one complete frame occupying the whole buffer, delimiter
    /// included. Length fields are validated against the caps before any
    /// header parsing, and the payload bounds come from the declared
    /// payload-length field alone.
    ///
    /// # Errors
    /// Returns a framing error naming the first violated rule
    pub fn from_bytes(bytes: &[u8], limits: &FrameLimits) -> Result<Self> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(WireError::InvalidHeader("frame shorter than minimum"));
        }

        let kind = PacketKind::from_wire(bytes[0]).ok_or(WireError::UnknownKind(bytes[0]))?;

        let header_len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        if header_len > limits.effective_header_cap() {
            return Err(WireError::OversizedHeader(header_len));
        }
        if bytes.len() < FRAME_OVERHEAD + header_len {
            return Err(WireError::InvalidHeader("truncated header block"));
        }

        let flags = PacketFlags::from_bits(bytes[3 + header_len]);
        let payload_len = u32::from_be_bytes([
            bytes[4 + header_len],
            bytes[5 + header_len],
            bytes[6 + header_len],
            bytes[7 + header_len],
        ]) as usize;
        if payload_len > limits.max_payload_bytes {
            return Err(WireError::OversizedPayload(payload_len));
        }

        let expected = FRAME_OVERHEAD + header_len + payload_len + DELIMITER_LEN;
        if bytes.len() != expected {
            return Err(WireError::InvalidHeader("frame length mismatch"));
        }

        let delim_at = FRAME_OVERHEAD + header_len + payload_len;
        if bytes[delim_at..] != limits.delimiter {
            return Err(WireError::InvalidHeader("missing frame delimiter"));
        }

        let headers = Headers::parse(&bytes[3..3 + header_len])?;
        let payload = bytes[FRAME_OVERHEAD + header_len..delim_at].to_vec();

        Ok(Self {
            kind,
            flags,
            headers,
            payload,
        })
    }

}
