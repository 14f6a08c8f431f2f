//! Session events delivered to the consumer.
//!
//! Each session owns one bounded event channel. The receive loop awaits
//! channel capacity before reading more transport bytes, so a slow consumer
//! pauses the reads rather than growing a queue.

use crate::core::packet::Packet;

/// Why a session reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer hung up or reset
    Remote,
    /// No inbound bytes within the idle timeout
    IdleTimeout,
    /// Cancellation requested locally
    Cancelled,
    /// Graceful shutdown completed
    Shutdown,
    /// Peer failed authentication
    AuthRejected,
    /// Transport read or write error
    TransportError(String),
}

/// Events emitted by a session's receive loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// The peer completed authentication (server side)
    Authenticated { client_id: Option<String> },
    /// A packet arrived, decrypted and decompressed
    Packet(Packet),
    /// The decoder lost framing and is resynchronising
    Desync,
    /// A packet was dropped: digest mismatch or decryption failure
    IntegrityFailure,
    /// A packet was dropped: malformed content or violated invariant
    InvalidPacket,
    /// An outbound write failed; the session is closing
    MessageFailed(String),
    /// The session reached `Closed`; no further events follow
    Closed(CloseReason),
}
