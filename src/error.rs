//! # Error Types
//!
//! All error variants that can occur during protocol operations, from
//! low-level I/O failures to framing and cryptographic violations.
//!
//! Errors fall into two groups with different handling contracts:
//!
//! - **Recovered locally** by the session driver: framing errors (the
//!   decoder resynchronises on the delimiter sentinel), integrity failures
//!   (the offending packet is dropped), and invalid packets. The session
//!   keeps running.
//! - **Surfaced to the caller**: disconnects, oversized outbound messages,
//!   cancellation, timeouts, and misuse such as sending on a closed session.
//!
//! All recoverable errors are values on the send and receive result paths;
//! none of them are panics.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Framing errors
    pub const ERR_INVALID_HEADER: &str = "Malformed frame header";
    pub const ERR_HEADER_SYNTAX: &str = "Header entry is not key=value";
    pub const ERR_HEADER_FORBIDDEN_CHAR: &str = "Header key or value contains '=' or newline";

    /// Session errors
    pub const ERR_NOT_CONNECTED: &str = "Session is not connected";
    pub const ERR_SESSION_CLOSED: &str = "Session closed";
    pub const ERR_AUTH_REJECTED: &str = "Authentication rejected by peer";

    /// Packet invariants
    pub const ERR_MISSING_PRESHARED: &str = "Encrypted packet carries no preshared-hash header";
    pub const ERR_CONTENT_LENGTH: &str = "content-length header does not match payload";
    pub const ERR_PART_RANGE: &str = "part-index must be less than part-total";
}

/// Primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Malformed frame: {0}")]
    InvalidHeader(&'static str),

    #[error("Header block too large: {0} bytes")]
    OversizedHeader(usize),

    #[error("Payload too large: {0} bytes")]
    OversizedPayload(usize),

    #[error("Unknown packet kind tag: {0}")]
    UnknownKind(u8),

    #[error("Invalid packet: {0}")]
    InvalidPacket(&'static str),

    #[error("Message too large to encode: {0} bytes")]
    TooLarge(usize),

    #[error("Preshared key digest mismatch")]
    WrongKey,

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Connection closed by peer")]
    Disconnected,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection idle timeout")]
    IdleTimeout,

    #[error("Authentication failed: {0}")]
    AuthFailed(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TLS error: {0}")]
    TlsError(String),
}

/// Type alias for Results using WireError
pub type Result<T> = std::result::Result<T, WireError>;

impl WireError {
    /// Whether the session driver recovers from this error without closing
    /// the connection (resync or drop-packet), as opposed to surfacing it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WireError::InvalidHeader(_)
                | WireError::OversizedHeader(_)
                | WireError::OversizedPayload(_)
                | WireError::UnknownKind(_)
                | WireError::InvalidPacket(_)
                | WireError::WrongKey
                | WireError::DecryptionFailure
                | WireError::DecompressionFailure
        )
    }
}
