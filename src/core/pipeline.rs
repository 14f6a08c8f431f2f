//! Content transformation pipeline.
//!
//! Outbound ([`TransformContext::seal`]): payload → optional compression →
//! optional encryption → framed bytes. Compression runs first because
//! compressing ciphertext is futile, and encrypting compressed data hides
//! size patterns better than the reverse.
//!
//! Inbound ([`TransformContext::open`]): decoded frame → preshared digest
//! verification → decryption → decompression → [`Packet`]. Flags are
//! cleared as each transform is reversed, so a delivered packet's flags
//! describe its payload truthfully.

use crate::config::TransportConfig;
use crate::core::frame::Frame;
use crate::core::packet::{keys, Packet, PacketFlags, PacketKind};
use crate::error::{constants, Result, WireError};
use crate::utils::compression::{decompress, maybe_compress, CompressionKind};
use crate::utils::crypto::{preshared_digest_hex, Cipher, NONCE_LEN};

pub use crate::config::FrameLimits;

/// Keys, algorithms, and caps applied to every packet on one connection.
///
/// Stateless with respect to packets: the same context can seal and open
/// any number of them, from any number of tasks holding a shared reference.
pub struct TransformContext {
    limits: FrameLimits,
    compression_kind: CompressionKind,
    compress_outbound: bool,
    compression_threshold: usize,
    /// Cipher and the hex digest that identifies its expected key
    crypto: Option<(Cipher, String)>,
}

impl TransformContext {
    /// Build from transport configuration. The preshared digest comes from
    /// the preshared key when configured, otherwise from the passphrase, so
    /// encrypted packets always carry a verifiable digest.
    pub fn new(config: &TransportConfig) -> Self {
        let crypto = config.encryption_passphrase.as_deref().map(|passphrase| {
            let digest = match config.preshared_key.as_deref() {
                Some(key) => preshared_digest_hex(key),
                None => preshared_digest_hex(passphrase),
            };
            (Cipher::new(passphrase), digest)
        });

        Self {
            limits: config.limits.clone(),
            compression_kind: config.compression_kind,
            compress_outbound: config.compression_enabled,
            compression_threshold: config.compression_threshold_bytes,
            crypto,
        }
    }

    /// A context with no transforms, for plaintext links and tests.
    pub fn plaintext(limits: FrameLimits) -> Self {
        Self {
            limits,
            compression_kind: CompressionKind::Lz4,
            compress_outbound: false,
            compression_threshold: 0,
            crypto: None,
        }
    }

    pub fn limits(&self) -> &FrameLimits {
        &self.limits
    }

    /// Whether packets sealed by this context are encrypted
    pub fn encrypts(&self) -> bool {
        self.crypto.is_some()
    }

    /// Digest identifying the expected key, when encryption is configured
    pub fn preshared_hex(&self) -> Option<&str> {
        self.crypto.as_ref().map(|(_, digest)| digest.as_str())
    }

    /// Serialise a packet into framed wire bytes, applying the configured
    /// transforms and recording them in the flags.
    ///
    /// # Errors
    /// Returns `WireError::TooLarge` when the result exceeds the caps, or
    /// `WireError::InvalidPacket` when the packet violates its invariants
    pub fn seal(&self, packet: Packet) -> Result<Vec<u8>> {
        self.seal_inner(packet, None)
    }

    /// Like [`TransformContext::seal`] with an injected cipher nonce, which
    /// makes the output deterministic. Wire-format tests depend on this.
    pub fn seal_with_nonce(&self, packet: Packet, nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>> {
        self.seal_inner(packet, Some(nonce))
    }

    fn seal_inner(&self, packet: Packet, nonce: Option<&[u8; NONCE_LEN]>) -> Result<Vec<u8>> {
        packet.validate()?;

        let Packet {
            kind,
            mut flags,
            mut headers,
            mut payload,
        } = packet;

        headers.insert(keys::CONTENT_LENGTH, payload.len().to_string())?;

        // Directory payloads arrive pre-compressed by the archive codec and
        // already carry the flag; everything else goes through the
        // threshold-gated compressor.
        if self.compress_outbound && !flags.contains(PacketFlags::COMPRESSED) {
            let (out, applied) =
                maybe_compress(&payload, self.compression_kind, self.compression_threshold)?;
            if applied {
                payload = out;
                flags.insert(PacketFlags::COMPRESSED);
            }
        }

        if let Some((cipher, digest)) = &self.crypto {
            payload = match nonce {
                Some(nonce) => cipher.seal_with_nonce(&payload, nonce)?,
                None => cipher.seal(&payload)?,
            };
            flags.insert(PacketFlags::ENCRYPTED);
            flags.insert(PacketFlags::HAS_PRESHARED);
            headers.insert(keys::PRESHARED_HASH, digest.clone())?;
        }

        if !headers.is_empty() {
            flags.insert(PacketFlags::HAS_METADATA);
        }

        let frame = Frame {
            kind,
            flags,
            headers,
            payload,
        };
        frame.encode(&self.limits)
    }

    /// Reverse the transforms on a decoded frame and validate the result.
    ///
    /// # Errors
    /// - `WireError::WrongKey` when the carried digest does not match the
    ///   configured secret (or the frame is encrypted and no key is
    ///   configured); the packet must be dropped
    /// - `WireError::DecryptionFailure` / `WireError::DecompressionFailure`
    ///   on corrupt content
    /// - `WireError::InvalidPacket` when a post-transform invariant fails
    pub fn open(&self, frame: Frame) -> Result<Packet> {
        let Frame {
            kind,
            mut flags,
            headers,
            mut payload,
        } = frame;

        if flags.contains(PacketFlags::ENCRYPTED) {
            let Some((cipher, digest)) = &self.crypto else {
                return Err(WireError::WrongKey);
            };
            let carried = headers
                .get(keys::PRESHARED_HASH)
                .ok_or(WireError::InvalidPacket(constants::ERR_MISSING_PRESHARED))?;
            if carried != digest.as_str() {
                return Err(WireError::WrongKey);
            }
            payload = cipher.open(&payload)?;
            // The digest header stays: the session's auth gate reads it,
            // and the packet model carries it as an attribute
            flags.remove(PacketFlags::ENCRYPTED);
        }

        // Directory archives own their compression layer; the flag stays.
        if flags.contains(PacketFlags::COMPRESSED) && kind != PacketKind::Directory {
            payload = decompress(&payload, self.compression_kind)?;
            flags.remove(PacketFlags::COMPRESSED);
        }

        let packet = Packet {
            kind,
            flags,
            headers,
            payload,
        };
        packet.validate()?;
        Ok(packet)
    }
}

impl std::fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformContext")
            .field("compression_kind", &self.compression_kind)
            .field("compress_outbound", &self.compress_outbound)
            .field("encrypts", &self.encrypts())
            .finish()
    }
}
