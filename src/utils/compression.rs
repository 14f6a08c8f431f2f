use crate::config::MAX_PAYLOAD_BYTES;
use crate::error::{Result, WireError};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Payload compression algorithm.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    Lz4,
    Zstd,
}

/// Zstd effort level; low, since framing latency matters more than ratio
const ZSTD_LEVEL: i32 = 1;

/// Inflated output is bounded by the payload cap, so a hostile frame cannot
/// claim a multi-gigabyte expansion.
fn ensure_within_cap(inflated: usize) -> Result<()> {
    if inflated > MAX_PAYLOAD_BYTES {
        return Err(WireError::DecompressionFailure);
    }
    Ok(())
}

/// Compresses data using the specified compression algorithm
///
/// # Errors
/// Returns `WireError::CompressionFailure` if compression fails
pub fn compress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionKind::Zstd => {
            zstd::encode_all(data, ZSTD_LEVEL).map_err(|_| WireError::CompressionFailure)
        }
    }
}

/// Decompresses data that was compressed with the specified algorithm.
///
/// The declared or produced output size is checked against the payload cap
/// before the full allocation happens.
///
/// # Errors
/// Returns `WireError::DecompressionFailure` on corrupt input or when the
/// output would exceed the payload cap
pub fn decompress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Lz4 => {
            // The size prefix is the allocation request; vet it first
            let (inflated, body) = lz4_flex::block::uncompressed_size(data)
                .map_err(|_| WireError::DecompressionFailure)?;
            ensure_within_cap(inflated)?;
            lz4_flex::block::decompress(body, inflated)
                .map_err(|_| WireError::DecompressionFailure)
        }
        CompressionKind::Zstd => {
            // Zstd frames do not have to declare their content size, so the
            // reader itself is capped instead
            let decoder =
                zstd::stream::Decoder::new(data).map_err(|_| WireError::DecompressionFailure)?;
            let mut out = Vec::new();
            decoder
                .take(MAX_PAYLOAD_BYTES as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|_| WireError::DecompressionFailure)?;
            ensure_within_cap(out.len())?;
            Ok(out)
        }
    }
}

/// Compress data if it meets the configured threshold, otherwise return it
/// unchanged. Returns the output bytes and whether compression was applied.
pub fn maybe_compress(
    data: &[u8],
    kind: CompressionKind,
    threshold_bytes: usize,
) -> Result<(Vec<u8>, bool)> {
    if data.len() >= threshold_bytes {
        compress(data, kind).map(|out| (out, true))
    } else {
        Ok((data.to_vec(), false))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lz4_roundtrip() {
        let original = b"Hello, World! This is a test of LZ4 compression.";
        let compressed = compress(original, CompressionKind::Lz4).unwrap();
        let decompressed = decompress(&compressed, CompressionKind::Lz4).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    fn zstd_roundtrip() {
        let original = b"Hello, World! This is a test of Zstd compression.";
        let compressed = compress(original, CompressionKind::Zstd).unwrap();
        let decompressed = decompress(&compressed, CompressionKind::Zstd).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    fn lz4_rejects_oversized_claim() {
        // Size prefix declaring one byte past the cap, with junk behind it
        let mut forged = ((MAX_PAYLOAD_BYTES + 1) as u32).to_le_bytes().to_vec();
        forged.extend_from_slice(&[0u8; 8]);
        assert!(decompress(&forged, CompressionKind::Lz4).is_err());
    }

    #[test]
    fn lz4_rejects_truncated_input() {
        assert!(decompress(&[0x11, 0x22], CompressionKind::Lz4).is_err());
        assert!(decompress(&[], CompressionKind::Lz4).is_err());
    }

    #[test]
    fn lz4_rejects_garbage_body() {
        // Plausible size prefix, body that is not LZ4 block data
        let mut forged = 64u32.to_le_bytes().to_vec();
        forged.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        assert!(decompress(&forged, CompressionKind::Lz4).is_err());
    }

    #[test]
    fn zstd_rejects_garbage() {
        assert!(decompress(b"not a zstd frame", CompressionKind::Zstd).is_err());
    }

    #[test]
    fn threshold_bypasses_small_payloads() {
        let data = b"tiny";
        let (out, applied) = maybe_compress(data, CompressionKind::Lz4, 512).unwrap();
        assert!(!applied);
        assert_eq!(out, data);
    }

    #[test]
    fn threshold_compresses_large_payloads() {
        let data = vec![1u8; 1024];
        let (out, applied) = maybe_compress(&data, CompressionKind::Lz4, 512).unwrap();
        assert!(applied);
        assert_eq!(decompress(&out, CompressionKind::Lz4).unwrap(), data);
    }
}
