#![no_main]

use framelink::utils::compression::{decompress, CompressionKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decompression of arbitrary bytes must error, never panic or OOM
    let _ = decompress(data, CompressionKind::Lz4);
    let _ = decompress(data, CompressionKind::Zstd);
});
