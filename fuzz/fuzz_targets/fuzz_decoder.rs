#![no_main]

use framelink::config::FrameLimits;
use framelink::FrameDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Fuzz the streaming decoder - no panics, crashes, or runaway growth
    // regardless of chunking
    let mut decoder = FrameDecoder::new(FrameLimits {
        max_header_bytes: 4096,
        max_payload_bytes: 65536,
        ..FrameLimits::default()
    });

    // Whole-buffer feed
    let _ = decoder.feed(data);

    // Byte-at-a-time feed must behave identically
    let mut decoder = FrameDecoder::new(FrameLimits {
        max_header_bytes: 4096,
        max_payload_bytes: 65536,
        ..FrameLimits::default()
    });
    for &b in data {
        let _ = decoder.append(b);
    }
});
