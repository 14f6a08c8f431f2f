#![no_main]

use framelink::config::FrameLimits;
use framelink::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Fuzz whole-frame parsing - test for panics, crashes, over-allocation
    let _ = Frame::from_bytes(data, &FrameLimits::default());
});
