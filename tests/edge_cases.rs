#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests for boundary conditions, malformed input, resource
//! limits, and the literal wire-format scenarios.

use framelink::config::{FrameLimits, TransportConfig, FRAME_OVERHEAD};
use framelink::core::frame::{DELIMITER_LEN, MIN_FRAME_LEN};
use framelink::core::packet::{keys, Headers, Packet, PacketFlags, PacketKind};
use framelink::core::pipeline::TransformContext;
use framelink::core::receiver::{FrameDecoder, ReceiveEvent};
use framelink::utils::archive::{pack_tree, unpack_tree};
use framelink::utils::crypto::preshared_digest_hex;
use framelink::{Frame, WireError};

fn decode_one(bytes: &[u8]) -> Frame {
    let mut decoder = FrameDecoder::new(FrameLimits::default());
    let mut events = decoder.feed(bytes);
    assert_eq!(events.len(), 1, "expected one event, got {events:?}");
    match events.pop().unwrap() {
        ReceiveEvent::PacketReady(frame) => frame,
        other => panic!("expected frame, got {other:?}"),
    }
}

// ============================================================================
// FRAME PARSING EDGE CASES
// ============================================================================

#[test]
fn empty_buffer_rejected() {
    let limits = FrameLimits::default();
    assert!(Frame::from_bytes(&[], &limits).is_err());
}

#[test]
fn minimum_frame_is_twelve_bytes() {
    let limits = FrameLimits::default();
    let frame = Frame {
        kind: PacketKind::Request,
        flags: PacketFlags::empty(),
        headers: Headers::new(),
        payload: Vec::new(),
    };
    let bytes = frame.encode(&limits).unwrap();
    assert_eq!(bytes.len(), MIN_FRAME_LEN);
    assert!(Frame::from_bytes(&bytes[..MIN_FRAME_LEN - 1], &limits).is_err());
}

#[test]
fn forged_header_length_rejected_without_allocation() {
    // A declared header-length above the cap must desync immediately on
    // reading the length field, before any header bytes arrive.
    let limits = FrameLimits {
        max_header_bytes: 1024,
        ..FrameLimits::default()
    };
    let mut decoder = FrameDecoder::new(limits);

    let mut bytes = vec![PacketKind::Message.wire()];
    bytes.extend((1025u16).to_be_bytes());

    let events = decoder.feed(&bytes);
    assert_eq!(events, vec![ReceiveEvent::Desync]);
    assert!(decoder.is_resyncing());
}

#[test]
fn forged_payload_length_rejected() {
    let limits = FrameLimits {
        max_payload_bytes: 4096,
        ..FrameLimits::default()
    };
    let mut decoder = FrameDecoder::new(limits);

    let mut bytes = vec![PacketKind::Bytes.wire()];
    bytes.extend((0u16).to_be_bytes());
    bytes.push(0);
    bytes.extend((1_000_000u32).to_be_bytes());

    let events = decoder.feed(&bytes);
    assert_eq!(events, vec![ReceiveEvent::Desync]);
}

#[test]
fn unknown_kind_tag_desyncs_then_recovers() {
    let limits = FrameLimits::default();
    let mut decoder = FrameDecoder::new(limits.clone());

    let good = Frame {
        kind: PacketKind::Message,
        flags: PacketFlags::empty(),
        headers: Headers::new(),
        payload: b"after".to_vec(),
    };

    let mut bytes = vec![0x7F]; // not a kind tag
    bytes.extend(good.encode(&limits).unwrap());

    let events = decoder.feed(&bytes);
    assert_eq!(
        events,
        vec![
            ReceiveEvent::Desync,
            ReceiveEvent::PacketReady(good)
        ]
    );
}

#[test]
fn oversized_outbound_packet_fails_with_too_large() {
    let limits = FrameLimits {
        max_payload_bytes: 64,
        ..FrameLimits::default()
    };
    let ctx = TransformContext::plaintext(limits);
    let result = ctx.seal(Packet::bytes(vec![0u8; 65]));
    assert!(matches!(result, Err(WireError::TooLarge(_))));
}

#[test]
fn header_block_with_forbidden_chars_never_encodes() {
    let mut headers = Headers::new();
    assert!(matches!(
        headers.insert("key", "a=b"),
        Err(WireError::InvalidPacket(_))
    ));
    assert!(matches!(
        headers.insert("multi\nline", "v"),
        Err(WireError::InvalidPacket(_))
    ));
}

// ============================================================================
// PIPELINE EDGE CASES
// ============================================================================

#[test]
fn content_length_mismatch_dropped() {
    let ctx = TransformContext::plaintext(FrameLimits::default());
    let mut headers = Headers::new();
    headers.insert(keys::CONTENT_LENGTH, "999").unwrap();
    let frame = Frame {
        kind: PacketKind::Bytes,
        flags: PacketFlags::empty(),
        headers,
        payload: vec![1, 2, 3],
    };
    assert!(matches!(
        ctx.open(frame),
        Err(WireError::InvalidPacket(_))
    ));
}

#[test]
fn encrypted_frame_missing_digest_dropped() {
    let ctx = TransformContext::new(&TransportConfig {
        encryption_passphrase: Some("s3cret".into()),
        ..TransportConfig::default()
    });
    let mut flags = PacketFlags::empty();
    flags.insert(PacketFlags::ENCRYPTED);
    let frame = Frame {
        kind: PacketKind::Bytes,
        flags,
        headers: Headers::new(),
        payload: vec![0u8; 64],
    };
    assert!(matches!(
        ctx.open(frame),
        Err(WireError::InvalidPacket(_))
    ));
}

#[test]
fn tampered_ciphertext_dropped() {
    let ctx = TransformContext::new(&TransportConfig {
        encryption_passphrase: Some("s3cret".into()),
        ..TransportConfig::default()
    });
    let bytes = ctx.seal(Packet::bytes(vec![1, 2, 3, 4])).unwrap();
    let mut frame = decode_one(&bytes);
    let last = frame.payload.len() - 1;
    frame.payload[last] ^= 0xFF;
    assert!(matches!(
        ctx.open(frame),
        Err(WireError::DecryptionFailure)
    ));
}

#[test]
fn corrupt_compressed_payload_dropped() {
    let ctx = TransformContext::new(&TransportConfig {
        compression_enabled: true,
        compression_threshold_bytes: 8,
        ..TransportConfig::default()
    });
    let bytes = ctx.seal(Packet::bytes(vec![7u8; 256])).unwrap();
    let mut frame = decode_one(&bytes);
    // Forge the LZ4 size prefix to claim a multi-gigabyte expansion
    frame.payload[..4].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(ctx.open(frame).is_err());
}

// ============================================================================
// LITERAL SCENARIOS
// ============================================================================

#[test]
fn scenario_text_frame_layout() {
    // kind=Message, payload "hello", content-length header "5"
    let ctx = TransformContext::plaintext(FrameLimits::default());
    let bytes = ctx.seal(Packet::text("hello")).unwrap();

    let frame = decode_one(&bytes);
    assert_eq!(frame.kind, PacketKind::Message);
    assert_eq!(frame.headers.get(keys::CONTENT_LENGTH), Some("5"));
    assert_eq!(frame.payload, [0x68, 0x65, 0x6c, 0x6c, 0x6f]);
}

#[test]
fn scenario_encrypted_bytes_frame_length() {
    // Encoded frame length = overhead + header block + ciphertext + delimiter
    let ctx = TransformContext::new(&TransportConfig {
        encryption_passphrase: Some("s3cret".into()),
        ..TransportConfig::default()
    });
    let bytes = ctx
        .seal(Packet::bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]))
        .unwrap();

    let frame = decode_one(&bytes);
    let header_block = frame.headers.encode();
    assert_eq!(
        bytes.len(),
        FRAME_OVERHEAD + header_block.len() + frame.payload.len() + DELIMITER_LEN
    );

    let opened = ctx.open(frame).unwrap();
    assert_eq!(opened.payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);

    let wrong = TransformContext::new(&TransportConfig {
        encryption_passphrase: Some("wrong".into()),
        ..TransportConfig::default()
    });
    assert!(matches!(
        wrong.open(decode_one(&bytes)),
        Err(WireError::WrongKey)
    ));
}

#[test]
fn scenario_fragmented_delivery_fires_exactly_once() {
    let ctx = TransformContext::plaintext(FrameLimits::default());
    let bytes = ctx.seal(Packet::text("hello")).unwrap();

    let mut decoder = FrameDecoder::new(FrameLimits::default());
    for &b in &bytes[..bytes.len() - 1] {
        assert_eq!(decoder.append(b), ReceiveEvent::NeedMore);
    }
    match decoder.append(bytes[bytes.len() - 1]) {
        ReceiveEvent::PacketReady(frame) => assert_eq!(frame.payload, b"hello"),
        other => panic!("expected frame, got {other:?}"),
    }
}

#[test]
fn scenario_compressed_directory_roundtrip() {
    let src = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("one.txt"), b"first file").unwrap();
    std::fs::write(src.path().join("two.bin"), vec![0xA5; 2048]).unwrap();
    std::fs::create_dir(src.path().join("sub")).unwrap();
    std::fs::write(src.path().join("sub/three.log"), b"nested").unwrap();

    let archive = pack_tree(src.path()).unwrap();
    let packet = Packet::directory("tree.tar.gz", archive).unwrap();
    assert!(packet.flags.contains(PacketFlags::COMPRESSED));

    let ctx = TransformContext::plaintext(FrameLimits::default());
    let bytes = ctx.seal(packet).unwrap();
    let received = ctx.open(decode_one(&bytes)).unwrap();
    assert_eq!(received.kind, PacketKind::Directory);
    assert_eq!(received.filename(), Some("tree.tar.gz"));

    let dest = tempfile::tempdir().unwrap();
    unpack_tree(&received.payload, dest.path()).unwrap();

    for (path, expected) in [
        ("one.txt", b"first file".to_vec()),
        ("two.bin", vec![0xA5; 2048]),
        ("sub/three.log", b"nested".to_vec()),
    ] {
        assert_eq!(std::fs::read(dest.path().join(path)).unwrap(), expected);
    }
}

#[test]
fn file_transfer_roundtrip() {
    let ctx = TransformContext::new(&TransportConfig {
        compression_enabled: true,
        compression_threshold_bytes: 64,
        ..TransportConfig::default()
    });

    let contents = vec![0x42u8; 8192];
    let packet = Packet::file("report.bin", contents.clone()).unwrap();
    let bytes = ctx.seal(packet).unwrap();

    let received = ctx.open(decode_one(&bytes)).unwrap();
    assert_eq!(received.kind, PacketKind::File);
    assert_eq!(received.filename(), Some("report.bin"));
    assert_eq!(received.content_length(), Some(8192));
    assert_eq!(received.payload, contents);
}

// ============================================================================
// AUTH DIGEST EDGE CASES
// ============================================================================

#[test]
fn auth_packet_carries_hex_digest() {
    let digest = preshared_digest_hex("group-secret");
    let packet = Packet::auth(&digest, Some("client-7")).unwrap();
    assert_eq!(packet.kind, PacketKind::Auth);
    assert_eq!(packet.client_id(), Some("client-7"));
    assert_eq!(packet.preshared_hash().unwrap().len(), 32);
    packet.validate().unwrap();
}

#[test]
fn digest_differs_per_secret() {
    assert_ne!(
        preshared_digest_hex("alpha"),
        preshared_digest_hex("beta")
    );
}
