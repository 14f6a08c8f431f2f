use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use framelink::config::FrameLimits;
use framelink::core::packet::{Headers, PacketFlags, PacketKind};
use framelink::core::receiver::FrameDecoder;
use framelink::{Frame, FrameCodec};
use tokio_util::codec::Encoder;

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];
    let limits = FrameLimits::default();

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || vec![0u8; size],
                |payload| {
                    let frame = Frame {
                        kind: PacketKind::Bytes,
                        flags: PacketFlags::empty(),
                        headers: Headers::new(),
                        payload,
                    };
                    let mut buf = BytesMut::with_capacity(size + 32);
                    let mut codec = FrameCodec::default();
                    codec.encode(frame, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("decode_{size}b"), |b| {
            let frame = Frame {
                kind: PacketKind::Bytes,
                flags: PacketFlags::empty(),
                headers: Headers::new(),
                payload: vec![0u8; size],
            };
            let bytes = frame.encode(&limits).unwrap();
            b.iter(|| {
                let decoded = Frame::from_bytes(&bytes, &limits);
                assert!(decoded.is_ok());
            })
        });

        group.bench_function(format!("stream_decode_{size}b"), |b| {
            let frame = Frame {
                kind: PacketKind::Bytes,
                flags: PacketFlags::empty(),
                headers: Headers::new(),
                payload: vec![0u8; size],
            };
            let bytes = frame.encode(&limits).unwrap();
            b.iter(|| {
                let mut decoder = FrameDecoder::new(limits.clone());
                let events = decoder.feed(&bytes);
                assert_eq!(events.len(), 1);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frame_encode_decode);
criterion_main!(benches);
