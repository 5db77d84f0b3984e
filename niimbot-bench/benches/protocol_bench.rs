//! Protocol encoding/decoding benchmarks.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use niimbot_protocol::frame::Frame;
use niimbot_protocol::response::decode_rfid;
use niimbot_protocol::{encode_image, FrameAssembler, MonoBitmap};

fn create_test_frame(payload_size: usize) -> Frame {
    let payload: Vec<u8> = (0..payload_size).map(|i| i as u8).collect();
    Frame::new(0x85, payload)
}

fn create_label(width: u32, height: u32) -> MonoBitmap {
    // Diagonal stripes so rows differ
    MonoBitmap::from_fn(width, height, |x, y| (x + y) % 7 < 3)
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [1, 32, 255] {
        let frame = create_test_frame(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode().unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [1, 32, 255] {
        let encoded = create_test_frame(size).encode().unwrap().freeze();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| black_box(Frame::decode(encoded).unwrap()));
        });
    }

    group.finish();
}

fn bench_assembler(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembler");

    // A burst of replies split into small reads, as an RFCOMM link delivers them
    for chunk in [8, 64, 256] {
        let mut stream = Vec::new();
        for _ in 0..32 {
            stream.extend_from_slice(&create_test_frame(20).encode().unwrap());
        }
        let stream = Bytes::from(stream);

        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &stream, |b, stream| {
            b.iter(|| {
                let mut assembler = FrameAssembler::new();
                let mut frames = 0;
                for piece in stream.chunks(chunk) {
                    assembler.extend(piece);
                    while let Some(frame) = assembler.next_frame() {
                        black_box(&frame);
                        frames += 1;
                    }
                }
                black_box(frames)
            });
        });
    }

    group.finish();
}

fn bench_decode_rfid(c: &mut Criterion) {
    let mut payload = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
    payload.push(13);
    payload.extend_from_slice(b"6972842743589");
    payload.push(8);
    payload.extend_from_slice(b"PZ1G2345");
    payload.extend_from_slice(&[0x00, 0xA0, 0x00, 0x12, 0x01]);

    c.bench_function("decode_rfid", |b| {
        b.iter(|| black_box(decode_rfid(black_box(&payload)).unwrap()));
    });
}

fn bench_encode_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_image");

    // 15x30 mm, 40x12 mm and 50x80 mm labels at 8 dots/mm
    for (width, height) in [(120, 240), (320, 96), (400, 640)] {
        let label = create_label(width, height);

        group.throughput(Throughput::Elements(height as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &label,
            |b, label| {
                b.iter(|| black_box(encode_image(label).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_assembler,
    bench_decode_rfid,
    bench_encode_image,
);

criterion_main!(benches);
