//! Codec benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use osp_core::{codec, varint, Message, PresentationStartRequest};

fn start_request() -> Message {
    Message::PresentationStartRequest(PresentationStartRequest {
        request_id: 42,
        presentation_id: "0f8e2b6c-6a4e-4f8e-9d5c-3c1b2a7d9e10".to_string(),
        url: "https://github.com/webscreens/openscreenprotocol".to_string(),
    })
}

fn encode_benchmark(c: &mut Criterion) {
    let msg = start_request();

    c.bench_function("encode_start_request", |b| {
        b.iter(|| black_box(codec::encode(&msg).unwrap()))
    });
}

fn decode_benchmark(c: &mut Criterion) {
    let encoded = codec::encode(&start_request()).unwrap();

    c.bench_function("decode_start_request", |b| {
        b.iter(|| black_box(codec::decode(&encoded).unwrap()))
    });
}

fn varint_benchmark(c: &mut Criterion) {
    let values = [0u64, 127, 128, 1 << 35, u64::MAX];

    c.bench_function("varint_roundtrip", |b| {
        b.iter(|| {
            for &value in &values {
                let encoded = varint::encode_varint_vec(value);
                black_box(varint::decode_varint(&encoded).unwrap());
            }
        })
    });
}

criterion_group!(benches, encode_benchmark, decode_benchmark, varint_benchmark);
criterion_main!(benches);
