// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

//! Token decoding throughput.
//!
//! Measures:
//! - NDJSON decoding of a generation stream fed in one piece
//! - The same stream fed in small network-sized chunks (split characters)
//! - The stream pump end to end over an in-memory body and channel sink
//!
//! Run: cargo bench --bench decoder_throughput

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use inference_relay::stream::{ChannelSink, NdjsonDecoder, StreamPump};
use inference_relay::upstream::{UpstreamBody, UpstreamError};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `records` token records mixing ASCII and multi-byte text.
fn generation_stream(records: usize) -> Vec<u8> {
    let words = ["The", " quick", " brown", " fox", " jümps", " 日本", " 🦀", "\n"];
    (0..records)
        .map(|i| format!("{}\n", serde_json::json!({ "token": words[i % words.len()] })))
        .collect::<String>()
        .into_bytes()
}

fn decode_chunked(input: &[u8], chunk: usize) -> usize {
    let mut decoder = NdjsonDecoder::new();
    let mut events = 0;
    for piece in input.chunks(chunk) {
        events += decoder.feed(piece).len();
    }
    events + decoder.finish().len()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("ndjson_decode");

    for records in [100, 1_000, 10_000] {
        let input = generation_stream(records);
        group.throughput(Throughput::Bytes(input.len() as u64));

        group.bench_with_input(BenchmarkId::new("single_chunk", records), &input, |b, input| {
            b.iter(|| decode_chunked(black_box(input), input.len().max(1)));
        });

        group.bench_with_input(BenchmarkId::new("chunks_of_7", records), &input, |b, input| {
            b.iter(|| decode_chunked(black_box(input), 7));
        });
    }

    group.finish();
}

fn bench_pump(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_pump");
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let input = generation_stream(1_000);
    let chunks: Vec<Bytes> = input.chunks(512).map(Bytes::copy_from_slice).collect();

    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("1000_records_512b_chunks", |b| {
        b.iter(|| {
            rt.block_on(async {
                let items: Vec<Result<Bytes, UpstreamError>> =
                    chunks.iter().cloned().map(Ok).collect();
                let body = UpstreamBody::Stream(Box::pin(futures_util::stream::iter(items)));
                let (mut sink, mut rx) = ChannelSink::channel(16);

                let drain = tokio::spawn(async move {
                    let mut received = 0usize;
                    while rx.recv().await.is_some() {
                        received += 1;
                    }
                    received
                });
                let outcome = StreamPump::default().run(body, &mut sink).await;
                drop(sink);
                black_box((outcome, drain.await.unwrap()))
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_pump);
criterion_main!(benches);
