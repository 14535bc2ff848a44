//! Ring buffer and session throughput benchmark
//!
//! Measures frame-aligned ring buffer transfers and end-to-end session
//! throughput into a discarding sink.
//!
//! **Goal:** moving one second of CD audio should take well under a
//! millisecond through the ring buffer alone.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pcmout_common::config::PlaybackConfig;
use pcmout_common::AudioFormat;
use pcmout_player::{NullSink, PcmRingBuffer, PlaybackController};

fn bench_ring_buffer_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");
    let chunk = vec![0x55u8; 4096];
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    group.bench_function("write_read_4k", |b| {
        let mut ring = PcmRingBuffer::new(16_384, 4).unwrap();
        let mut out = vec![0u8; 4096];

        b.iter(|| {
            let written = ring.write(black_box(&chunk)).unwrap();
            let read = ring.read_into(black_box(&mut out));
            black_box((written, read));
        });
    });

    group.bench_function("wrapping_write_read", |b| {
        // Odd chunk size keeps the cursors crossing the wrap point
        let mut ring = PcmRingBuffer::new(10_000, 4).unwrap();
        let odd = vec![0x33u8; 3_996];
        let mut out = vec![0u8; 3_996];

        b.iter(|| {
            ring.write(black_box(&odd)).unwrap();
            black_box(ring.read_into(&mut out));
        });
    });

    group.finish();
}

fn bench_session_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("session");
    let format = AudioFormat::cd_quality();
    let one_second = vec![0u8; format.bytes_per_second()];
    group.throughput(Throughput::Bytes(one_second.len() as u64));
    group.sample_size(20);

    let controller = PlaybackController::new(PlaybackConfig {
        drain_poll_interval_ms: 1,
        ..PlaybackConfig::default()
    })
    .unwrap();

    group.bench_function("one_second_to_null_sink", |b| {
        b.iter(|| {
            let session = controller.open(format, NullSink::new()).unwrap();
            session.write(black_box(&one_second)).unwrap();
            session.end().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ring_buffer_operations, bench_session_throughput);
criterion_main!(benches);
