//! Benchmarks for activity file encoding
//!
//! - Record encoding against an established layout (the per-sample hot path)
//! - Finalization CRC cost for both checksum variants
//! - Wheel notification parse + decode

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::{Duration, Instant, SystemTime};
use tirelab::fit::format::system_time_from_fit;
use tirelab::fit::{ActivityFileEncoder, ActivityMessage, ChecksumKind, EncoderOptions, FieldTyping, global};
use tirelab::sensor::{WheelRevolutionDecoder, parse_notification};

fn record(n: u32) -> ActivityMessage {
    let timestamp: SystemTime = system_time_from_fit(1_000_000_000 + n);
    ActivityMessage::new(global::RECORD)
        .with(253, timestamp)
        .with(0, 52.37 + n as f64 * 1e-5)
        .with(1, 4.89 + n as f64 * 1e-5)
        .with(5, (n as i64) * 850)
        .with(6, 8_500i64)
}

fn bench_record_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_encoding");

    for typing in [FieldTyping::Legacy, FieldTyping::Catalogue] {
        let options = EncoderOptions { typing, ..EncoderOptions::default() };
        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("record", format!("{:?}", typing)), |b| {
            let mut encoder = ActivityFileEncoder::new(Vec::new(), options);
            encoder.write(&record(0)).expect("first record");
            let message = record(1);
            b.iter(|| encoder.write(black_box(&message)).expect("record"));
        });
    }

    group.finish();
}

fn bench_finalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("finalize");

    for records in [600u32, 3_600] {
        for checksum in [ChecksumKind::Ccitt, ChecksumKind::FitSdk] {
            group.bench_function(BenchmarkId::new(format!("{:?}", checksum), records), |b| {
                b.iter_batched(
                    || {
                        let options = EncoderOptions { checksum, ..EncoderOptions::default() };
                        let mut encoder = ActivityFileEncoder::new(Vec::new(), options);
                        for n in 0..records {
                            encoder.write(&record(n)).expect("record");
                        }
                        encoder
                    },
                    |encoder| black_box(encoder.finish().expect("finish")),
                    criterion::BatchSize::LargeInput,
                );
            });
        }
    }

    group.finish();
}

fn bench_wheel_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("wheel_decoding");
    let frames: Vec<Vec<u8>> = (0u32..1_000)
        .map(|n| {
            let mut frame = vec![0x01];
            frame.extend_from_slice(&n.wrapping_mul(3).to_le_bytes());
            frame.extend_from_slice(&((n as u16).wrapping_mul(400)).to_le_bytes());
            frame
        })
        .collect();

    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("parse_and_ingest", |b| {
        let start = Instant::now();
        b.iter(|| {
            let mut decoder = WheelRevolutionDecoder::new(2.105);
            for (n, frame) in frames.iter().enumerate() {
                if let Ok(Some(sample)) = parse_notification(black_box(frame)) {
                    decoder.ingest(sample, start + Duration::from_millis(n as u64 * 400));
                }
            }
            black_box(decoder.speed_kmh())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_record_encoding, bench_finalize, bench_wheel_decoding);
criterion_main!(benches);
