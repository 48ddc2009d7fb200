//! Benchmarks for payload decoding and line protocol encoding.
//!
//! Isolates the per-advertisement CPU work from the async runtime and SQLite.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use govee_logger::output::line_protocol::{encode_lines, measurement_points, pending_record_point};
use govee_logger::{MeasurementRecord, Model, Tenths, decode};

const H5072_PAYLOAD: [u8; 5] = [0x01, 0x83, 0xae, 0xcd, 0x39];
const H5105_PAYLOAD: [u8; 5] = [0x01, 0x01, 0x03, 0xae, 0xcd];

fn record(battery: Option<u8>) -> MeasurementRecord {
    MeasurementRecord {
        timestamp_ns: 1_700_000_000_000_000_000,
        identity: "GVH5072_7705".to_string(),
        nickname: "Living Room".to_string(),
        model: Model::H5072,
        temperature: Tenths(-241),
        humidity: Tenths(357),
        battery,
        rssi: -75,
    }
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("h5072", |b| {
        b.iter(|| decode(black_box(Model::H5072), black_box(&H5072_PAYLOAD)))
    });
    group.bench_function("h5105", |b| {
        b.iter(|| decode(black_box(Model::H5105), black_box(&H5105_PAYLOAD)))
    });
    group.bench_function("invalid", |b| {
        let invalid = [0x01, 0xff, 0xff, 0xff, 0x39];
        b.iter(|| decode(black_box(Model::H5072), black_box(&invalid)))
    });

    group.finish();
}

fn bench_points(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_protocol");
    group.throughput(Throughput::Elements(1));

    let with_battery = record(Some(57));
    group.bench_function("record_with_battery", |b| {
        b.iter(|| encode_lines(&measurement_points(black_box(&with_battery))))
    });

    let without_battery = record(None);
    group.bench_function("record_without_battery", |b| {
        b.iter(|| encode_lines(&measurement_points(black_box(&without_battery))))
    });

    group.bench_function("pending_record", |b| {
        b.iter(|| {
            pending_record_point(
                black_box(42),
                black_box(&with_battery),
                black_box(1_700_000_002_500_000_000),
            )
            .to_string()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_points);
criterion_main!(benches);
