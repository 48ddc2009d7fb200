//! Benchmarks for the buffered pipeline.
//!
//! Covers the ingest path (registry lookup, decode, throttle) and a full
//! enqueue → drain → delete cycle against an in-memory buffer and a sink
//! that discards everything.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use govee_logger::ingest::Ingester;
use govee_logger::output::SinkFuture;
use govee_logger::output::line_protocol::DataPoint;
use govee_logger::{
    Advertisement, Drainer, IngestionBuffer, MacAddress, MeasurementRecord, Model, Registry,
    SensorConfig, Sink, Tenths, UplinkConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::runtime::Runtime;

struct NullSink;

impl Sink for NullSink {
    fn ping(&self) -> SinkFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn write<'a>(&'a self, _destination: &'a str, points: &'a [DataPoint]) -> SinkFuture<'a> {
        black_box(points);
        Box::pin(async { Ok(()) })
    }
}

fn registry() -> Arc<Registry> {
    let sensors: Vec<SensorConfig> = (0..10)
        .map(|i| SensorConfig {
            identity: format!("GVH5072_{i:04}"),
            nickname: format!("Room {i}"),
            model: Model::H5072,
        })
        .collect();
    Arc::new(Registry::new(&sensors).unwrap())
}

fn advertisement(name: &str) -> Advertisement {
    Advertisement {
        name: Some(name.to_string()),
        mac: MacAddress([0xA4, 0xC1, 0x38, 0x00, 0x77, 0x05]),
        manufacturer_data: Some(vec![0x01, 0x03, 0xae, 0xcd, 0x39]),
        rssi: -75,
    }
}

fn record(timestamp_ns: i64) -> MeasurementRecord {
    MeasurementRecord {
        timestamp_ns,
        identity: "GVH5072_0001".to_string(),
        nickname: "Room 1".to_string(),
        model: Model::H5072,
        temperature: Tenths(241),
        humidity: Tenths(357),
        battery: Some(57),
        rssi: -75,
    }
}

fn bench_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe");
    group.throughput(Throughput::Elements(1));

    let monitored = advertisement("GVH5072_0001");
    let unmonitored = advertisement("LE-Bose");

    let mut ingester = Ingester::new(registry(), None);
    group.bench_function("monitored", |b| {
        b.iter(|| ingester.observe(black_box(&monitored), SystemTime::now(), Instant::now()))
    });
    group.bench_function("unmonitored", |b| {
        b.iter(|| ingester.observe(black_box(&unmonitored), SystemTime::now(), Instant::now()))
    });

    let mut throttled = Ingester::new(registry(), Some(Duration::from_secs(3600)));
    group.bench_function("throttled", |b| {
        b.iter(|| throttled.observe(black_box(&monitored), SystemTime::now(), Instant::now()))
    });

    group.finish();
}

fn bench_buffer_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_cycle");
    let rt = Runtime::new().unwrap();
    let sink = Arc::new(NullSink);

    for batch_size in [1usize, 100, 1000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &size| {
                let buffer = IngestionBuffer::open_in_memory().unwrap();
                let mut drainer = Drainer::new(
                    buffer.clone(),
                    sink.clone(),
                    UplinkConfig {
                        interval: Duration::from_secs(10),
                        batch_size: size,
                        bucket: "thermometers".to_string(),
                        derived_bucket: Some("thermometers-derived".to_string()),
                    },
                );
                let mut next_timestamp = 0;

                b.iter(|| {
                    for _ in 0..size {
                        next_timestamp += 1;
                        buffer.enqueue(&record(next_timestamp)).unwrap();
                    }
                    let outcome = rt.block_on(drainer.drain_once()).unwrap();
                    black_box(outcome)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_observe, bench_buffer_cycle);
criterion_main!(benches);
