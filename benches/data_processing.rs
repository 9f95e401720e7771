//! Benchmarks for per-tick sample processing
//!
//! Run with: cargo bench

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use thermolog_rs::backend::parse_line;
use thermolog_rs::pipeline::{FanOut, LiveBuffer, LiveBufferSink};
use thermolog_rs::SamplePipeline;

fn timestamp() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|d| d.and_hms_opt(10, 30, 0))
        .unwrap_or_default()
}

fn raw_values(channels: usize) -> Vec<Option<f64>> {
    (0..channels)
        .map(|i| if i % 5 == 3 { None } else { Some(20.0 + i as f64 * 0.25) })
        .collect()
}

fn bench_line_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_parsing");

    let lines = [
        ("comma", "23.50,24.10,nan,22.75\r\n"),
        ("units", "23.5C; 24.1C; --; 22.75C\n"),
        ("whitespace", "  23.5   24.1   22.75   21.0  \n"),
    ];
    for (name, line) in lines {
        group.bench_function(name, |b| b.iter(|| black_box(parse_line(black_box(line)))));
    }

    group.finish();
}

fn bench_sample_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_building");
    let ts = timestamp();

    for channels in [4, 16, 64].iter() {
        let pipeline = SamplePipeline::new(*channels);
        let raw = raw_values(*channels);

        group.throughput(Throughput::Elements(*channels as u64));
        group.bench_with_input(BenchmarkId::new("process_at", channels), &raw, |b, raw| {
            b.iter(|| black_box(pipeline.process_at(Some(raw.as_slice()), ts)));
        });

        let sample = pipeline.process_at(Some(raw.as_slice()), ts);
        group.bench_with_input(BenchmarkId::new("csv_row", channels), &sample, |b, sample| {
            b.iter(|| black_box(sample.csv_row()));
        });
    }

    group.finish();
}

fn bench_live_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_buffer");
    let pipeline = SamplePipeline::new(4);
    let sample = pipeline.process_at(Some(raw_values(4).as_slice()), timestamp());

    for size in [1000, 3000, 10_000].iter() {
        let mut buffer = LiveBuffer::new(4, *size);
        for _ in 0..*size {
            buffer.push(&sample);
        }

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("push_at_capacity", size), |b| {
            b.iter(|| buffer.push(black_box(&sample)));
        });

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_function(BenchmarkId::new("series", size), |b| {
            b.iter(|| black_box(buffer.series(0)));
        });
    }

    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    let sample = SamplePipeline::new(4).process_at(Some(raw_values(4).as_slice()), timestamp());

    let mut fanout = FanOut::new().with_sink(LiveBufferSink::new(4, 3000));
    if fanout.open_all().is_ok() {
        group.bench_function("distribute_live_only", |b| {
            b.iter(|| black_box(fanout.distribute(black_box(&sample)).is_ok()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_line_parsing,
    bench_sample_building,
    bench_live_buffer,
    bench_fanout
);
criterion_main!(benches);
