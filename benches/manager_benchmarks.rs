//! Criterion benchmarks for rust_log_manager

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_log_manager::prelude::*;
use rust_log_manager::FormatRenderer;
use std::io;
use std::sync::Arc;
use std::thread;

fn discard_manager(format: &str, level: Severity) -> LogManager {
    LogManager::new(
        ManagerConfig::default()
            .with_format(format)
            .with_sink(SinkConfig::writer("sink", io::sink()).with_min_severity(level)),
    )
    .expect("valid configuration")
}

// ============================================================================
// Rendering Benchmarks
// ============================================================================

fn bench_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendering");
    group.throughput(Throughput::Elements(1));

    let record = Record::new(Severity::Info, "User login successful")
        .with_field("user_id", 12345)
        .with_field("ip", "192.168.1.1")
        .with_logger("auth");

    for template in ["plain", "colorized", "json", rust_log_manager::DEFAULT_LOG_FORMAT] {
        let renderer = FormatRenderer::compile(template, false).expect("valid template");
        let label = if template.contains('{') { "default" } else { template };
        group.bench_with_input(BenchmarkId::from_parameter(label), &renderer, |b, renderer| {
            b.iter(|| black_box(renderer.render(black_box(&record))));
        });
    }

    group.finish();
}

// ============================================================================
// Emission Benchmarks
// ============================================================================

fn bench_emission(c: &mut Criterion) {
    let mut group = c.benchmark_group("emission");
    group.throughput(Throughput::Elements(1));

    let manager = discard_manager("{message}", Severity::Debug);
    group.bench_function("info", |b| {
        b.iter(|| manager.info(black_box("Info message")));
    });

    group.bench_function("with_fields", |b| {
        b.iter(|| {
            manager.log_with_fields(
                Severity::Info,
                black_box("Request handled"),
                Fields::new().with("status", 200).with("path", "/api/users"),
            )
        });
    });

    let binding = manager
        .bind("bench", BindingConfig::new().with_field("service", "bench"))
        .expect("valid binding");
    group.bench_function("binding", |b| {
        b.iter(|| binding.info(black_box("Bound message")));
    });

    group.finish();
}

fn bench_severity_filtering(c: &mut Criterion) {
    let mut group = c.benchmark_group("severity_filtering");
    group.throughput(Throughput::Elements(1));

    let manager = discard_manager("{message}", Severity::Error);
    group.bench_function("filtered", |b| {
        b.iter(|| manager.debug(black_box("Filtered out")));
    });
    group.bench_function("accepted", |b| {
        b.iter(|| manager.error(black_box("Written")));
    });

    group.finish();
}

// ============================================================================
// File Sink Benchmarks
// ============================================================================

fn bench_file_sink(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_sink");
    group.throughput(Throughput::Elements(1));

    let temp_dir = tempfile::tempdir().expect("temp dir");
    let manager = LogManager::new(
        ManagerConfig::new(temp_dir.path())
            .with_format("{message}")
            .with_sink(SinkConfig::file(
                "file",
                FileSinkOptions::new("bench.log")
                    .with_rotation(RotationTrigger::Size(1_000_000))
                    .with_retention(RetentionPolicy::Count(2))
                    .with_compression(Compression::None),
            )),
    )
    .expect("valid configuration");

    group.bench_function("write_with_rotation", |b| {
        b.iter(|| manager.info(black_box("A reasonably sized log line for the file sink benchmark")));
    });

    group.finish();
}

fn bench_concurrent_emission(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_emission");

    for threads in [2usize, 4, 8] {
        let per_thread = 1_000;
        group.throughput(Throughput::Elements((threads * per_thread) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let manager = Arc::new(discard_manager("{message}", Severity::Debug));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let manager = Arc::clone(&manager);
                        thread::spawn(move || {
                            for _ in 0..per_thread {
                                manager.info("Concurrent message");
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.join();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_rendering,
    bench_emission,
    bench_severity_filtering,
    bench_file_sink,
    bench_concurrent_emission
);
criterion_main!(benches);
