//! Benchmark suite for the data path.
//!
//! Run with: `cargo bench`
//!
//! This benchmark measures:
//! - Rolling statistics over one price series
//! - Feature building across instruments
//! - Windowing and scaling
//! - Forward pass of the regressor

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use return_forecast::{
    preprocessing::{pct_change, trailing_std, StandardScaler},
    ArtifactFingerprint, BuildMode, FeatureBuilder, FeatureConfig, ModelConfig, ObservationRow,
    ObservationTable, SequenceConfig, SequenceRegressor, WindowMode, Windower,
};

/// Minute bars with a slow oscillation so every feature is non-degenerate.
fn create_table(instruments: usize, rows: usize) -> ObservationTable {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut out = Vec::with_capacity(instruments * rows);
    for k in 0..instruments {
        let id = format!("COIN{k:02}");
        for i in 0..rows {
            let phase = i as f64 * 0.01 + k as f64;
            out.push(ObservationRow::new(
                id.as_str(),
                base + Duration::minutes(i as i64),
                100.0 + phase.sin() * 5.0,
                1_000.0 + (i % 37) as f64,
                (phase * 0.3).cos() * 0.5,
            ));
        }
    }
    ObservationTable::new(out)
}

fn bench_rolling(c: &mut Criterion) {
    let mut group = c.benchmark_group("rolling");
    let prices: Vec<f64> = (0..10_000).map(|i| 100.0 + (i as f64 * 0.01).sin()).collect();

    group.throughput(Throughput::Elements(prices.len() as u64));
    for window in [5, 15, 30].iter() {
        group.bench_with_input(BenchmarkId::new("pct_change", window), window, |b, &w| {
            b.iter(|| black_box(pct_change(black_box(&prices), w)))
        });
        group.bench_with_input(BenchmarkId::new("trailing_std", window), window, |b, &w| {
            b.iter(|| black_box(trailing_std(black_box(&prices), w)))
        });
    }

    group.finish();
}

fn bench_feature_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_builder");
    let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();

    for instruments in [1, 4, 16].iter() {
        let table = create_table(*instruments, 2_000);
        group.throughput(Throughput::Elements(table.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("training", instruments),
            &table,
            |b, table| b.iter(|| black_box(builder.build(black_box(table)).unwrap())),
        );
        group.bench_with_input(
            BenchmarkId::new("inference", instruments),
            &table,
            |b, table| {
                b.iter(|| {
                    black_box(
                        builder
                            .build_with_mode(black_box(table), BuildMode::Inference)
                            .unwrap(),
                    )
                })
            },
        );
    }

    group.finish();
}

fn bench_windowing(c: &mut Criterion) {
    let mut group = c.benchmark_group("windowing");
    let config = FeatureConfig::default();
    let features = FeatureBuilder::new(config.clone())
        .unwrap()
        .build(&create_table(4, 2_000))
        .unwrap();

    for window in [20, 60].iter() {
        let windower = Windower::new(SequenceConfig::from_feature_config(*window, &config)).unwrap();
        group.bench_with_input(BenchmarkId::new("window_table", window), window, |b, _| {
            b.iter(|| black_box(windower.window_table(black_box(&features), WindowMode::Training).unwrap()))
        });

        let sequences = windower.window_table(&features, WindowMode::Training).unwrap();
        group.throughput(Throughput::Elements(sequences.len() as u64));
        group.bench_with_input(BenchmarkId::new("scale", window), &sequences, |b, seqs| {
            b.iter(|| {
                let mut scaler =
                    StandardScaler::new(ArtifactFingerprint::new(config.feature_names(), *window));
                scaler.fit(seqs).unwrap();
                black_box(scaler.transform(seqs).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_forward_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_pass");
    let config = FeatureConfig::default();
    let features = FeatureBuilder::new(config.clone())
        .unwrap()
        .build(&create_table(1, 600))
        .unwrap();
    let windower = Windower::new(SequenceConfig::from_feature_config(20, &config)).unwrap();
    let sequences = windower.window_table(&features, WindowMode::Training).unwrap();

    for hidden in [16, 64].iter() {
        let model_config = ModelConfig {
            hidden_size: *hidden,
            depth: 2,
            dropout: 0.0,
        };
        let model = SequenceRegressor::lstm(&model_config, config.feature_count(), 42).unwrap();
        group.throughput(Throughput::Elements(sequences.len() as u64));
        group.bench_with_input(BenchmarkId::new("predict", hidden), &sequences, |b, seqs| {
            b.iter(|| black_box(model.predict(black_box(seqs)).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_rolling,
    bench_feature_builder,
    bench_windowing,
    bench_forward_pass,
);

criterion_main!(benches);
