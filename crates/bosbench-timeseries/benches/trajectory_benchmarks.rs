use bosbench_timeseries::{PointType, TimeseriesConfig, TimeseriesGenerator};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_day_of_mixed_points(c: &mut Criterion) {
    let types: Vec<PointType> = PointType::ALL.iter().cycle().take(1000).copied().collect();
    let config = TimeseriesConfig {
        seed: 42,
        n_steps: 1440,
        ..TimeseriesConfig::default()
    };
    let generator = TimeseriesGenerator::new(config, types).unwrap();

    c.bench_function("timeseries_1000_points_1_day", |b| {
        b.iter(|| black_box(generator.generate_all().unwrap().len()))
    });
}

criterion_group!(benches, bench_day_of_mixed_points);
criterion_main!(benches);
