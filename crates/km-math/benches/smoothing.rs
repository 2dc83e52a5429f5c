use criterion::{black_box, criterion_group, criterion_main, Criterion};
use km_math::{linspace, smooth_mirrored};

fn bench_smoothing(c: &mut Criterion) {
    // A ten-hour firing sampled every two seconds.
    let n = 18_000;
    let x = linspace(0.0, 10.0, n);
    let y: Vec<f64> = x.iter().map(|t| 70.0 + 200.0 * t + (t * 37.0).sin()).collect();

    c.bench_function("smooth_mirrored_10h_1min", |b| {
        b.iter(|| smooth_mirrored(black_box(&x), black_box(&y), black_box(1.0 / 60.0)))
    });
}

criterion_group!(benches, bench_smoothing);
criterion_main!(benches);
