//! Benchmarks for parameter curves, run whenever a knob or modulation moves.

use std::hint::black_box;

use criterion::Criterion;
use saavy_modular::param::ValueShaper;

pub fn bench_shaper(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/shaper");
    let inputs: Vec<f32> = (0..128).map(|i| i as f32 / 127.0 * 5.0).collect();

    let linear = ValueShaper::linear_range(0.0, 5.0);
    group.bench_function("linear", |b| {
        b.iter(|| inputs.iter().map(|&v| linear.exponential(black_box(v))).sum::<f32>())
    });

    let curved = ValueShaper::linear_range(0.001, 5.0).with_factor(1.0);
    group.bench_function("exponential", |b| {
        b.iter(|| inputs.iter().map(|&v| curved.exponential(black_box(v))).sum::<f32>())
    });

    // Inverse curve (Lambert W)
    group.bench_function("linear_inverse", |b| {
        b.iter(|| inputs.iter().map(|&v| curved.linear(black_box(v))).sum::<f32>())
    });

    let stepped = ValueShaper::new(-24.0, 24.0, 48, 0.0);
    group.bench_function("quantize", |b| {
        b.iter(|| inputs.iter().map(|&v| stepped.quantize(black_box(v))).sum::<f32>())
    });

    group.finish();
}
