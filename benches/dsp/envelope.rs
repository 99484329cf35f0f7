//! Benchmarks for the ADSR envelope generator.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_modular::dsp::envelope::{Adsr, Envelope};

use crate::BLOCK_SIZES;

const SAMPLE_RATE: f32 = 48_000.0;
const CONTROL_PERIOD: usize = 120;

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/envelope");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        // Attack phase (ramping up)
        let adsr = Adsr::new(0.1, 0.1, 0.7, 0.3);
        let mut env = Envelope::new();
        env.gate_on(&adsr, SAMPLE_RATE);
        group.bench_with_input(BenchmarkId::new("attack", size), &size, |b, _| {
            b.iter(|| {
                env.render(black_box(&mut buffer), &adsr, SAMPLE_RATE, CONTROL_PERIOD);
            })
        });

        // Sustain phase (holding steady)
        let adsr = Adsr::new(0.001, 0.001, 0.7, 0.3);
        let mut env = Envelope::new();
        env.gate_on(&adsr, SAMPLE_RATE);
        let mut warmup = vec![0.0f32; 480];
        env.render(&mut warmup, &adsr, SAMPLE_RATE, CONTROL_PERIOD);
        group.bench_with_input(BenchmarkId::new("sustain", size), &size, |b, _| {
            b.iter(|| {
                env.render(black_box(&mut buffer), &adsr, SAMPLE_RATE, CONTROL_PERIOD);
            })
        });

        // Release phase (ramping down)
        let adsr = Adsr::new(0.001, 0.001, 0.7, 5.0);
        let mut env = Envelope::new();
        env.gate_on(&adsr, SAMPLE_RATE);
        env.render(&mut warmup, &adsr, SAMPLE_RATE, CONTROL_PERIOD);
        env.gate_off(&adsr, SAMPLE_RATE);
        group.bench_with_input(BenchmarkId::new("release", size), &size, |b, _| {
            b.iter(|| {
                env.render(black_box(&mut buffer), &adsr, SAMPLE_RATE, CONTROL_PERIOD);
            })
        });
    }

    group.finish();
}
