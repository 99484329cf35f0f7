//! Benchmarks for oscillator waveform generation.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_modular::dsp::oscillator::OscillatorBlock;

use crate::BLOCK_SIZES;

const SAMPLE_RATE: f32 = 48_000.0;

pub fn bench_oscillator(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/oscillator");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        let waveforms = [
            ("sine", OscillatorBlock::sine()),
            // PolyBLEP corrections at each wrap
            ("sawtooth", OscillatorBlock::sawtooth()),
            ("square", OscillatorBlock::square()),
            ("triangle", OscillatorBlock::triangle()),
            // xorshift PRNG
            ("noise", OscillatorBlock::noise()),
        ];
        for (name, mut osc) in waveforms {
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    osc.render(black_box(&mut buffer), black_box(440.0), SAMPLE_RATE);
                })
            });
        }
    }

    group.finish();
}
