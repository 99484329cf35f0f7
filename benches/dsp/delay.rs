//! Benchmarks for delay line operations.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_modular::dsp::delay::DelayLine;

use crate::BLOCK_SIZES;

pub fn bench_delay(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/delay");

    // Delay times in samples at 48kHz: 10ms, 100ms, 1s
    let delay_times: &[f32] = &[480.0, 4800.0, 48_000.0];

    for &size in BLOCK_SIZES {
        let input: Vec<f32> = (0..size).map(|i| (i as f32 * 0.1).sin()).collect();

        for &delay_samples in delay_times {
            let mut delay = DelayLine::with_capacity(96_002);
            let mut buffer = input.clone();
            group.bench_with_input(
                BenchmarkId::new(format!("render_{}ms", (delay_samples / 48.0) as u32), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        buffer.copy_from_slice(&input);
                        delay.render(black_box(&mut buffer), black_box(delay_samples), 0.4);
                    })
                },
            );
        }

        // Modulated fractional reads
        let mut delay = DelayLine::with_capacity(4_800);
        for &sample in &input {
            delay.write(sample);
        }
        group.bench_with_input(BenchmarkId::new("read_modulated", size), &size, |b, _| {
            b.iter(|| {
                let mut sum = 0.0f32;
                for i in 0..size {
                    let delay_time = 480.0 + (i as f32 * 0.1).sin() * 48.0;
                    sum += delay.read(black_box(delay_time));
                }
                sum
            })
        });
    }

    group.finish();
}
