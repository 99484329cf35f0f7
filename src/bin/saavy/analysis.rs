//! Offline analysis of a rendered buffer: level and the dominant frequency.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

pub struct Analyzer {
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    sample_rate: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Report {
    pub peak: f32,
    pub rms: f32,
    /// Frequency of the loudest FFT bin, in Hz.
    pub dominant: f32,
}

impl Analyzer {
    pub fn new(fft_len: usize, sample_rate: f32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_len);

        // Hann window
        let window = (0..fft_len)
            .map(|i| {
                if fft_len > 1 {
                    let denom = (fft_len - 1) as f32;
                    0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
                } else {
                    1.0
                }
            })
            .collect();

        Self {
            window,
            fft,
            scratch: vec![Complex::new(0.0, 0.0); fft_len],
            sample_rate,
        }
    }

    /// Analyze the first `fft_len` samples of `buffer` (zero-padded if short).
    pub fn analyze(&mut self, buffer: &[f32]) -> Report {
        let peak = buffer.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()));
        let rms = if buffer.is_empty() {
            0.0
        } else {
            (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
        };

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = buffer.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        // Skip DC.
        let half = self.scratch.len() / 2;
        let loudest = (1..half)
            .max_by(|&a, &b| self.scratch[a].norm_sqr().total_cmp(&self.scratch[b].norm_sqr()))
            .unwrap_or(0);
        let dominant = loudest as f32 * self.sample_rate / self.scratch.len() as f32;

        Report {
            peak,
            rms,
            dominant,
        }
    }
}
