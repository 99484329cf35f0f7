use std::f32::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Band-Limited Waveforms
======================

A naive sawtooth jumps from +1 to -1 in a single sample. That discontinuity
contains energy far above Nyquist, which folds back into the audible band as
inharmonic aliasing. The higher the note, the worse it gets.

PolyBLEP (polynomial band-limited step) smooths the jump with a two-sample
polynomial correction centred on the discontinuity:

    t = phase, dt = frequency / sample_rate

    t < dt        (just after the jump)    2u − u² − 1,  u = t / dt
    t > 1 − dt    (just before the jump)   u² + 2u + 1,  u = (t − 1) / dt
    otherwise                              0

Saw subtracts one correction at phase 0; square adds one at phase 0 and
subtracts one at phase 0.5. Sine and triangle have no jumps and stay naive.
*/

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscillatorWaveform {
    Sine,
    Saw,
    Square,
    Triangle,
    Noise,
}

impl OscillatorWaveform {
    pub const ALL: [OscillatorWaveform; 5] = [
        OscillatorWaveform::Sine,
        OscillatorWaveform::Saw,
        OscillatorWaveform::Square,
        OscillatorWaveform::Triangle,
        OscillatorWaveform::Noise,
    ];

    /// Waveform for a switch parameter position (rounded, clamped).
    pub fn from_index(value: f32) -> Self {
        let index = if value.is_nan() { 0.0 } else { value.round() };
        let index = index.clamp(0.0, (Self::ALL.len() - 1) as f32) as usize;
        Self::ALL[index]
    }
}

/// Two-sample polynomial correction around a unit step at phase 0.
#[inline]
pub fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let u = t / dt;
        u + u - u * u - 1.0
    } else if t > 1.0 - dt {
        let u = (t - 1.0) / dt;
        u * u + u + u + 1.0
    } else {
        0.0
    }
}

/// Xorshift white noise; cheap and deterministic per seed.
#[derive(Debug, Clone, Copy)]
pub struct Noise {
    state: u32,
}

impl Noise {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

/// Phase-accumulating oscillator for one voice.
#[derive(Debug, Clone, Copy)]
pub struct OscillatorBlock {
    waveform: OscillatorWaveform,
    phase: f32,
    noise: Noise,
}

impl OscillatorBlock {
    pub fn new(waveform: OscillatorWaveform) -> Self {
        Self {
            waveform,
            phase: 0.0,
            noise: Noise::new(1),
        }
    }

    pub fn sine() -> Self {
        Self::new(OscillatorWaveform::Sine)
    }

    pub fn sawtooth() -> Self {
        Self::new(OscillatorWaveform::Saw)
    }

    pub fn square() -> Self {
        Self::new(OscillatorWaveform::Square)
    }

    pub fn triangle() -> Self {
        Self::new(OscillatorWaveform::Triangle)
    }

    pub fn noise() -> Self {
        Self::new(OscillatorWaveform::Noise)
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.noise = Noise::new(seed);
        self
    }

    pub fn waveform(&self) -> OscillatorWaveform {
        self.waveform
    }

    pub fn set_waveform(&mut self, waveform: OscillatorWaveform) {
        self.waveform = waveform;
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    #[inline]
    pub fn next_sample(&mut self, frequency: f32, sample_rate: f32) -> f32 {
        let dt = frequency / sample_rate;
        let t = self.phase;
        let sample = match self.waveform {
            OscillatorWaveform::Sine => (TAU * t).sin(),
            OscillatorWaveform::Saw => 2.0 * t - 1.0 - poly_blep(t, dt),
            OscillatorWaveform::Square => {
                let naive = if t < 0.5 { 1.0 } else { -1.0 };
                let half = t + 0.5;
                let half = half - half.floor();
                naive + poly_blep(t, dt) - poly_blep(half, dt)
            }
            OscillatorWaveform::Triangle => 1.0 - 4.0 * (t - 0.5).abs(),
            OscillatorWaveform::Noise => self.noise.next_sample(),
        };

        let next = t + dt;
        self.phase = if next.is_finite() { next - next.floor() } else { 0.0 };
        sample
    }

    pub fn render(&mut self, out: &mut [f32], frequency: f32, sample_rate: f32) {
        for sample in out.iter_mut() {
            *sample = self.next_sample(frequency, sample_rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_sine() {
        let sample_rate = 48_000.0;
        let frequency = 440.0;
        let mut osc = OscillatorBlock::sine();

        let mut buffer = vec![0.0f32; 128];
        osc.render(&mut buffer, frequency, sample_rate);

        // sample n should be sin(2pi f n / sr)
        let sample_index = 12;
        let expected = (TAU * frequency * sample_index as f32 / sample_rate).sin();
        let actual = buffer[sample_index];
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn band_limited_shapes_stay_bounded() {
        for waveform in OscillatorWaveform::ALL {
            let mut osc = OscillatorBlock::new(waveform);
            let mut buffer = vec![0.0f32; 4_800];
            osc.render(&mut buffer, 1_234.5, 48_000.0);
            assert!(
                buffer.iter().all(|s| s.is_finite() && s.abs() <= 1.01),
                "{waveform:?} out of range"
            );
        }
    }

    #[test]
    fn poly_blep_is_zero_away_from_edges() {
        assert_eq!(poly_blep(0.5, 0.01), 0.0);
        assert!(poly_blep(0.001, 0.01) < 0.0);
        assert!(poly_blep(0.999, 0.01) > 0.0);
    }

    #[test]
    fn waveform_from_switch_position() {
        assert_eq!(OscillatorWaveform::from_index(1.2), OscillatorWaveform::Saw);
        assert_eq!(OscillatorWaveform::from_index(99.0), OscillatorWaveform::Noise);
        assert_eq!(OscillatorWaveform::from_index(f32::NAN), OscillatorWaveform::Sine);
    }
}
