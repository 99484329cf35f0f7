//! Low frequency oscillators.

use std::f32::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Low Frequency Oscillators
=========================

An LFO is an oscillator below the audible range (~0.01 Hz to ~20 Hz) whose
output moves other things instead of being heard. Around 5 Hz on pitch it is
vibrato, on amplitude tremolo, slower on a filter it is a sweep.

  bipolar     Output swings -1.0 to +1.0. Natural for vibrato, where the
              pitch goes sharp and flat.

  unipolar    Output stays in 0.0 to 1.0. Natural for tremolo, where the
              level only ever dips.

                  unipolar = (bipolar + 1.0) * 0.5

The rate only needs to be re-read at control ticks; the phase still advances
every sample so the waveform stays smooth. Shapes are naive: at these rates
the edges of saw and square sit far below Nyquist and do not alias audibly.
*/

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoWaveform {
    Sine,
    Triangle,
    Saw,
    Square,
}

impl LfoWaveform {
    pub const ALL: [LfoWaveform; 4] = [
        LfoWaveform::Sine,
        LfoWaveform::Triangle,
        LfoWaveform::Saw,
        LfoWaveform::Square,
    ];

    pub fn from_index(value: f32) -> Self {
        let index = if value.is_nan() { 0.0 } else { value.round() };
        let index = index.clamp(0.0, (Self::ALL.len() - 1) as f32) as usize;
        Self::ALL[index]
    }
}

/// Free-running LFO. Bipolar output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lfo {
    phase: f32,
    increment: f32,
}

impl Lfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&mut self, frequency_hz: f32, sample_rate: f32) {
        let increment = frequency_hz / sample_rate;
        self.increment = if increment.is_finite() { increment.max(0.0) } else { 0.0 };
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn next_sample(&mut self, waveform: LfoWaveform) -> f32 {
        let t = self.phase;
        let sample = match waveform {
            LfoWaveform::Sine => (TAU * t).sin(),
            LfoWaveform::Triangle => 1.0 - 4.0 * (t - 0.5).abs(),
            LfoWaveform::Saw => 2.0 * t - 1.0,
            LfoWaveform::Square => {
                if t < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        };
        let next = t + self.increment;
        self.phase = next - next.floor();
        sample
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Convert bipolar signal (-1.0 to +1.0) to unipolar (0.0 to 1.0).
#[inline]
pub fn bipolar_to_unipolar(bipolar: f32) -> f32 {
    (bipolar + 1.0) * 0.5
}

/// Convert unipolar signal (0.0 to 1.0) to bipolar (-1.0 to +1.0).
#[inline]
pub fn unipolar_to_bipolar(unipolar: f32) -> f32 {
    (unipolar * 2.0) - 1.0
}

/// Samples per LFO period.
///
/// # Example
/// ```
/// use saavy_modular::dsp::lfo::samples_per_period;
/// let samples = samples_per_period(5.0, 48000.0);
/// assert_eq!(samples, 9600.0); // 5 Hz at 48kHz = 9600 samples
/// ```
#[inline]
pub fn samples_per_period(frequency_hz: f32, sample_rate: f32) -> f32 {
    sample_rate / frequency_hz
}
