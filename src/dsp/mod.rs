//! Low-level DSP primitives used by the concrete units.
//!
//! These components are allocation-free on the audio path, so units can keep
//! one per voice in a plain `Vec` sized at init. They stay focused on the
//! signal math; ports, parameters and voices are the units' business.

/// Circular delay line with fractional reads.
pub mod delay;
/// ADSR envelope with control-rate stage transitions.
pub mod envelope;
/// Low frequency oscillators and polarity helpers.
pub mod lfo;
/// Band-limited oscillator waveforms and noise.
pub mod oscillator;

pub use envelope::{Adsr, EnvelopeStage};
