//! Engine-wide configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result, MAX_VOICES};

/// Nominal rate at which `process_control` runs (envelope stages, LFO rates).
pub const DEFAULT_CONTROL_RATE: f32 = 400.0;

/// Rate at which monitoring events are flushed to the UI side.
pub const DEFAULT_UI_RATE: f32 = 30.0;

/// Settings the engine is built with.
///
/// Everything here is fixed for the lifetime of an `Engine` except the voice
/// count, which can be changed through `Engine::set_num_voices`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub num_voices: usize,
    pub control_rate: f32,
    pub ui_rate: f32,
    pub channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            num_voices: 8,
            control_rate: DEFAULT_CONTROL_RATE,
            ui_rate: DEFAULT_UI_RATE,
            channels: 2,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_voices(mut self, num_voices: usize) -> Self {
        self.num_voices = num_voices;
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::InvalidConfig("sample rate must be positive"));
        }
        if !(self.control_rate.is_finite() && self.control_rate > 0.0) {
            return Err(Error::InvalidConfig("control rate must be positive"));
        }
        if !(self.ui_rate.is_finite() && self.ui_rate > 0.0) {
            return Err(Error::InvalidConfig("ui rate must be positive"));
        }
        if self.channels == 0 {
            return Err(Error::InvalidConfig("at least one output channel is required"));
        }
        if self.num_voices == 0 || self.num_voices > MAX_VOICES {
            return Err(Error::VoiceCount(self.num_voices));
        }
        Ok(())
    }

    /// Samples between two control ticks, e.g. 110 at 44.1 kHz / 400 Hz.
    pub fn control_period(&self) -> usize {
        period(self.sample_rate, self.control_rate)
    }

    /// Samples between two monitoring flushes.
    pub fn ui_period(&self) -> usize {
        period(self.sample_rate, self.ui_rate)
    }
}

fn period(sample_rate: f32, rate: f32) -> usize {
    (sample_rate / rate).round().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_period_matches_nominal_rate() {
        let config = EngineConfig::default().with_sample_rate(44_100.0);
        assert_eq!(config.control_period(), 110);
    }

    #[test]
    fn rejects_bad_voice_counts() {
        assert_eq!(
            EngineConfig::default().with_voices(0).validate(),
            Err(Error::VoiceCount(0))
        );
        assert!(EngineConfig::default().with_voices(MAX_VOICES).validate().is_ok());
        assert!(EngineConfig::default().with_voices(MAX_VOICES + 1).validate().is_err());
    }

    #[test]
    fn rejects_nonsense_rates() {
        let config = EngineConfig {
            sample_rate: f32::NAN,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
