//! Unit parameters: stored values, curves, MIDI mapping and per-voice values.

/// Nonlinear value curves and quantization.
pub mod shaper;
/// MIDI controller mapping with soft takeover.
pub mod midi;

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use midi::MidiShaper;
pub use shaper::ValueShaper;

use crate::graph::UnitId;

/// Key that sits at the centre of key tracking (middle C).
pub const KEY_TRACK_CENTER: f32 = 60.0;
/// Distance in semitones from the centre at which key tracking reaches ±1.
pub const KEY_TRACK_SPAN: f32 = 60.0;

/// Identifies a parameter within its unit; dense, in catalog order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamId(pub u16);

impl ParamId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How an editor presents the parameter; also decides quantization.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Continuous knob.
    Knob,
    /// One of `steps + 1` discrete positions.
    Switch,
    /// Off (min) or on (max).
    Toggle,
}

/// A unit parameter.
///
/// Identity (`id`, `owner`) is fixed at construction; everything else can be
/// changed by the editor, presets and the owning unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    id: ParamId,
    owner: UnitId,
    pub name: &'static str,
    pub control: ControlKind,
    value: f32,
    default: f32,
    pub velocity_sensitivity: f32,
    pub key_track: f32,
    /// Smallest increment an editor should offer.
    pub resolution: f32,
    pub shaper: ValueShaper,
    pub midi: Option<MidiShaper>,
}

impl Parameter {
    pub fn new(
        id: ParamId,
        owner: UnitId,
        name: &'static str,
        shaper: ValueShaper,
        default: f32,
    ) -> Self {
        let mut param = Self {
            id,
            owner,
            name,
            control: ControlKind::Knob,
            value: 0.0,
            default: 0.0,
            velocity_sensitivity: 0.0,
            key_track: 0.0,
            resolution: 0.0,
            shaper,
            midi: None,
        };
        param.default = param.constrain(default);
        param.value = param.default;
        param
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn owner(&self) -> UnitId {
        self.owner
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Store a new value, clamped (and quantized for switches/toggles).
    pub fn set_value(&mut self, value: f32) {
        self.value = self.constrain(value);
    }

    pub fn restore_default(&mut self) {
        self.value = self.default;
    }

    /// Value after the shaper curve, as the unit sees it.
    pub fn shaped(&self) -> f32 {
        self.shaper.exponential(self.value)
    }

    /// Whether notes modulate this parameter per voice.
    pub fn is_note_modulated(&self) -> bool {
        self.velocity_sensitivity != 0.0 || self.key_track != 0.0
    }

    /// Per-voice modulation amount for a note.
    pub fn note_modulation(&self, pitch: f32, gate: f32) -> f32 {
        gate * self.velocity_sensitivity
            + self.key_track * (pitch - KEY_TRACK_CENTER) / KEY_TRACK_SPAN
    }

    /// Tolerance used by MIDI soft takeover.
    pub fn takeover_step(&self) -> f32 {
        let step = self.shaper.step_size();
        if step > 0.0 {
            step
        } else {
            self.resolution
        }
    }

    pub fn constrain(&self, value: f32) -> f32 {
        match self.control {
            ControlKind::Knob => self.shaper.clamp(value),
            ControlKind::Switch => self.shaper.quantize(value),
            ControlKind::Toggle => {
                let midpoint = (self.shaper.min + self.shaper.max) * 0.5;
                if self.shaper.clamp(value) > midpoint {
                    self.shaper.max
                } else {
                    self.shaper.min
                }
            }
        }
    }

    /// Change the presentation and re-constrain the stored values.
    pub fn set_control(&mut self, control: ControlKind) {
        self.control = control;
        self.default = self.constrain(self.default);
        self.value = self.constrain(self.value);
    }
}

/// Interpolate a shaped value by a modulation amount.
///
/// The sign of `modulation` selects the domain and is part of the unit
/// contract:
/// - `modulation >= 0`: linear interpolation towards `max` by `modulation`.
/// - `modulation < 0`: pitch-domain (geometric) interpolation towards `min`
///   by `|modulation|`. Ranges that include zero or negative values cannot be
///   interpolated geometrically and fall back to linear towards `min`.
pub fn modulate(shaper: &ValueShaper, value: f32, modulation: f32) -> f32 {
    if modulation == 0.0 || modulation.is_nan() {
        return value;
    }

    let amount = modulation.abs().min(1.0);
    let target = if modulation < 0.0 {
        if value > 0.0 && shaper.min > 0.0 {
            value * (shaper.min / value).powf(amount)
        } else {
            value + (shaper.min - value) * amount
        }
    } else {
        value + (shaper.max - value) * amount
    };
    shaper.clamp(target)
}

/// Effective parameter values, one row per parameter, one column per voice.
///
/// Units read these from the audio path; the layout is flat so lookups do
/// not chase pointers.
#[derive(Debug, Clone, Default)]
pub struct ParamBank {
    values: Vec<f32>,
    num_voices: usize,
}

impl ParamBank {
    pub fn new(params: &[Parameter], num_voices: usize) -> Self {
        let mut bank = Self::default();
        bank.reseed(params, num_voices);
        bank
    }

    /// Resize to `num_voices` and reset every voice to the shaped base values.
    pub fn reseed(&mut self, params: &[Parameter], num_voices: usize) {
        self.num_voices = num_voices;
        self.values.clear();
        for param in params {
            let shaped = param.shaped();
            self.values.extend(core::iter::repeat(shaped).take(num_voices));
        }
    }

    pub fn clear(&mut self) {
        self.values = Vec::new();
        self.num_voices = 0;
    }

    pub fn num_voices(&self) -> usize {
        self.num_voices
    }

    #[inline]
    pub fn get(&self, id: ParamId, voice: usize) -> f32 {
        self.values
            .get(id.index() * self.num_voices + voice)
            .copied()
            .unwrap_or_default()
    }

    /// Voice 0, for mono units and global settings.
    #[inline]
    pub fn global(&self, id: ParamId) -> f32 {
        self.get(id, 0)
    }

    pub fn set(&mut self, id: ParamId, voice: usize, value: f32) {
        if voice >= self.num_voices {
            return;
        }
        if let Some(slot) = self.values.get_mut(id.index() * self.num_voices + voice) {
            *slot = value;
        }
    }

    pub fn fill(&mut self, id: ParamId, value: f32) {
        let start = id.index() * self.num_voices;
        if let Some(row) = self.values.get_mut(start..start + self.num_voices) {
            row.fill(value);
        }
    }
}
