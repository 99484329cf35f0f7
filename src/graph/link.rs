//! Directed, modulatable connections between ports.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::graph::UnitId;
use crate::param::{MidiShaper, ValueShaper, KEY_TRACK_CENTER, KEY_TRACK_SPAN};

/// Identity of a link. Two links with the same key cannot coexist.
///
/// Port indices count in-ports and out-ports separately, in catalog order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkKey {
    pub source: UnitId,
    pub source_port: usize,
    pub dest: UnitId,
    pub dest_port: usize,
}

impl LinkKey {
    pub fn new(source: UnitId, source_port: usize, dest: UnitId, dest_port: usize) -> Self {
        Self {
            source,
            source_port,
            dest,
            dest_port,
        }
    }

    /// Whether either end sits on `unit`.
    pub fn touches(&self, unit: UnitId) -> bool {
        self.source == unit || self.dest == unit
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source, self.source_port, self.dest, self.dest_port
        )
    }
}

/// A connection from an out-port to an in-port with its own modulatable
/// amount.
///
/// Everything travelling over the link is scaled by
/// `shaper.exponential(value) + gate·velocity_sensitivity + key_track·(pitch − 60) / 60`,
/// evaluated per voice when notes arrive.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub key: LinkKey,
    pub value: f32,
    pub shaper: ValueShaper,
    pub velocity_sensitivity: f32,
    pub key_track: f32,
    pub midi: Option<MidiShaper>,
}

impl Link {
    /// A unity-gain link.
    pub fn new(key: LinkKey) -> Self {
        Self {
            key,
            value: 1.0,
            shaper: ValueShaper::linear_range(-1.0, 1.0),
            velocity_sensitivity: 0.0,
            key_track: 0.0,
            midi: None,
        }
    }

    pub fn between(source: UnitId, source_port: usize, dest: UnitId, dest_port: usize) -> Self {
        Self::new(LinkKey::new(source, source_port, dest, dest_port))
    }

    pub fn with_value(mut self, value: f32) -> Self {
        self.set_value(value);
        self
    }

    pub fn with_velocity_sensitivity(mut self, amount: f32) -> Self {
        self.velocity_sensitivity = amount;
        self
    }

    pub fn with_key_track(mut self, amount: f32) -> Self {
        self.key_track = amount;
        self
    }

    pub fn with_midi(mut self, midi: MidiShaper) -> Self {
        self.midi = Some(midi);
        self
    }

    pub fn set_value(&mut self, value: f32) {
        self.value = self.shaper.clamp(value);
    }

    pub fn amount(&self) -> LinkAmount {
        LinkAmount {
            base: self.shaper.exponential(self.value),
            velocity_sensitivity: self.velocity_sensitivity,
            key_track: self.key_track,
        }
    }
}

/// The part of a link the audio path needs: its shaped base value and note
/// sensitivities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkAmount {
    pub base: f32,
    pub velocity_sensitivity: f32,
    pub key_track: f32,
}

impl LinkAmount {
    #[inline]
    pub fn for_note(&self, pitch: f32, gate: f32) -> f32 {
        self.base
            + gate * self.velocity_sensitivity
            + self.key_track * (pitch - KEY_TRACK_CENTER) / KEY_TRACK_SPAN
    }

    pub fn is_note_sensitive(&self) -> bool {
        self.velocity_sensitivity != 0.0 || self.key_track != 0.0
    }
}
