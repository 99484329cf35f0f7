//! MIDI controller → value mapping with soft takeover.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Soft Takeover
=============

A hardware knob and the value it controls drift apart all the time: the
patch was loaded, the editor moved the value, another controller touched it.
Jumping straight to the knob position on the next CC message causes an
audible step.

With soft takeover the first CC messages are ignored until the knob "picks
up" the value: its position either lands within one quantization step of the
current value or crosses it between two messages. From then on the knob
drives the value directly, until something else moves the value again.

    value ─────────────●─────────────
    knob     ↗  ↗  ↗   ×  → follows
             ignored   picked up
*/

/// Controller resolution assumed when a range has no quantization steps.
const CC_STEPS: f32 = 127.0;

/// Maps one MIDI controller onto a value range.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiShaper {
    pub controller: u8,
    pub min: f32,
    pub max: f32,
    pub soft_takeover: bool,
    /// Last mapped controller position.
    #[cfg_attr(feature = "serde", serde(skip))]
    previous: Option<f32>,
    /// Value this shaper last wrote; still equal to the target while the
    /// knob is in control.
    #[cfg_attr(feature = "serde", serde(skip))]
    applied: Option<f32>,
}

impl MidiShaper {
    pub fn new(controller: u8, min: f32, max: f32) -> Self {
        Self {
            controller,
            min,
            max,
            soft_takeover: false,
            previous: None,
            applied: None,
        }
    }

    pub fn with_soft_takeover(mut self, enabled: bool) -> Self {
        self.soft_takeover = enabled;
        self
    }

    /// Map a normalized controller position (0..=1) into `[min, max]`.
    pub fn map(&self, position: f32) -> f32 {
        let position = if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, 1.0)
        };
        self.min + (self.max - self.min) * position
    }

    /// Decide whether an incoming controller position may move `current`.
    ///
    /// Returns the value to apply, or `None` while soft takeover is still
    /// waiting for the knob to reach the current value. `step` is the
    /// target's quantization step; 0 falls back to the controller resolution.
    pub fn take_over(&mut self, current: f32, position: f32, step: f32) -> Option<f32> {
        let incoming = self.map(position);
        if !self.soft_takeover {
            self.applied = Some(incoming);
            return Some(incoming);
        }

        let tolerance = if step > 0.0 {
            step
        } else {
            (self.max - self.min).abs() / CC_STEPS
        };

        let in_control = self.applied.map_or(false, |applied| {
            (applied - current).abs() <= f32::EPSILON * applied.abs().max(1.0)
        });
        let near = (incoming - current).abs() <= tolerance;
        let crossed = self.previous.map_or(false, |previous| {
            (previous - current).signum() != (incoming - current).signum()
        });
        self.previous = Some(incoming);

        if in_control || near || crossed {
            self.applied = Some(incoming);
            Some(incoming)
        } else {
            None
        }
    }

    /// Record the value the target actually took once its own range
    /// clamped the mapped value, so the knob stays in control.
    pub fn confirm(&mut self, applied: f32) {
        self.applied = Some(applied);
    }

    /// Forget takeover state, e.g. after a preset load.
    pub fn release(&mut self) {
        self.previous = None;
        self.applied = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_controller_range() {
        let shaper = MidiShaper::new(74, 100.0, 200.0);
        assert_eq!(shaper.map(0.0), 100.0);
        assert_eq!(shaper.map(0.5), 150.0);
        assert_eq!(shaper.map(2.0), 200.0);
        assert_eq!(shaper.map(f32::NAN), 100.0);
    }

    #[test]
    fn without_takeover_every_message_applies() {
        let mut shaper = MidiShaper::new(1, 0.0, 1.0);
        assert_eq!(shaper.take_over(0.9, 0.1, 0.0), Some(0.1));
    }

    #[test]
    fn takeover_waits_until_knob_reaches_value() {
        let mut shaper = MidiShaper::new(1, 0.0, 1.0).with_soft_takeover(true);
        let current = 0.6;

        assert_eq!(shaper.take_over(current, 0.1, 0.0), None);
        assert_eq!(shaper.take_over(current, 0.3, 0.0), None);
        // jumps over the current value between two messages
        assert_eq!(shaper.take_over(current, 0.7, 0.0), Some(0.7));
        // knob now owns the value
        assert_eq!(shaper.take_over(0.7, 0.2, 0.0), Some(0.2));
    }

    #[test]
    fn takeover_accepts_within_one_step() {
        let mut shaper = MidiShaper::new(1, 0.0, 10.0).with_soft_takeover(true);
        assert_eq!(shaper.take_over(4.8, 0.5, 0.5), Some(5.0));
    }

    #[test]
    fn takeover_lost_when_value_moves_elsewhere() {
        let mut shaper = MidiShaper::new(1, 0.0, 1.0).with_soft_takeover(true);
        assert_eq!(shaper.take_over(0.5, 0.5, 0.0), Some(0.5));
        // editor moved the value to 0.9 meanwhile
        assert_eq!(shaper.take_over(0.9, 0.45, 0.0), None);
    }

    #[test]
    fn confirmed_clamp_keeps_the_knob_in_control() {
        // The target only accepts -1..=1 while the knob spans -4..=4.
        let mut shaper = MidiShaper::new(1, -4.0, 4.0).with_soft_takeover(true);
        assert_eq!(shaper.take_over(1.0, 0.625, 0.0), Some(1.0));
        shaper.confirm(1.0);
        assert_eq!(shaper.take_over(1.0, 0.875, 0.0), Some(3.0));
        shaper.confirm(1.0);
        assert_eq!(shaper.take_over(1.0, 0.75, 0.0), Some(2.0));
    }
}
