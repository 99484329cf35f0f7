#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lifecycle of one voice slot.
///
/// Discriminants are ordered so that `state > Silent` means "still sounding".
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum VoiceState {
    #[default]
    Silent = 0,  // Available for allocation
    NoteOn = 1,  // Key held down
    NoteOff = 2, // Key released, sounding until the sentinel envelope finishes
    Hold = 4,    // Key released, kept on by hold or the sustain pedal
}

/// One polyphonic playback slot.
///
/// Slots are created in bulk when the voice count is configured and reused
/// forever; they are never individually destroyed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voice {
    id: usize,
    pub(crate) state: VoiceState,
    pub(crate) pitch: f32,
    pub(crate) gate: f32,
    /// Acquisition order; the smallest tag is the oldest voice.
    pub(crate) tag: u64,
    /// Shared by all voices started by the same note.
    pub(crate) unison_group: u64,
    /// Position inside the unison group, for re-pitching.
    pub(crate) unison_index: usize,
}

impl Voice {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            state: VoiceState::Silent,
            pitch: 0.0,
            gate: 0.0,
            tag: 0,
            unison_group: 0,
            unison_index: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn gate(&self) -> f32 {
        self.gate
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn unison_group(&self) -> u64 {
        self.unison_group
    }

    #[inline]
    pub fn is_sounding(&self) -> bool {
        self.state > VoiceState::Silent
    }

    pub fn is_silent(&self) -> bool {
        self.state == VoiceState::Silent
    }

    /// Back to an unused slot; the acquisition tag is kept for ordering.
    pub(crate) fn end(&mut self) {
        self.state = VoiceState::Silent;
        self.gate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sounding_means_not_silent() {
        let mut voice = Voice::new(3);
        assert!(!voice.is_sounding());
        for state in [VoiceState::NoteOn, VoiceState::NoteOff, VoiceState::Hold] {
            voice.state = state;
            assert!(voice.is_sounding());
        }
        voice.end();
        assert!(voice.is_silent());
        assert_eq!(voice.id(), 3);
    }
}
