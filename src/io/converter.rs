use crate::{io::midi::MidiEvent, synth::message::SynthMessage};

/// Route note, controller and bend messages into engine commands.
///
/// `channel_filter = None` accepts every channel.
pub fn midi_to_synth(midi: MidiEvent, channel_filter: Option<u8>) -> Option<SynthMessage> {
    if channel_filter.is_some_and(|channel| channel != midi.channel()) {
        return None;
    }
    match midi {
        MidiEvent::NoteOn { key, velocity, .. } => Some(SynthMessage::NoteOn {
            note: key,
            velocity,
        }),
        MidiEvent::NoteOff { key, velocity, .. } => Some(SynthMessage::NoteOff {
            note: key,
            velocity,
        }),
        MidiEvent::ControlChange {
            controller, value, ..
        } => Some(SynthMessage::Controller {
            controller,
            value: controller_to_unit(value),
        }),
        MidiEvent::PitchBend { value, .. } => Some(SynthMessage::PitchBend {
            value: bend_to_unit(value),
        }),
        _ => None,
    }
}

pub fn midi_note_to_freq(note: u8) -> f32 {
    pitch_to_freq(note as f32)
}

/// Fractional MIDI pitch to Hz; A4 = 69 = 440 Hz.
#[inline]
pub fn pitch_to_freq(pitch: f32) -> f32 {
    440.0 * 2.0_f32.powf((pitch - 69.0) / 12.0)
}

#[inline]
pub fn velocity_to_gate(velocity: u8) -> f32 {
    velocity.min(127) as f32 / 127.0
}

#[inline]
pub fn controller_to_unit(value: u8) -> f32 {
    value.min(127) as f32 / 127.0
}

/// 14-bit bend to -1.0..=1.0.
#[inline]
pub fn bend_to_unit(value: i16) -> f32 {
    (value as f32 / 8192.0).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert!((midi_note_to_freq(69) - 440.0).abs() < 1e-3);
        assert!((pitch_to_freq(81.0) - 880.0).abs() < 1e-2);
    }

    #[test]
    fn filters_channels() {
        let note = MidiEvent::NoteOn {
            channel: 2,
            key: 60,
            velocity: 90,
        };
        assert_eq!(midi_to_synth(note, Some(0)), None);
        assert_eq!(
            midi_to_synth(note, Some(2)),
            Some(SynthMessage::NoteOn {
                note: 60,
                velocity: 90
            })
        );
        assert!(midi_to_synth(note, None).is_some());
    }

    #[test]
    fn normalizes_values() {
        assert_eq!(velocity_to_gate(127), 1.0);
        assert_eq!(bend_to_unit(-8192), -1.0);
        assert_eq!(bend_to_unit(0), 0.0);
        assert_eq!(controller_to_unit(0), 0.0);
    }
}
