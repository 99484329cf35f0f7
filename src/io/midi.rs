use crate::{Error, Result};

/// Channel voice messages the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    PolyAftertouch { channel: u8, key: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelAftertouch { channel: u8, pressure: u8 },
    /// Centred on 0, -8192..=8191.
    PitchBend { channel: u8, value: i16 },
}

impl MidiEvent {
    /// Parse one complete message.
    ///
    /// System messages (status 0xF0 and up) are valid but not of interest and
    /// yield `Ok(None)`. Running status is not supported. A note-on with
    /// velocity 0 is reported as a note-off.
    pub fn parse(bytes: &[u8]) -> Result<Option<MidiEvent>> {
        let malformed = || Error::MalformedMidi(bytes.to_vec());

        let (&status, data) = bytes.split_first().ok_or_else(malformed)?;
        if status < 0x80 {
            return Err(malformed());
        }
        if status >= 0xF0 {
            return Ok(None);
        }

        let channel = status & 0x0F;
        let kind = status & 0xF0;
        let needed = if matches!(kind, 0xC0 | 0xD0) { 1 } else { 2 };
        let data = data.get(..needed).ok_or_else(malformed)?;
        if data.iter().any(|&byte| byte >= 0x80) {
            return Err(malformed());
        }
        let first = data[0];
        let second = data.get(1).copied().unwrap_or(0);

        let event = match kind {
            0x80 => MidiEvent::NoteOff {
                channel,
                key: first,
                velocity: second,
            },
            0x90 if second == 0 => MidiEvent::NoteOff {
                channel,
                key: first,
                velocity: 0,
            },
            0x90 => MidiEvent::NoteOn {
                channel,
                key: first,
                velocity: second,
            },
            0xA0 => MidiEvent::PolyAftertouch {
                channel,
                key: first,
                pressure: second,
            },
            0xB0 => MidiEvent::ControlChange {
                channel,
                controller: first,
                value: second,
            },
            0xC0 => MidiEvent::ProgramChange {
                channel,
                program: first,
            },
            0xD0 => MidiEvent::ChannelAftertouch {
                channel,
                pressure: first,
            },
            _ => MidiEvent::PitchBend {
                channel,
                value: (((second as i16) << 7) | first as i16) - 8192,
            },
        };
        Ok(Some(event))
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::PolyAftertouch { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::ProgramChange { channel, .. }
            | MidiEvent::ChannelAftertouch { channel, .. }
            | MidiEvent::PitchBend { channel, .. } => channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_notes() {
        assert_eq!(
            MidiEvent::parse(&[0x91, 60, 100]),
            Ok(Some(MidiEvent::NoteOn {
                channel: 1,
                key: 60,
                velocity: 100
            }))
        );
        assert_eq!(
            MidiEvent::parse(&[0x90, 60, 0]),
            Ok(Some(MidiEvent::NoteOff {
                channel: 0,
                key: 60,
                velocity: 0
            }))
        );
    }

    #[test]
    fn pitch_bend_is_centred() {
        assert_eq!(
            MidiEvent::parse(&[0xE0, 0x00, 0x40]),
            Ok(Some(MidiEvent::PitchBend { channel: 0, value: 0 }))
        );
        assert_eq!(
            MidiEvent::parse(&[0xE0, 0x7F, 0x7F]),
            Ok(Some(MidiEvent::PitchBend { channel: 0, value: 8191 }))
        );
        assert_eq!(
            MidiEvent::parse(&[0xE0, 0x00, 0x00]),
            Ok(Some(MidiEvent::PitchBend { channel: 0, value: -8192 }))
        );
    }

    #[test]
    fn two_byte_messages() {
        assert_eq!(
            MidiEvent::parse(&[0xD3, 90]),
            Ok(Some(MidiEvent::ChannelAftertouch {
                channel: 3,
                pressure: 90
            }))
        );
    }

    #[test]
    fn system_messages_are_ignored() {
        assert_eq!(MidiEvent::parse(&[0xF8]), Ok(None));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(MidiEvent::parse(&[]).is_err());
        assert!(MidiEvent::parse(&[60, 100]).is_err());
        assert!(MidiEvent::parse(&[0x90, 60]).is_err());
        assert_eq!(
            MidiEvent::parse(&[0x90, 60, 0x80]),
            Err(Error::MalformedMidi(vec![0x90, 60, 0x80]))
        );
    }
}
