use crate::io::midi::MidiEvent;
use crate::synth::poly::{Polyphony, VoiceListener};
use crate::synth::voice::Voice;

/// What the sink needs from voice management: the voice table to render,
/// a way to end voices its sentinel reports finished, and an entry point
/// for timed MIDI events.
pub trait VoiceAllocator {
    fn voices(&self) -> &[Voice];
    fn end_voice(&mut self, voice: usize);
    fn handle_event(&mut self, event: MidiEvent, listener: &mut dyn VoiceListener);
}

impl VoiceAllocator for Polyphony {
    fn voices(&self) -> &[Voice] {
        Polyphony::voices(self)
    }

    fn end_voice(&mut self, voice: usize) {
        Polyphony::end_voice(self, voice)
    }

    fn handle_event(&mut self, event: MidiEvent, listener: &mut dyn VoiceListener) {
        Polyphony::handle_event(self, event, listener)
    }
}
