#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    io::{
        converter::{bend_to_unit, controller_to_unit, velocity_to_gate},
        midi::MidiEvent,
    },
    synth::{
        monitor::{MonitorBatch, MonitorEvent, MonitorSink},
        voice::{Voice, VoiceState},
    },
    Error, Result, MAX_VOICES,
};

/*
Voice Allocation
================

Every note-on takes `num_unison` voice slots. A free (Silent) slot is
preferred; otherwise the slot with the smallest acquisition tag, the oldest
one, is ended and reused. Nothing else is weighed.

    note-on 60 (unison 3, spread 0.1)
    ┌────────┬────────┬────────┬────────┐
    │ 60.0   │ 60.1   │ 60.2   │ free   │   group 1, tags 1 2 3
    └────────┴────────┴────────┴────────┘

The first slot of each note is pushed on the note stack. The stack is what
note-off searches, and what retrigger/legato use to move the pitch of older
notes around.

Released voices are not silenced here. They go to NoteOff and keep sounding
until the sink's sentinel envelope reports them finished (`end_voice`). When
the graph has no sentinel, `auto_end` ends them right away.
*/

/// Sustain pedal.
pub const CC_SUSTAIN: u8 = 64;
/// All sound off: voices are cut immediately.
pub const CC_ALL_SOUND_OFF: u8 = 120;
/// All notes off: voices are released.
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Notes remembered for note-off matching.
pub const STACK_CAPACITY: usize = 128;

/// Gate scaling applied per unison voice, keeps stacked voices near the
/// loudness of one.
const UNISON_GAIN: f32 = 0.66;

const PITCH_EPSILON: f32 = 1e-3;

/// Instrument-wide polyphony settings.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolySettings {
    pub num_voices: usize,
    pub num_unison: usize,
    /// Pitch offset between unison voices, in semitones.
    pub unison_spread: f32,
    pub hold: bool,
    pub retrigger: bool,
    pub legato: bool,
}

impl Default for PolySettings {
    fn default() -> Self {
        Self {
            num_voices: 8,
            num_unison: 1,
            unison_spread: 0.1,
            hold: false,
            retrigger: false,
            legato: false,
        }
    }
}

/// One played note, recorded on note-on and consumed by the matching note-off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackEntry {
    /// First voice of the note's unison group.
    pub voice: usize,
    pub pitch: f32,
    pub gate: f32,
    pub tag: u64,
    pub unison_group: u64,
}

/// Receiver of voice broadcasts.
///
/// Everything is delivered synchronously, while the allocator handles the
/// event. Units subscribe through the instrument; tests can use `()` or a
/// recorder.
pub trait VoiceListener {
    fn on_note(&mut self, _voice: usize, _pitch: f32, _gate: f32) {}
    fn on_pitch(&mut self, _voice: usize, _pitch: f32) {}
    fn on_gate(&mut self, _voice: usize, _gate: f32) {}
    fn on_pitchbend(&mut self, _voice: usize, _value: f32) {}
    fn on_aftertouch(&mut self, _voice: usize, _value: f32) {}
    fn on_controller(&mut self, _controller: u8, _value: f32) {}
}

impl VoiceListener for () {}

/// Fixed voice pool plus the note stack.
#[derive(Debug, Clone)]
pub struct Polyphony {
    voices: Vec<Voice>,
    stack: Vec<StackEntry>,
    settings: PolySettings,
    sustain: bool,
    auto_end: bool,
    next_tag: u64,
    next_group: u64,
    monitor: MonitorBatch,
}

impl Polyphony {
    pub fn new(settings: PolySettings) -> Result<Self> {
        let mut poly = Self {
            voices: Vec::new(),
            stack: Vec::with_capacity(STACK_CAPACITY),
            settings,
            sustain: false,
            auto_end: false,
            next_tag: 0,
            next_group: 0,
            monitor: MonitorBatch::default(),
        };
        poly.set_num_voices(settings.num_voices)?;
        Ok(poly)
    }

    pub fn settings(&self) -> &PolySettings {
        &self.settings
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn stack(&self) -> &[StackEntry] {
        &self.stack
    }

    pub fn sounding_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_sounding()).count()
    }

    pub fn is_sustaining(&self) -> bool {
        self.sustain
    }

    /// Rebuild the voice pool. Every slot starts Silent and the stack is
    /// forgotten.
    pub fn set_num_voices(&mut self, num_voices: usize) -> Result<()> {
        if !(1..=MAX_VOICES).contains(&num_voices) {
            return Err(Error::VoiceCount(num_voices));
        }
        self.voices = (0..num_voices).map(Voice::new).collect();
        self.stack.clear();
        self.settings.num_voices = num_voices;
        tracing::debug!(num_voices, "voice pool rebuilt");
        Ok(())
    }

    /// Voices taken per note; clamped to the pool size.
    pub fn set_unison(&mut self, num_unison: usize, spread: f32) {
        self.settings.num_unison = num_unison.max(1);
        self.settings.unison_spread = if spread.is_finite() { spread } else { 0.0 };
    }

    pub fn set_retrigger(&mut self, enabled: bool) {
        self.settings.retrigger = enabled;
    }

    pub fn set_legato(&mut self, enabled: bool) {
        self.settings.legato = enabled;
    }

    /// End released voices at once instead of waiting for a sentinel.
    pub fn set_auto_end(&mut self, enabled: bool) {
        self.auto_end = enabled;
    }

    pub fn auto_end(&self) -> bool {
        self.auto_end
    }

    pub fn set_hold<L: VoiceListener + ?Sized>(&mut self, hold: bool, listener: &mut L) {
        let was = self.settings.hold;
        self.settings.hold = hold;
        if was && !hold {
            self.all_notes_off(false, listener);
        }
    }

    pub fn set_sustain<L: VoiceListener + ?Sized>(&mut self, sustain: bool, listener: &mut L) {
        let was = self.sustain;
        self.sustain = sustain;
        if was && !sustain && !self.settings.hold {
            self.release_held(listener);
        }
    }

    pub fn note_on<L: VoiceListener + ?Sized>(&mut self, pitch: f32, gate: f32, listener: &mut L) {
        let gate = if gate.is_finite() { gate.clamp(0.0, 1.0) } else { 0.0 };

        if self.settings.hold
            && !self.sustain
            && !self.voices.iter().any(|v| v.state == VoiceState::NoteOn)
        {
            self.release_held(listener);
        }

        let unison = self.settings.num_unison.clamp(1, self.voices.len().max(1));
        let gate = if unison > 1 {
            gate / (unison as f32 * UNISON_GAIN)
        } else {
            gate
        };
        self.next_group += 1;
        let group = self.next_group;

        let mut first = None;
        for index in 0..unison {
            let Some(slot) = self.acquire() else {
                break;
            };
            self.next_tag += 1;
            let voice_pitch = pitch + index as f32 * self.settings.unison_spread;
            let voice = &mut self.voices[slot];
            voice.state = VoiceState::NoteOn;
            voice.pitch = voice_pitch;
            voice.gate = gate;
            voice.tag = self.next_tag;
            voice.unison_group = group;
            voice.unison_index = index;
            listener.on_note(slot, voice_pitch, gate);

            if first.is_none() {
                first = Some(StackEntry {
                    voice: slot,
                    pitch,
                    gate,
                    tag: self.next_tag,
                    unison_group: group,
                });
            }
        }

        if let Some(entry) = first {
            if self.settings.retrigger || self.settings.legato {
                for index in 0..self.stack.len() {
                    let previous = self.stack[index].unison_group;
                    self.repitch_group(previous, pitch, listener);
                }
            }
            self.push_entry(entry);
        }

        self.monitor.push(MonitorEvent::Note { pitch, gate });
        self.monitor.push(MonitorEvent::Voices(self.sounding_count()));
    }

    pub fn note_off<L: VoiceListener + ?Sized>(&mut self, pitch: f32, listener: &mut L) {
        let Some(position) = self
            .stack
            .iter()
            .rposition(|entry| (entry.pitch - pitch).abs() < PITCH_EPSILON)
        else {
            return;
        };
        let released = self.stack.remove(position);

        if self.settings.retrigger || self.settings.legato {
            if let Some(prior) = self
                .stack
                .iter()
                .rev()
                .find(|entry| entry.tag != released.tag)
                .copied()
            {
                self.repitch_group(prior.unison_group, prior.pitch, listener);
            }
        }

        let deferred = self.settings.hold || self.sustain;
        for slot in 0..self.voices.len() {
            let voice = &mut self.voices[slot];
            if voice.unison_group != released.unison_group || voice.state != VoiceState::NoteOn {
                continue;
            }
            if deferred {
                voice.state = VoiceState::Hold;
            } else {
                self.release_voice(slot, listener);
            }
        }

        self.monitor.push(MonitorEvent::Note {
            pitch: released.pitch,
            gate: 0.0,
        });
        self.monitor.push(MonitorEvent::Voices(self.sounding_count()));
    }

    /// `reset = true` silences every voice immediately; otherwise every
    /// sounding voice is released.
    pub fn all_notes_off<L: VoiceListener + ?Sized>(&mut self, reset: bool, listener: &mut L) {
        for slot in 0..self.voices.len() {
            let voice = &mut self.voices[slot];
            if !voice.is_sounding() {
                continue;
            }
            if reset {
                voice.end();
                listener.on_gate(slot, 0.0);
            } else if voice.state != VoiceState::NoteOff {
                self.release_voice(slot, listener);
            }
        }
        self.stack.clear();
        self.monitor.push(MonitorEvent::Voices(self.sounding_count()));
    }

    /// Called when a voice's sentinel envelope has finished.
    pub fn end_voice(&mut self, voice: usize) {
        if let Some(slot) = self.voices.get_mut(voice) {
            if slot.is_sounding() {
                slot.end();
                self.monitor.push(MonitorEvent::Voices(self.sounding_count()));
            }
        }
    }

    /// Pitch bend, -1.0..=1.0, sent to every voice slot.
    pub fn pitchbend<L: VoiceListener + ?Sized>(&mut self, value: f32, listener: &mut L) {
        for slot in 0..self.voices.len() {
            listener.on_pitchbend(slot, value);
        }
        self.monitor.push(MonitorEvent::PitchBend(value));
    }

    pub fn aftertouch<L: VoiceListener + ?Sized>(&mut self, value: f32, listener: &mut L) {
        for slot in 0..self.voices.len() {
            listener.on_aftertouch(slot, value);
        }
    }

    /// Aftertouch for the voices playing `pitch`.
    pub fn poly_aftertouch<L: VoiceListener + ?Sized>(
        &mut self,
        pitch: f32,
        value: f32,
        listener: &mut L,
    ) {
        for entry in &self.stack {
            if (entry.pitch - pitch).abs() >= PITCH_EPSILON {
                continue;
            }
            for voice in &self.voices {
                if voice.unison_group == entry.unison_group && voice.is_sounding() {
                    listener.on_aftertouch(voice.id(), value);
                }
            }
        }
    }

    /// Controller change with `value` in 0.0..=1.0.
    pub fn controller<L: VoiceListener + ?Sized>(
        &mut self,
        controller: u8,
        value: f32,
        listener: &mut L,
    ) {
        match controller {
            CC_SUSTAIN => self.set_sustain(value >= 0.5, listener),
            CC_ALL_SOUND_OFF => self.all_notes_off(true, listener),
            CC_ALL_NOTES_OFF => self.all_notes_off(false, listener),
            _ => {}
        }
        listener.on_controller(controller, value);
        self.monitor.push(MonitorEvent::Controller { controller, value });
    }

    /// Parse raw bytes from the host's MIDI path and apply them.
    pub fn handle_midi_message<L: VoiceListener + ?Sized>(
        &mut self,
        bytes: &[u8],
        listener: &mut L,
    ) -> Result<()> {
        if let Some(event) = MidiEvent::parse(bytes)? {
            self.handle_event(event, listener);
        }
        Ok(())
    }

    pub fn handle_event<L: VoiceListener + ?Sized>(&mut self, event: MidiEvent, listener: &mut L) {
        match event {
            MidiEvent::NoteOn { key, velocity, .. } => {
                self.note_on(key as f32, velocity_to_gate(velocity), listener)
            }
            MidiEvent::NoteOff { key, .. } => self.note_off(key as f32, listener),
            MidiEvent::ControlChange {
                controller, value, ..
            } => self.controller(controller, controller_to_unit(value), listener),
            MidiEvent::PitchBend { value, .. } => self.pitchbend(bend_to_unit(value), listener),
            MidiEvent::ChannelAftertouch { pressure, .. } => {
                self.aftertouch(controller_to_unit(pressure), listener)
            }
            MidiEvent::PolyAftertouch { key, pressure, .. } => {
                self.poly_aftertouch(key as f32, controller_to_unit(pressure), listener)
            }
            MidiEvent::ProgramChange { program, .. } => {
                tracing::trace!(program, "program change ignored");
            }
        }
    }

    pub fn monitor(&self) -> &MonitorBatch {
        &self.monitor
    }

    pub fn flush_monitor(&mut self, sink: &mut dyn MonitorSink) -> usize {
        self.monitor.flush(sink)
    }

    fn acquire(&mut self) -> Option<usize> {
        if let Some(slot) = self.voices.iter().position(Voice::is_silent) {
            return Some(slot);
        }
        let slot = self
            .voices
            .iter()
            .enumerate()
            .min_by_key(|(_, voice)| voice.tag)
            .map(|(slot, _)| slot)?;
        tracing::trace!(voice = slot, tag = self.voices[slot].tag, "voice stolen");
        self.voices[slot].end();
        Some(slot)
    }

    /// The most recent note whose voices are still held down.
    fn push_entry(&mut self, entry: StackEntry) {
        if self.stack.len() >= STACK_CAPACITY {
            self.stack.remove(0);
        }
        self.stack.push(entry);
    }

    fn repitch_group<L: VoiceListener + ?Sized>(
        &mut self,
        group: u64,
        pitch: f32,
        listener: &mut L,
    ) {
        let spread = self.settings.unison_spread;
        for voice in &mut self.voices {
            if voice.unison_group == group && voice.is_sounding() {
                voice.pitch = pitch + voice.unison_index as f32 * spread;
                listener.on_pitch(voice.id(), voice.pitch);
            }
        }
    }

    fn release_voice<L: VoiceListener + ?Sized>(&mut self, slot: usize, listener: &mut L) {
        let voice = &mut self.voices[slot];
        voice.state = VoiceState::NoteOff;
        listener.on_gate(slot, 0.0);
        if self.auto_end {
            voice.end();
        }
    }

    fn release_held<L: VoiceListener + ?Sized>(&mut self, listener: &mut L) {
        for slot in 0..self.voices.len() {
            if self.voices[slot].state == VoiceState::Hold {
                self.release_voice(slot, listener);
            }
        }
        self.monitor.push(MonitorEvent::Voices(self.sounding_count()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        notes: Vec<(usize, f32, f32)>,
        pitches: Vec<(usize, f32)>,
        gates: Vec<(usize, f32)>,
        controllers: Vec<(u8, f32)>,
    }

    impl VoiceListener for Recorder {
        fn on_note(&mut self, voice: usize, pitch: f32, gate: f32) {
            self.notes.push((voice, pitch, gate));
        }
        fn on_pitch(&mut self, voice: usize, pitch: f32) {
            self.pitches.push((voice, pitch));
        }
        fn on_gate(&mut self, voice: usize, gate: f32) {
            self.gates.push((voice, gate));
        }
        fn on_controller(&mut self, controller: u8, value: f32) {
            self.controllers.push((controller, value));
        }
    }

    fn poly(num_voices: usize) -> Polyphony {
        Polyphony::new(PolySettings {
            num_voices,
            ..PolySettings::default()
        })
        .unwrap()
    }

    fn states(poly: &Polyphony) -> Vec<VoiceState> {
        poly.voices().iter().map(Voice::state).collect()
    }

    #[test]
    fn note_on_takes_one_voice() {
        let mut poly = poly(4);
        let mut rec = Recorder::default();
        poly.note_on(60.0, 1.0, &mut rec);

        assert_eq!(poly.sounding_count(), 1);
        assert_eq!(rec.notes, vec![(0, 60.0, 1.0)]);
        assert_eq!(poly.stack().len(), 1);

        poly.note_off(60.0, &mut rec);
        assert_eq!(poly.voices()[0].state(), VoiceState::NoteOff);
        assert_eq!(rec.gates, vec![(0, 0.0)]);
        assert!(poly.stack().is_empty());

        poly.end_voice(0);
        assert_eq!(poly.sounding_count(), 0);
    }

    #[test]
    fn auto_end_silences_on_release() {
        let mut poly = poly(2);
        poly.set_auto_end(true);
        poly.note_on(60.0, 1.0, &mut ());
        poly.note_off(60.0, &mut ());
        assert_eq!(poly.sounding_count(), 0);
    }

    #[test]
    fn unison_group_shares_pitches() {
        let mut poly = poly(4);
        poly.set_unison(3, 0.5);
        let mut rec = Recorder::default();
        poly.note_on(60.0, 1.0, &mut rec);

        let pitches: Vec<f32> = rec.notes.iter().map(|n| n.1).collect();
        assert_eq!(pitches, vec![60.0, 60.5, 61.0]);
        let group = poly.voices()[0].unison_group();
        assert!(poly.voices()[..3].iter().all(|v| v.unison_group() == group));
        assert_eq!(poly.voices()[3].state(), VoiceState::Silent);

        let expected_gate = 1.0 / (3.0 * UNISON_GAIN);
        assert!(rec.notes.iter().all(|n| (n.2 - expected_gate).abs() < 1e-6));
    }

    #[test]
    fn steals_oldest_voice() {
        let mut poly = poly(4);
        poly.set_unison(3, 0.1);
        poly.note_on(60.0, 1.0, &mut ());
        let first_tags: Vec<u64> = poly.voices()[..3].iter().map(Voice::tag).collect();
        assert_eq!(first_tags, vec![1, 2, 3]);

        let mut rec = Recorder::default();
        poly.note_on(64.0, 1.0, &mut rec);
        // free slot first, then the two oldest of the first group
        let slots: Vec<usize> = rec.notes.iter().map(|n| n.0).collect();
        assert_eq!(slots, vec![3, 0, 1]);
        assert_eq!(poly.voices()[2].tag(), 3);
        assert_eq!(poly.sounding_count(), 4);
    }

    #[test]
    fn stealing_prefers_minimum_tag_over_position() {
        let mut poly = poly(2);
        poly.note_on(60.0, 1.0, &mut ());
        poly.note_on(62.0, 1.0, &mut ());
        poly.note_off(60.0, &mut ());
        poly.end_voice(0);
        poly.note_on(64.0, 1.0, &mut ()); // slot 0, tag 3
        let mut rec = Recorder::default();
        poly.note_on(65.0, 1.0, &mut rec);
        assert_eq!(rec.notes, vec![(1, 65.0, 1.0)]);
    }

    #[test]
    fn sustain_defers_release() {
        let mut poly = poly(4);
        let mut rec = Recorder::default();
        poly.controller(CC_SUSTAIN, 1.0, &mut rec);
        poly.note_on(60.0, 1.0, &mut rec);
        poly.note_off(60.0, &mut rec);
        assert_eq!(poly.voices()[0].state(), VoiceState::Hold);
        assert!(rec.gates.is_empty());

        poly.controller(CC_SUSTAIN, 0.0, &mut rec);
        assert_eq!(poly.voices()[0].state(), VoiceState::NoteOff);
        assert_eq!(rec.gates, vec![(0, 0.0)]);
        assert_eq!(rec.controllers.len(), 2);
    }

    #[test]
    fn hold_releases_on_next_phrase() {
        let mut poly = poly(4);
        poly.set_hold(true, &mut ());
        poly.note_on(60.0, 1.0, &mut ());
        poly.note_off(60.0, &mut ());
        assert_eq!(states(&poly)[0], VoiceState::Hold);

        poly.note_on(62.0, 1.0, &mut ());
        assert_eq!(states(&poly)[0], VoiceState::NoteOff);
        assert_eq!(states(&poly)[1], VoiceState::NoteOn);

        poly.set_hold(false, &mut ());
        assert_eq!(states(&poly)[1], VoiceState::NoteOff);
    }

    #[test]
    fn all_notes_off_reset_is_immediate() {
        let mut poly = poly(4);
        poly.note_on(60.0, 1.0, &mut ());
        poly.note_on(64.0, 1.0, &mut ());
        poly.controller(CC_ALL_NOTES_OFF, 0.0, &mut ());
        assert!(states(&poly)[..2].iter().all(|s| *s == VoiceState::NoteOff));
        poly.controller(CC_ALL_SOUND_OFF, 0.0, &mut ());
        assert_eq!(poly.sounding_count(), 0);
        assert!(poly.stack().is_empty());
    }

    #[test]
    fn retrigger_returns_to_previous_note() {
        let mut poly = poly(4);
        poly.set_retrigger(true);
        let mut rec = Recorder::default();
        poly.note_on(60.0, 1.0, &mut rec);
        poly.note_on(64.0, 1.0, &mut rec);
        assert_eq!(poly.voices()[0].pitch(), 64.0);

        poly.note_off(64.0, &mut rec);
        assert_eq!(poly.voices()[0].pitch(), 60.0);
        assert_eq!(poly.voices()[0].state(), VoiceState::NoteOn);
        assert_eq!(poly.voices()[1].state(), VoiceState::NoteOff);
    }

    #[test]
    fn legato_takes_new_voices_and_glides_held_ones() {
        let mut poly = poly(4);
        poly.set_legato(true);
        let mut rec = Recorder::default();
        poly.note_on(60.0, 1.0, &mut rec);
        poly.note_on(67.0, 1.0, &mut rec);

        assert_eq!(rec.notes.len(), 2);
        assert_eq!(rec.pitches, vec![(0, 67.0)]);
        assert_eq!(poly.sounding_count(), 2);
        assert_eq!(poly.voices()[1].pitch(), 67.0);

        let mut events = Vec::new();
        poly.flush_monitor(&mut events);
        assert!(events.contains(&MonitorEvent::Voices(2)));

        poly.note_off(67.0, &mut rec);
        assert_eq!(poly.voices()[0].pitch(), 60.0);
        assert_eq!(poly.voices()[0].state(), VoiceState::NoteOn);
        assert_eq!(poly.voices()[1].state(), VoiceState::NoteOff);

        poly.note_off(60.0, &mut rec);
        assert_eq!(poly.voices()[0].state(), VoiceState::NoteOff);
    }

    #[test]
    fn midi_bytes_drive_notes() {
        let mut poly = poly(4);
        poly.handle_midi_message(&[0x90, 69, 127], &mut ()).unwrap();
        assert_eq!(poly.voices()[0].pitch(), 69.0);
        assert_eq!(poly.voices()[0].gate(), 1.0);
        poly.handle_midi_message(&[0x80, 69, 0], &mut ()).unwrap();
        assert_eq!(poly.voices()[0].state(), VoiceState::NoteOff);
        assert!(poly.handle_midi_message(&[0x90], &mut ()).is_err());
    }

    #[test]
    fn voice_count_is_validated() {
        let mut poly = poly(4);
        assert_eq!(poly.set_num_voices(0), Err(Error::VoiceCount(0)));
        assert_eq!(poly.set_num_voices(129), Err(Error::VoiceCount(129)));
        poly.set_num_voices(16).unwrap();
        assert_eq!(poly.num_voices(), 16);
    }

    #[test]
    fn monitor_reports_latest_voice_count() {
        let mut poly = poly(4);
        poly.note_on(60.0, 1.0, &mut ());
        poly.note_on(62.0, 1.0, &mut ());
        let mut events = Vec::new();
        poly.flush_monitor(&mut events);
        assert_eq!(events[0], MonitorEvent::Voices(2));
        assert_eq!(events.len(), 3);
    }
}
