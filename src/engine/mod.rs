//! The audio-thread facing side: one instrument, its compiled sink, the voice
//! allocator and a sample-accurate event queue.

pub mod allocator;
pub mod scheduler;

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::graph::instrument::Instrument;
use crate::graph::preset::{LoadReport, Preset};
use crate::graph::sink::Sink;
use crate::graph::UnitId;
use crate::io::converter::velocity_to_gate;
use crate::io::midi::MidiEvent;
use crate::io::AudioOutput;
use crate::param::ParamId;
use crate::synth::message::{MessageReceiver, SynthMessage};
use crate::synth::monitor::MonitorSink;
use crate::synth::poly::{PolySettings, Polyphony};
use crate::{Error, Result, MAX_VOICES};

use self::scheduler::Scheduler;

pub struct Engine {
    config: EngineConfig,
    instrument: Instrument,
    sink: Sink,
    poly: Polyphony,
    scheduler: Scheduler,
    messages: Option<Box<dyn MessageReceiver + Send>>,
    monitor: Option<Box<dyn MonitorSink + Send>>,
    ui_countdown: usize,
}

impl Engine {
    /// An engine with an empty instrument. Build the graph with
    /// [`edit`](Self::edit) or [`load_preset`](Self::load_preset).
    pub fn new(config: EngineConfig, catalog: Arc<Catalog>) -> Result<Self> {
        config.validate()?;
        let settings = PolySettings {
            num_voices: config.num_voices,
            ..PolySettings::default()
        };
        let mut instrument = Instrument::with_settings(catalog, settings);
        instrument.init(config.sample_rate);
        info!(
            sample_rate = config.sample_rate,
            num_voices = config.num_voices,
            control_period = config.control_period(),
            "engine created"
        );
        Ok(Self {
            config,
            instrument,
            sink: Sink::new(config.control_period()),
            poly: Polyphony::new(settings)?,
            scheduler: Scheduler::default(),
            messages: None,
            monitor: None,
            ui_countdown: config.ui_period(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn poly(&self) -> &Polyphony {
        &self.poly
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Change the instrument's topology or settings.
    ///
    /// Sounding voices are cut, the closure runs on a suspended instrument,
    /// then connections and the sink are rebuilt. The rebuild also happens
    /// when the closure fails, so partial edits are never left uncompiled.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut Instrument) -> Result<R>) -> Result<R> {
        self.poly.all_notes_off(true, &mut self.instrument);
        self.instrument.suspend();
        let result = f(&mut self.instrument);
        let rebuilt = self.rebuild();
        self.instrument.resume();
        let value = result?;
        rebuilt?;
        Ok(value)
    }

    /// Swap in a new instrument, returning the old one.
    pub fn replace_instrument(&mut self, instrument: Instrument) -> Result<Instrument> {
        let num_voices = instrument.num_voices();
        if !(1..=MAX_VOICES).contains(&num_voices) {
            return Err(Error::VoiceCount(num_voices));
        }
        self.poly.all_notes_off(true, &mut self.instrument);
        let mut old = std::mem::replace(&mut self.instrument, instrument);
        old.suspend();
        self.rebuild()?;
        info!(units = self.instrument.len(), "instrument replaced");
        Ok(old)
    }

    /// Build an instrument from `preset` and make it current.
    pub fn load_preset(&mut self, preset: &Preset) -> Result<LoadReport> {
        let (instrument, report) = preset.build(Arc::clone(self.instrument.catalog()))?;
        self.replace_instrument(instrument)?;
        Ok(report)
    }

    fn rebuild(&mut self) -> Result<()> {
        let settings = *self.instrument.settings();
        if self.poly.num_voices() != settings.num_voices {
            self.poly.set_num_voices(settings.num_voices)?;
        }
        self.poly.set_unison(settings.num_unison, settings.unison_spread);
        self.poly.set_retrigger(settings.retrigger);
        self.poly.set_legato(settings.legato);
        self.poly.set_hold(settings.hold, &mut self.instrument);

        if !self.instrument.is_initialized()
            || self.instrument.sample_rate() != self.config.sample_rate
        {
            self.instrument.init(self.config.sample_rate);
        }
        self.instrument.connect_modules();
        self.sink.compile(&self.instrument);
        self.poly.set_auto_end(self.sink.sentinel().is_none());
        debug!(
            units = self.instrument.len(),
            executed = self.sink.order().len(),
            "instrument rebuilt"
        );
        Ok(())
    }

    /// Render `frames` samples into `output` starting at frame `start`.
    ///
    /// The range is cleared first. Queued messages are applied before the
    /// first sample, scheduled MIDI events at their offset.
    pub fn process(&mut self, output: &mut AudioOutput, start: usize, frames: usize) -> Result<()> {
        if start + frames > output.frames() {
            return Err(Error::InvalidConfig("block exceeds the output buffer"));
        }
        output.clear_range(start, frames);
        self.drain_messages();

        let mut cursor = 0;
        while cursor < frames {
            while let Some(event) = self.scheduler.pop_due(cursor) {
                self.poly.handle_event(event, &mut self.instrument);
            }
            let end = self
                .scheduler
                .next_offset()
                .map_or(frames, |offset| offset.min(frames));
            self.sink.process(
                &mut self.instrument,
                &mut self.poly,
                output,
                start + cursor,
                end - cursor,
            )?;
            cursor = end;
        }
        self.scheduler.advance(frames);
        self.tick_monitor(frames);
        Ok(())
    }

    fn drain_messages(&mut self) {
        let Some(mut messages) = self.messages.take() else {
            return;
        };
        while let Some(message) = messages.pop() {
            if let Err(error) = self.handle_message(message) {
                warn!(?message, %error, "message dropped");
            }
        }
        self.messages = Some(messages);
    }

    fn tick_monitor(&mut self, frames: usize) {
        if frames < self.ui_countdown {
            self.ui_countdown -= frames;
            return;
        }
        self.ui_countdown = self.config.ui_period();
        if let Some(monitor) = self.monitor.as_deref_mut() {
            self.poly.flush_monitor(monitor);
        }
    }

    /// Apply one raw MIDI message now.
    pub fn handle_midi_message(&mut self, bytes: &[u8]) -> Result<()> {
        self.poly.handle_midi_message(bytes, &mut self.instrument)
    }

    /// Queue a raw MIDI message `offset` frames into the next block.
    ///
    /// Returns `Ok(false)` when the queue is full. System messages are
    /// accepted and ignored.
    pub fn schedule(&mut self, offset: usize, bytes: &[u8]) -> Result<bool> {
        match MidiEvent::parse(bytes)? {
            Some(event) => Ok(self.scheduler.enqueue(offset, event)),
            None => Ok(true),
        }
    }

    pub fn handle_message(&mut self, message: SynthMessage) -> Result<()> {
        match message {
            SynthMessage::NoteOn { note, velocity: 0 } | SynthMessage::NoteOff { note, .. } => {
                self.poly.note_off(note as f32, &mut self.instrument)
            }
            SynthMessage::NoteOn { note, velocity } => self.poly.note_on(
                note as f32,
                velocity_to_gate(velocity),
                &mut self.instrument,
            ),
            SynthMessage::PitchBend { value } => self.poly.pitchbend(value, &mut self.instrument),
            SynthMessage::Controller { controller, value } => {
                self.poly.controller(controller, value, &mut self.instrument)
            }
            SynthMessage::AllNotesOff => self.poly.all_notes_off(false, &mut self.instrument),
            SynthMessage::SetHold(hold) => self.set_hold(hold),
            SynthMessage::SetParameter { unit, param, value } => {
                return self.set_parameter(unit, param, value)
            }
        }
        Ok(())
    }

    pub fn set_parameter(&mut self, unit: UnitId, param: ParamId, value: f32) -> Result<()> {
        self.instrument.set_parameter(unit, param, value, 0.0, None)
    }

    /// Resize the voice pool; every unit follows.
    pub fn set_num_voices(&mut self, num_voices: usize) -> Result<()> {
        self.edit(|instrument| instrument.set_num_voices(num_voices))?;
        self.config.num_voices = num_voices;
        Ok(())
    }

    pub fn set_unison(&mut self, num_unison: usize, spread: f32) {
        self.instrument.set_unison(num_unison, spread);
        self.poly.set_unison(num_unison, spread);
    }

    pub fn set_hold(&mut self, hold: bool) {
        self.instrument.set_hold(hold);
        self.poly.set_hold(hold, &mut self.instrument);
    }

    pub fn set_retrigger(&mut self, retrigger: bool) {
        self.instrument.set_retrigger(retrigger);
        self.poly.set_retrigger(retrigger);
    }

    pub fn set_legato(&mut self, legato: bool) {
        self.instrument.set_legato(legato);
        self.poly.set_legato(legato);
    }

    /// Source of messages drained at the start of every block.
    pub fn set_message_receiver(&mut self, receiver: Box<dyn MessageReceiver + Send>) {
        self.messages = Some(receiver);
    }

    /// Destination of monitoring events, flushed at the UI rate.
    pub fn set_monitor(&mut self, monitor: Box<dyn MonitorSink + Send>) {
        self.monitor = Some(monitor);
    }
}

/// Shared engine for a host with a separate audio thread.
///
/// The audio side never waits: when an editor holds the lock, the block is
/// rendered as silence.
#[derive(Clone)]
pub struct EngineHandle(Arc<Mutex<Engine>>);

impl EngineHandle {
    pub fn new(engine: Engine) -> Self {
        Self(Arc::new(Mutex::new(engine)))
    }

    /// Render a block. `Ok(false)` means the engine was busy and the range
    /// was cleared instead.
    pub fn process(&self, output: &mut AudioOutput, start: usize, frames: usize) -> Result<bool> {
        match self.0.try_lock() {
            Ok(mut engine) => engine.process(output, start, frames).map(|()| true),
            Err(TryLockError::WouldBlock) => {
                output.clear_range(start, frames);
                Ok(false)
            }
            Err(TryLockError::Poisoned(_)) => Err(Error::Poisoned),
        }
    }

    pub fn edit<R>(&self, f: impl FnOnce(&mut Instrument) -> Result<R>) -> Result<R> {
        self.lock()?.edit(f)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> Result<R> {
        let mut engine = self.lock()?;
        Ok(f(&mut engine))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Engine>> {
        self.0.lock().map_err(|_| Error::Poisoned)
    }
}
