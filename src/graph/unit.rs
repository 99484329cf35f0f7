//! The unit contract: lifecycle, parameters and the bound processing entry.

use crate::catalog::UnitDescriptor;
use crate::graph::link::Link;
use crate::graph::port::{Adapter, Connection, InPort, OutPort};
use crate::graph::{PortKind, Processing, Subscriptions, UnitId, Voicing};
use crate::param::{modulate, ParamBank, ParamId, Parameter};
use crate::synth::voice::Voice;
use crate::units::{UnitBody, UnitKind, UnitProcessor};
use crate::{Error, Result};

/*
Unit Lifecycle
==============

    Uninitialized ──init──→ Ready ⇄ Suspended
          ↑                   │
          └──────reset────────┘

init     sizes every per-voice buffer (ports, parameter values, the body's
         voice state), seeds the parameter values and binds the entry point.
update   re-sizes after a voice count change; connections stay registered.
reset    frees all of it again and forgets connections.

The entry point is a plain function pointer chosen from the unit's current
connectivity (see `UnitProcessor::select_entry`). The sink calls it once per
sample without re-deciding anything.
*/

/// Bound per-sample processing function.
pub type ProcessFn = fn(&mut UnitBody, &mut Frame<'_>);

/// Entry for units with nothing to do per sample.
pub fn idle(_body: &mut UnitBody, _frame: &mut Frame<'_>) {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Uninitialized,
    Ready,
    Suspended,
}

/// What a unit body sees while processing or reacting to a broadcast.
pub struct Frame<'a> {
    pub sample_rate: f32,
    pub inputs: &'a mut [InPort],
    pub outputs: &'a mut [OutPort],
    pub params: &'a ParamBank,
    voices: ActiveVoices<'a>,
}

impl<'a> Frame<'a> {
    /// Voices to process this sample: voice 0 for mono units, every sounding
    /// voice for poly units.
    #[inline]
    pub fn voices(&self) -> ActiveVoices<'a> {
        self.voices.clone()
    }
}

/// Iterator over the voice indices a unit should process.
#[derive(Debug, Clone)]
pub struct ActiveVoices<'a> {
    voices: &'a [Voice],
    next: usize,
    mono: bool,
}

impl<'a> ActiveVoices<'a> {
    pub fn new(voices: &'a [Voice], voicing: Voicing) -> Self {
        Self {
            voices,
            next: 0,
            mono: voicing == Voicing::Mono,
        }
    }

    /// Used for broadcasts, where the voice is given explicitly.
    pub fn none() -> Self {
        Self {
            voices: &[],
            next: 1,
            mono: true,
        }
    }
}

impl Iterator for ActiveVoices<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.mono {
            if self.next == 0 {
                self.next = 1;
                return Some(0);
            }
            return None;
        }
        while let Some(voice) = self.voices.get(self.next) {
            let index = self.next;
            self.next += 1;
            if voice.is_sounding() {
                return Some(index);
            }
        }
        None
    }
}

/// Voicing and port kinds of a link's destination, looked up by the
/// instrument before the source registers the connection.
#[derive(Debug, Clone, Copy)]
pub struct LinkTarget {
    pub voicing: Voicing,
    pub port_kind: PortKind,
}

/// A node of the graph. Owned by exactly one instrument.
#[derive(Debug)]
pub struct Unit {
    id: UnitId,
    kind: UnitKind,
    voicing: Voicing,
    processing: Processing,
    subscriptions: Subscriptions,
    state: UnitState,
    sample_rate: f32,
    num_voices: usize,
    pub(crate) inputs: Vec<InPort>,
    pub(crate) outputs: Vec<OutPort>,
    params: Vec<Parameter>,
    bank: ParamBank,
    body: UnitBody,
    entry: ProcessFn,
}

impl Unit {
    pub fn new(id: UnitId, descriptor: &UnitDescriptor, body: UnitBody) -> Self {
        Self {
            id,
            kind: descriptor.kind,
            voicing: descriptor.voicing,
            processing: descriptor.processing,
            subscriptions: descriptor.subscriptions,
            state: UnitState::Uninitialized,
            sample_rate: 0.0,
            num_voices: 0,
            inputs: descriptor.inputs.iter().map(|def| InPort::new(*def)).collect(),
            outputs: descriptor.outputs.iter().map(|def| OutPort::new(*def)).collect(),
            params: descriptor
                .params
                .iter()
                .enumerate()
                .map(|(index, def)| def.build(ParamId(index as u16), id))
                .collect(),
            bank: ParamBank::default(),
            body,
            entry: idle,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn voicing(&self) -> Voicing {
        self.voicing
    }

    pub fn processing(&self) -> Processing {
        self.processing
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == UnitState::Ready
    }

    pub fn num_voices(&self) -> usize {
        self.num_voices
    }

    pub fn inputs(&self) -> &[InPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutPort] {
        &self.outputs
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn param(&self, id: ParamId) -> Option<&Parameter> {
        self.params.get(id.index())
    }

    pub fn param_by_name(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Effective per-voice parameter values.
    pub fn bank(&self) -> &ParamBank {
        &self.bank
    }

    pub fn body(&self) -> &UnitBody {
        &self.body
    }

    pub fn entry(&self) -> ProcessFn {
        self.entry
    }

    /// The sample master writes for the current frame; `None` for other kinds.
    pub fn output_sample(&self) -> Option<f32> {
        self.body.output()
    }

    pub fn init(&mut self, sample_rate: f32, num_voices: usize) {
        self.sample_rate = sample_rate;
        self.state = UnitState::Ready;
        self.resize(num_voices);
    }

    /// Re-size per-voice buffers for a new voice count, keeping connections.
    pub fn update(&mut self, num_voices: usize) -> Result<()> {
        if self.state == UnitState::Uninitialized {
            return Err(Error::NotInitialized(self.id));
        }
        self.resize(num_voices);
        Ok(())
    }

    fn resize(&mut self, num_voices: usize) {
        self.num_voices = num_voices;
        for input in &mut self.inputs {
            input.resize(num_voices);
        }
        for output in &mut self.outputs {
            output.resize(num_voices);
        }
        self.bank.reseed(&self.params, num_voices);
        self.body.resize(num_voices, self.sample_rate);
        self.rebind();
    }

    pub fn reset(&mut self) {
        for input in &mut self.inputs {
            input.release();
        }
        for output in &mut self.outputs {
            output.release();
        }
        self.bank.clear();
        self.body.reset();
        self.entry = idle;
        self.num_voices = 0;
        self.state = UnitState::Uninitialized;
    }

    pub fn suspend(&mut self) {
        if self.state == UnitState::Ready {
            self.state = UnitState::Suspended;
        }
    }

    pub fn resume(&mut self) {
        if self.state == UnitState::Suspended {
            self.state = UnitState::Ready;
        }
    }

    /// Choose the entry point for the current connectivity.
    pub(crate) fn rebind(&mut self) {
        self.entry = self.body.select_entry(&self.inputs);
    }

    /// Register `link` on this unit's out-port. `self` is the link's source.
    pub fn connect_port(&mut self, link: &Link, target: LinkTarget) -> Result<()> {
        if self.state == UnitState::Uninitialized {
            return Err(Error::NotInitialized(self.id));
        }
        let output = self
            .outputs
            .get_mut(link.key.source_port)
            .ok_or(Error::InvalidEndpoint {
                key: link.key,
                side: "output",
            })?;
        if output.kind() != target.port_kind {
            return Err(Error::PortKindMismatch(link.key));
        }
        let adapter = Adapter::between(self.voicing, target.voicing);
        output.connect(Connection::new(link, adapter, self.num_voices));
        Ok(())
    }

    pub(crate) fn disconnect_output(&mut self, link: &Link) -> bool {
        self.outputs
            .get_mut(link.key.source_port)
            .and_then(|output| output.disconnect(&link.key))
            .is_some()
    }

    pub(crate) fn attach_input(&mut self, port: usize) {
        if let Some(input) = self.inputs.get_mut(port) {
            input.attach();
        }
        self.rebind();
    }

    pub(crate) fn detach_input(&mut self, port: usize) {
        if let Some(input) = self.inputs.get_mut(port) {
            input.detach();
        }
        self.rebind();
    }

    pub(crate) fn clear_connections(&mut self) {
        for output in &mut self.outputs {
            output.disconnect_all();
        }
        for input in &mut self.inputs {
            input.detach_all();
        }
        self.rebind();
    }

    pub(crate) fn update_link(&mut self, link: &Link) {
        if let Some(output) = self.outputs.get_mut(link.key.source_port) {
            for connection in output.connections_mut() {
                if connection.key() == link.key {
                    connection.update(link);
                }
            }
        }
    }

    /// Set a parameter's value; `voice = None` applies to every voice.
    ///
    /// `modulation` moves the effective value away from the stored one: a
    /// non-negative amount interpolates linearly towards the top of the range,
    /// a negative amount interpolates in the pitch domain towards the bottom.
    pub fn set_parameter(
        &mut self,
        id: ParamId,
        value: f32,
        modulation: f32,
        voice: Option<usize>,
    ) -> Result<()> {
        let param = self
            .params
            .get_mut(id.index())
            .ok_or(Error::NoSuchParameter {
                unit: self.id,
                param: id.0,
            })?;

        match voice {
            None => {
                param.set_value(value);
                if self.state != UnitState::Uninitialized {
                    let effective = modulate(&param.shaper, param.shaped(), modulation);
                    self.bank.fill(id, effective);
                }
            }
            Some(voice) => {
                if voice >= self.num_voices {
                    return Err(Error::VoiceOutOfRange {
                        voice,
                        num_voices: self.num_voices,
                    });
                }
                let shaped = param.shaper.exponential(param.constrain(value));
                self.bank.set(id, voice, modulate(&param.shaper, shaped, modulation));
            }
        }

        if self.state != UnitState::Uninitialized {
            let mut frame = Frame {
                sample_rate: self.sample_rate,
                inputs: &mut self.inputs,
                outputs: &mut self.outputs,
                params: &self.bank,
                voices: ActiveVoices::none(),
            };
            self.body.on_parameter(&mut frame, id, voice);
        }
        Ok(())
    }

    pub(crate) fn param_mut(&mut self, id: ParamId) -> Option<&mut Parameter> {
        self.params.get_mut(id.index())
    }

    /// Run the bound entry point for one sample frame.
    #[inline]
    pub(crate) fn run(&mut self, voices: &[Voice]) {
        if self.state != UnitState::Ready {
            return;
        }
        let mut frame = Frame {
            sample_rate: self.sample_rate,
            inputs: &mut self.inputs,
            outputs: &mut self.outputs,
            params: &self.bank,
            voices: ActiveVoices::new(voices, self.voicing),
        };
        (self.entry)(&mut self.body, &mut frame);
        for input in &mut self.inputs {
            input.settle();
        }
    }

    #[inline]
    pub(crate) fn run_control(&mut self, voices: &[Voice]) {
        if self.state != UnitState::Ready || !self.processing.contains(Processing::CONTROL) {
            return;
        }
        let mut frame = Frame {
            sample_rate: self.sample_rate,
            inputs: &mut self.inputs,
            outputs: &mut self.outputs,
            params: &self.bank,
            voices: ActiveVoices::new(voices, self.voicing),
        };
        self.body.process_control(&mut frame);
    }

    #[inline]
    pub(crate) fn take_finished(&mut self, voice: usize) -> bool {
        self.body.take_finished(voice)
    }

    /// Mono units hear every voice as voice 0.
    #[inline]
    fn local_voice(&self, voice: usize) -> Option<usize> {
        let voice = match self.voicing {
            Voicing::Mono => 0,
            Voicing::Poly => voice,
        };
        (self.state == UnitState::Ready && voice < self.num_voices).then_some(voice)
    }

    pub(crate) fn on_note(&mut self, voice: usize, pitch: f32, gate: f32) {
        let Some(local) = self.local_voice(voice) else {
            return;
        };
        for param in &self.params {
            if param.is_note_modulated() {
                let effective = modulate(
                    &param.shaper,
                    param.shaped(),
                    param.note_modulation(pitch, gate),
                );
                self.bank.set(param.id(), local, effective);
            }
        }
        for output in &mut self.outputs {
            for connection in output.connections_mut() {
                connection.on_note(connection.note_voice(voice, local), pitch, gate);
            }
        }
        if self.subscriptions.contains(Subscriptions::NOTE) {
            let (body, mut frame) = self.broadcast();
            body.on_note(&mut frame, local, pitch, gate);
        }
    }

    pub(crate) fn on_pitch(&mut self, voice: usize, pitch: f32) {
        let Some(local) = self.local_voice(voice) else {
            return;
        };
        for output in &mut self.outputs {
            for connection in output.connections_mut() {
                connection.on_pitch(connection.note_voice(voice, local), pitch);
            }
        }
        if self.subscriptions.contains(Subscriptions::PITCH) {
            let (body, mut frame) = self.broadcast();
            body.on_pitch(&mut frame, local, pitch);
        }
    }

    pub(crate) fn on_gate(&mut self, voice: usize, gate: f32) {
        let Some(local) = self.local_voice(voice) else {
            return;
        };
        for output in &mut self.outputs {
            for connection in output.connections_mut() {
                connection.on_gate(connection.note_voice(voice, local), gate);
            }
        }
        if self.subscriptions.contains(Subscriptions::GATE) {
            let (body, mut frame) = self.broadcast();
            body.on_gate(&mut frame, local, gate);
        }
    }

    pub(crate) fn on_pitchbend(&mut self, voice: usize, value: f32) {
        let Some(voice) = self.local_voice(voice) else {
            return;
        };
        if self.subscriptions.contains(Subscriptions::PITCHBEND) {
            let (body, mut frame) = self.broadcast();
            body.on_pitchbend(&mut frame, voice, value);
        }
    }

    pub(crate) fn on_aftertouch(&mut self, voice: usize, value: f32) {
        let Some(voice) = self.local_voice(voice) else {
            return;
        };
        if self.subscriptions.contains(Subscriptions::AFTERTOUCH) {
            let (body, mut frame) = self.broadcast();
            body.on_aftertouch(&mut frame, voice, value);
        }
    }

    /// Controller broadcast; also drives parameters mapped to `controller`.
    pub(crate) fn on_controller(&mut self, controller: u8, position: f32) {
        if self.state != UnitState::Ready {
            return;
        }
        for index in 0..self.params.len() {
            let id = ParamId(index as u16);
            let Some(param) = self.params.get_mut(index) else {
                continue;
            };
            let current = param.value();
            let step = param.takeover_step();
            let Some(midi) = param.midi.as_mut().filter(|m| m.controller == controller) else {
                continue;
            };
            if let Some(value) = midi.take_over(current, position, step) {
                // cannot fail: the id comes from the parameter list itself
                let _ = self.set_parameter(id, value, 0.0, None);
                if let Some(param) = self.params.get_mut(index) {
                    let applied = param.value();
                    if let Some(midi) = param.midi.as_mut() {
                        midi.confirm(applied);
                    }
                }
            }
        }
        if self.subscriptions.contains(Subscriptions::CONTROLLER) {
            let (body, mut frame) = self.broadcast();
            body.on_controller(&mut frame, controller, position);
        }
    }

    fn broadcast(&mut self) -> (&mut UnitBody, Frame<'_>) {
        let frame = Frame {
            sample_rate: self.sample_rate,
            inputs: &mut self.inputs,
            outputs: &mut self.outputs,
            params: &self.bank,
            voices: ActiveVoices::none(),
        };
        (&mut self.body, frame)
    }
}
