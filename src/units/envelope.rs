use crate::catalog::{ParamDef, PortDef, UnitDescriptor};
use crate::dsp::envelope::{Adsr, Envelope};
use crate::graph::port::InPort;
use crate::graph::unit::{Frame, ProcessFn};
use crate::graph::{PortKind, Processing, Subscriptions, Voicing};
use crate::param::{ParamBank, ParamId, ValueShaper};
use crate::units::{Layout, UnitBody, UnitKind, UnitProcessor};

pub const IN: usize = 0;
pub const GATE: usize = 1;

pub const OUT: usize = 0;

pub const ATTACK: ParamId = ParamId(0);
pub const DECAY: ParamId = ParamId(1);
pub const SUSTAIN: ParamId = ParamId(2);
pub const RELEASE: ParamId = ParamId(3);

pub(crate) const LAYOUT: Layout = Layout {
    inputs: &[PortKind::Audio, PortKind::Event],
    outputs: &[PortKind::Audio],
    params: 4,
};

pub fn descriptor() -> UnitDescriptor {
    let time = ValueShaper::linear_range(0.001, 5.0).with_factor(1.0);
    UnitDescriptor {
        kind: UnitKind::Envelope,
        voicing: Voicing::Poly,
        processing: Processing::AUDIO.union(Processing::CONTROL),
        subscriptions: Subscriptions::NOTE.union(Subscriptions::GATE),
        inputs: vec![PortDef::audio("in"), PortDef::event("gate")],
        outputs: vec![PortDef::audio("out")],
        params: vec![
            ParamDef::knob("attack", time, 0.25),
            ParamDef::knob("decay", time, 1.0),
            ParamDef::knob("sustain", ValueShaper::linear_range(0.0, 1.0), 0.7),
            ParamDef::knob("release", time, 1.5),
        ],
    }
}

fn adsr(params: &ParamBank, voice: usize) -> Adsr {
    Adsr::new(
        params.get(ATTACK, voice),
        params.get(DECAY, voice),
        params.get(SUSTAIN, voice),
        params.get(RELEASE, voice),
    )
}

/// Per-voice ADSR. Multiplies `in` when connected, otherwise outputs the
/// envelope level itself.
///
/// Gates come from note broadcasts unless the `gate` input is connected.
/// When a release completes the voice is flagged finished; the sink collects
/// those flags from its sentinel envelope and ends the voices.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeGenerator {
    envelopes: Vec<Envelope>,
    finished: Vec<bool>,
}

impl EnvelopeGenerator {
    pub fn level(&self, voice: usize) -> f32 {
        self.envelopes.get(voice).map_or(0.0, Envelope::level)
    }

    pub fn envelope(&self, voice: usize) -> Option<&Envelope> {
        self.envelopes.get(voice)
    }

    fn gate(&mut self, params: &ParamBank, sample_rate: f32, voice: usize, gate: f32) {
        let Some(envelope) = self.envelopes.get_mut(voice) else {
            return;
        };
        let adsr = adsr(params, voice);
        let finished = if gate > 0.0 {
            envelope.gate_on(&adsr, sample_rate);
            false
        } else if envelope.is_active() {
            envelope.gate_off(&adsr, sample_rate);
            return;
        } else {
            // Released before it ever sounded, e.g. note-on and note-off
            // collapsed into one event frame. Nothing left to ramp down.
            true
        };
        if let Some(slot) = self.finished.get_mut(voice) {
            *slot = finished;
        }
    }
}

fn process<const IN_CONNECTED: bool>(body: &mut UnitBody, frame: &mut Frame<'_>) {
    let UnitBody::Envelope(env) = body else {
        return;
    };
    for voice in frame.voices() {
        if let Some(gate) = frame.inputs[GATE].take_event(voice) {
            env.gate(frame.params, frame.sample_rate, voice, gate);
        }
        let level = env.envelopes[voice].next_sample();
        let sample = if IN_CONNECTED {
            frame.inputs[IN].value(voice) * level
        } else {
            level
        };
        frame.outputs[OUT].set(voice, sample);
    }
}

impl UnitProcessor for EnvelopeGenerator {
    fn resize(&mut self, num_voices: usize, _sample_rate: f32) {
        self.envelopes = vec![Envelope::new(); num_voices];
        self.finished = vec![false; num_voices];
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn select_entry(&self, inputs: &[InPort]) -> ProcessFn {
        if inputs.get(IN).is_some_and(InPort::is_connected) {
            process::<true>
        } else {
            process::<false>
        }
    }

    fn process_control(&mut self, frame: &mut Frame<'_>) {
        for voice in frame.voices() {
            let adsr = adsr(frame.params, voice);
            if self.envelopes[voice].control(&adsr, frame.sample_rate) {
                self.finished[voice] = true;
            }
        }
    }

    fn on_note(&mut self, frame: &mut Frame<'_>, voice: usize, _pitch: f32, gate: f32) {
        if !frame.inputs[GATE].is_connected() {
            self.gate(frame.params, frame.sample_rate, voice, gate);
        }
    }

    fn on_gate(&mut self, frame: &mut Frame<'_>, voice: usize, gate: f32) {
        if !frame.inputs[GATE].is_connected() {
            self.gate(frame.params, frame.sample_rate, voice, gate);
        }
    }

    fn take_finished(&mut self, voice: usize) -> bool {
        self.finished
            .get_mut(voice)
            .map(core::mem::take)
            .unwrap_or(false)
    }
}
