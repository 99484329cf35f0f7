use crate::catalog::{ParamDef, PortDef, UnitDescriptor};
use crate::dsp::oscillator::{OscillatorBlock, OscillatorWaveform};
use crate::graph::port::InPort;
use crate::graph::unit::{Frame, ProcessFn};
use crate::graph::{PortKind, Processing, Subscriptions, Voicing};
use crate::io::converter::pitch_to_freq;
use crate::param::{ParamBank, ParamId, ValueShaper};
use crate::units::{Layout, UnitBody, UnitKind, UnitProcessor};

pub const PITCH: usize = 0;
pub const AMP: usize = 1;
pub const FM: usize = 2;

pub const OUT: usize = 0;

pub const WAVEFORM: ParamId = ParamId(0);
pub const COARSE: ParamId = ParamId(1);
pub const FINE: ParamId = ParamId(2);
pub const LEVEL: ParamId = ParamId(3);
pub const BEND_RANGE: ParamId = ParamId(4);

pub(crate) const LAYOUT: Layout = Layout {
    inputs: &[PortKind::Event, PortKind::Audio, PortKind::Audio],
    outputs: &[PortKind::Audio],
    params: 5,
};

pub fn descriptor() -> UnitDescriptor {
    UnitDescriptor {
        kind: UnitKind::Oscillator,
        voicing: Voicing::Poly,
        processing: Processing::AUDIO,
        subscriptions: Subscriptions::NOTE
            .union(Subscriptions::PITCH)
            .union(Subscriptions::PITCHBEND),
        inputs: vec![
            PortDef::event("pitch"),
            PortDef::audio("amp"),
            PortDef::audio("fm"),
        ],
        outputs: vec![PortDef::audio("out")],
        params: vec![
            ParamDef::switch("waveform", (OscillatorWaveform::ALL.len() - 1) as u32, 1.0),
            ParamDef::knob("coarse", ValueShaper::new(-24.0, 24.0, 48, 0.0), 0.0),
            ParamDef::knob("fine", ValueShaper::linear_range(-100.0, 100.0), 0.0)
                .with_resolution(1.0),
            ParamDef::knob("level", ValueShaper::linear_range(0.0, 1.0), 0.5),
            ParamDef::knob("bend_range", ValueShaper::new(0.0, 12.0, 12, 0.0), 2.0),
        ],
    }
}

/// Per-voice oscillator. Pitch comes from note broadcasts, or from the
/// `pitch` input when it is connected.
#[derive(Debug, Clone, Default)]
pub struct Oscillator {
    blocks: Vec<OscillatorBlock>,
    pitch: Vec<f32>,
    frequency: Vec<f32>,
    bend: f32,
}

impl Oscillator {
    /// Current frequency of a voice in Hz.
    pub fn frequency(&self, voice: usize) -> Option<f32> {
        self.frequency.get(voice).copied()
    }

    fn retune(&mut self, params: &ParamBank, voice: usize) {
        let (Some(pitch), Some(frequency)) = (self.pitch.get(voice), self.frequency.get_mut(voice))
        else {
            return;
        };
        let detune = params.get(COARSE, voice)
            + params.get(FINE, voice) / 100.0
            + self.bend * params.get(BEND_RANGE, voice);
        *frequency = pitch_to_freq(pitch + detune);
    }

    fn retune_all(&mut self, params: &ParamBank) {
        for voice in 0..self.pitch.len() {
            self.retune(params, voice);
        }
    }

    fn set_waveform(&mut self, params: &ParamBank, voice: usize) {
        if let Some(block) = self.blocks.get_mut(voice) {
            block.set_waveform(OscillatorWaveform::from_index(params.get(WAVEFORM, voice)));
        }
    }
}

fn process<const AMP_IN: bool, const FM_IN: bool>(body: &mut UnitBody, frame: &mut Frame<'_>) {
    let UnitBody::Oscillator(osc) = body else {
        return;
    };
    for voice in frame.voices() {
        if let Some(pitch) = frame.inputs[PITCH].take_event(voice) {
            osc.pitch[voice] = pitch;
            osc.retune(frame.params, voice);
        }

        let mut frequency = osc.frequency[voice];
        if FM_IN {
            frequency *= 1.0 + frame.inputs[FM].value(voice);
        }
        let mut sample = osc.blocks[voice].next_sample(frequency, frame.sample_rate)
            * frame.params.get(LEVEL, voice);
        if AMP_IN {
            sample *= frame.inputs[AMP].value(voice);
        }
        frame.outputs[OUT].set(voice, sample);
    }
}

impl UnitProcessor for Oscillator {
    fn resize(&mut self, num_voices: usize, _sample_rate: f32) {
        self.blocks = (0..num_voices)
            .map(|voice| OscillatorBlock::new(OscillatorWaveform::Saw).with_seed(voice as u32 + 1))
            .collect();
        self.pitch = vec![69.0; num_voices];
        self.frequency = vec![440.0; num_voices];
        self.bend = 0.0;
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn select_entry(&self, inputs: &[InPort]) -> ProcessFn {
        let amp = inputs.get(AMP).is_some_and(InPort::is_connected);
        let fm = inputs.get(FM).is_some_and(InPort::is_connected);
        match (amp, fm) {
            (false, false) => process::<false, false>,
            (true, false) => process::<true, false>,
            (false, true) => process::<false, true>,
            (true, true) => process::<true, true>,
        }
    }

    fn on_parameter(&mut self, frame: &mut Frame<'_>, id: ParamId, voice: Option<usize>) {
        match (id, voice) {
            (WAVEFORM, Some(voice)) => self.set_waveform(frame.params, voice),
            (WAVEFORM, None) => {
                for voice in 0..self.blocks.len() {
                    self.set_waveform(frame.params, voice);
                }
            }
            (COARSE | FINE | BEND_RANGE, Some(voice)) => self.retune(frame.params, voice),
            (COARSE | FINE | BEND_RANGE, None) => self.retune_all(frame.params),
            _ => {}
        }
    }

    fn on_note(&mut self, frame: &mut Frame<'_>, voice: usize, pitch: f32, _gate: f32) {
        if let Some(block) = self.blocks.get_mut(voice) {
            block.reset();
        }
        if !frame.inputs[PITCH].is_connected() {
            if let Some(slot) = self.pitch.get_mut(voice) {
                *slot = pitch;
            }
        }
        self.set_waveform(frame.params, voice);
        self.retune(frame.params, voice);
    }

    fn on_pitch(&mut self, frame: &mut Frame<'_>, voice: usize, pitch: f32) {
        if frame.inputs[PITCH].is_connected() {
            return;
        }
        if let Some(slot) = self.pitch.get_mut(voice) {
            *slot = pitch;
        }
        self.retune(frame.params, voice);
    }

    fn on_pitchbend(&mut self, frame: &mut Frame<'_>, voice: usize, value: f32) {
        self.bend = value.clamp(-1.0, 1.0);
        self.retune(frame.params, voice);
    }
}
