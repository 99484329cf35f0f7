use crate::catalog::{ParamDef, PortDef, UnitDescriptor};
use crate::dsp::lfo::{bipolar_to_unipolar, Lfo, LfoWaveform};
use crate::graph::port::InPort;
use crate::graph::unit::{Frame, ProcessFn};
use crate::graph::{PortKind, Processing, Subscriptions, Voicing};
use crate::param::{ParamId, ValueShaper};
use crate::units::{Layout, UnitBody, UnitKind, UnitProcessor};

pub const OUT: usize = 0;

pub const WAVEFORM: ParamId = ParamId(0);
pub const RATE: ParamId = ParamId(1);
pub const DEPTH: ParamId = ParamId(2);
pub const UNIPOLAR: ParamId = ParamId(3);

pub(crate) const LAYOUT: Layout = Layout {
    inputs: &[],
    outputs: &[PortKind::Audio],
    params: 4,
};

pub fn descriptor() -> UnitDescriptor {
    UnitDescriptor {
        kind: UnitKind::Lfo,
        voicing: Voicing::Mono,
        processing: Processing::AUDIO.union(Processing::CONTROL),
        subscriptions: Subscriptions::NONE,
        inputs: Vec::new(),
        outputs: vec![PortDef::audio("out")],
        params: vec![
            ParamDef::switch("waveform", (LfoWaveform::ALL.len() - 1) as u32, 0.0),
            ParamDef::knob(
                "rate",
                ValueShaper::linear_range(0.01, 20.0).with_factor(1.0),
                5.0,
            ),
            ParamDef::knob("depth", ValueShaper::linear_range(0.0, 1.0), 1.0),
            ParamDef::toggle("unipolar", false),
        ],
    }
}

/// Shared LFO; one phase for the whole instrument.
#[derive(Debug, Clone)]
pub struct LfoUnit {
    lfo: Lfo,
    waveform: LfoWaveform,
    unipolar: bool,
}

impl Default for LfoUnit {
    fn default() -> Self {
        Self {
            lfo: Lfo::new(),
            waveform: LfoWaveform::Sine,
            unipolar: false,
        }
    }
}

impl LfoUnit {
    pub fn phase(&self) -> f32 {
        self.lfo.phase()
    }

    fn refresh(&mut self, frame: &Frame<'_>) {
        self.lfo.set_rate(frame.params.global(RATE), frame.sample_rate);
        self.waveform = LfoWaveform::from_index(frame.params.global(WAVEFORM));
        self.unipolar = frame.params.global(UNIPOLAR) > 0.5;
    }
}

fn process(body: &mut UnitBody, frame: &mut Frame<'_>) {
    let UnitBody::Lfo(unit) = body else {
        return;
    };
    let mut sample = unit.lfo.next_sample(unit.waveform);
    if unit.unipolar {
        sample = bipolar_to_unipolar(sample);
    }
    frame.outputs[OUT].set(0, sample * frame.params.global(DEPTH));
}

impl UnitProcessor for LfoUnit {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn select_entry(&self, _inputs: &[InPort]) -> ProcessFn {
        process
    }

    fn process_control(&mut self, frame: &mut Frame<'_>) {
        self.refresh(frame);
    }

    fn on_parameter(&mut self, frame: &mut Frame<'_>, _id: ParamId, _voice: Option<usize>) {
        self.refresh(frame);
    }
}
