use crate::catalog::{ParamDef, PortDef, UnitDescriptor};
use crate::dsp::delay::DelayLine;
use crate::graph::port::InPort;
use crate::graph::unit::{Frame, ProcessFn};
use crate::graph::{PortKind, Processing, Subscriptions, Voicing};
use crate::param::{ParamId, ValueShaper};
use crate::units::{Layout, UnitBody, UnitKind, UnitProcessor};

pub const IN: usize = 0;
pub const TIME_IN: usize = 1;

pub const OUT: usize = 0;

pub const TIME: ParamId = ParamId(0);
pub const FEEDBACK: ParamId = ParamId(1);
pub const MIX: ParamId = ParamId(2);

/// Longest delay, in milliseconds.
pub const MAX_DELAY_MS: f32 = 2000.0;

pub(crate) const LAYOUT: Layout = Layout {
    inputs: &[PortKind::Audio, PortKind::Event],
    outputs: &[PortKind::Audio],
    params: 3,
};

pub fn descriptor() -> UnitDescriptor {
    UnitDescriptor {
        kind: UnitKind::Delay,
        voicing: Voicing::Mono,
        processing: Processing::AUDIO,
        subscriptions: Subscriptions::NONE,
        inputs: vec![PortDef::audio("in"), PortDef::event("time")],
        outputs: vec![PortDef::audio("out")],
        params: vec![
            ParamDef::knob("time", ValueShaper::linear_range(1.0, MAX_DELAY_MS), 250.0)
                .with_resolution(1.0),
            ParamDef::knob("feedback", ValueShaper::linear_range(0.0, 0.95), 0.35),
            ParamDef::knob("mix", ValueShaper::linear_range(0.0, 1.0), 0.3),
        ],
    }
}

/// Mono feedback delay. A `time` event (in ms) overrides the time parameter
/// until the parameter is set again.
#[derive(Debug, Clone, Default)]
pub struct Delay {
    line: DelayLine,
    time_override: Option<f32>,
}

impl Delay {
    pub fn capacity(&self) -> usize {
        self.line.capacity()
    }
}

fn process(body: &mut UnitBody, frame: &mut Frame<'_>) {
    let UnitBody::Delay(delay) = body else {
        return;
    };
    if let Some(ms) = frame.inputs[TIME_IN].take_event(0) {
        delay.time_override = Some(ms.clamp(1.0, MAX_DELAY_MS));
    }
    let ms = delay
        .time_override
        .unwrap_or_else(|| frame.params.global(TIME));
    let input = frame.inputs[IN].value(0);
    let mix = frame.params.global(MIX);
    let wet = delay.line.next_sample(
        input,
        ms * 0.001 * frame.sample_rate,
        frame.params.global(FEEDBACK),
    );
    frame.outputs[OUT].set(0, input * (1.0 - mix) + wet * mix);
}

impl UnitProcessor for Delay {
    fn resize(&mut self, _num_voices: usize, sample_rate: f32) {
        let samples = (MAX_DELAY_MS * 0.001 * sample_rate).ceil() as usize + 2;
        if self.line.capacity() != samples {
            self.line.resize(samples);
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn select_entry(&self, _inputs: &[InPort]) -> ProcessFn {
        process
    }

    fn on_parameter(&mut self, _frame: &mut Frame<'_>, id: ParamId, _voice: Option<usize>) {
        if id == TIME {
            self.time_override = None;
        }
    }
}
