use crate::catalog::{ParamDef, PortDef, UnitDescriptor};
use crate::graph::port::InPort;
use crate::graph::unit::{Frame, ProcessFn};
use crate::graph::{PortKind, Processing, Subscriptions, Voicing};
use crate::param::{ParamId, ValueShaper};
use crate::units::{Layout, UnitBody, UnitKind, UnitProcessor};

pub const IN: usize = 0;

pub const VOLUME: ParamId = ParamId(0);

pub(crate) const LAYOUT: Layout = Layout {
    inputs: &[PortKind::Audio],
    outputs: &[],
    params: 1,
};

pub fn descriptor() -> UnitDescriptor {
    UnitDescriptor {
        kind: UnitKind::Master,
        voicing: Voicing::Mono,
        processing: Processing::AUDIO,
        subscriptions: Subscriptions::NONE,
        inputs: vec![PortDef::audio("in")],
        outputs: Vec::new(),
        params: vec![ParamDef::knob("volume", ValueShaper::linear_range(0.0, 1.0), 0.8)],
    }
}

/// Collects the instrument's signal. Poly sources are summed into voice 0
/// by the link adapter.
#[derive(Debug, Clone, Default)]
pub struct Master {
    sample: f32,
}

impl Master {
    pub fn sample(&self) -> f32 {
        self.sample
    }
}

fn process(body: &mut UnitBody, frame: &mut Frame<'_>) {
    if let UnitBody::Master(master) = body {
        master.sample = frame.inputs[IN].value(0) * frame.params.global(VOLUME);
    }
}

impl UnitProcessor for Master {
    fn reset(&mut self) {
        self.sample = 0.0;
    }

    fn select_entry(&self, _inputs: &[InPort]) -> ProcessFn {
        process
    }

    fn output(&self) -> Option<f32> {
        Some(self.sample)
    }
}
