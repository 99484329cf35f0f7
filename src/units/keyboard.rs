use crate::catalog::{ParamDef, PortDef, UnitDescriptor};
use crate::graph::unit::Frame;
use crate::graph::{PortKind, Processing, Subscriptions, Voicing};
use crate::param::{ParamId, ValueShaper};
use crate::units::{Layout, UnitKind, UnitProcessor};

pub const PITCH: usize = 0;
pub const GATE: usize = 1;

pub const TRANSPOSE: ParamId = ParamId(0);

pub(crate) const LAYOUT: Layout = Layout {
    inputs: &[],
    outputs: &[PortKind::Event, PortKind::Event],
    params: 1,
};

pub fn descriptor() -> UnitDescriptor {
    UnitDescriptor {
        kind: UnitKind::Keyboard,
        voicing: Voicing::Poly,
        processing: Processing::EVENT,
        subscriptions: Subscriptions::NOTE
            .union(Subscriptions::PITCH)
            .union(Subscriptions::GATE),
        inputs: Vec::new(),
        outputs: vec![PortDef::event("pitch"), PortDef::event("gate")],
        params: vec![ParamDef::knob(
            "transpose",
            ValueShaper::new(-48.0, 48.0, 96, 0.0),
            0.0,
        )],
    }
}

/// Turns note broadcasts into per-voice `pitch` and `gate` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keyboard;

impl UnitProcessor for Keyboard {
    fn on_note(&mut self, frame: &mut Frame<'_>, voice: usize, pitch: f32, gate: f32) {
        let transpose = frame.params.get(TRANSPOSE, voice);
        frame.outputs[PITCH].fire(voice, pitch + transpose);
        frame.outputs[GATE].fire(voice, gate);
    }

    fn on_pitch(&mut self, frame: &mut Frame<'_>, voice: usize, pitch: f32) {
        let transpose = frame.params.get(TRANSPOSE, voice);
        frame.outputs[PITCH].fire(voice, pitch + transpose);
    }

    fn on_gate(&mut self, frame: &mut Frame<'_>, voice: usize, gate: f32) {
        frame.outputs[GATE].fire(voice, gate);
    }
}
