use crate::catalog::{ParamDef, PortDef, UnitDescriptor};
use crate::graph::unit::Frame;
use crate::graph::{PortKind, Processing, Subscriptions, Voicing};
use crate::param::{ParamId, ValueShaper};
use crate::units::{Layout, UnitKind, UnitProcessor};

pub const VALUE: usize = 0;

pub const SOURCE: ParamId = ParamId(0);
pub const CONTROLLER: ParamId = ParamId(1);

/// Positions of the `source` switch.
pub const SOURCE_CC: f32 = 0.0;
pub const SOURCE_BEND: f32 = 1.0;
pub const SOURCE_AFTERTOUCH: f32 = 2.0;

pub(crate) const LAYOUT: Layout = Layout {
    inputs: &[],
    outputs: &[PortKind::Event],
    params: 2,
};

pub fn descriptor() -> UnitDescriptor {
    UnitDescriptor {
        kind: UnitKind::Controller,
        voicing: Voicing::Mono,
        processing: Processing::EVENT,
        subscriptions: Subscriptions::CONTROLLER
            .union(Subscriptions::PITCHBEND)
            .union(Subscriptions::AFTERTOUCH),
        inputs: Vec::new(),
        outputs: vec![PortDef::event("value")],
        params: vec![
            ParamDef::switch("source", 2, SOURCE_CC),
            ParamDef::knob("controller", ValueShaper::new(0.0, 127.0, 127, 0.0), 1.0),
        ],
    }
}

/// Forwards one MIDI source as events: a continuous controller (0..1),
/// pitch bend (-1..1) or aftertouch (0..1).
#[derive(Debug, Clone, Copy, Default)]
pub struct Controller;

fn source_is(frame: &Frame<'_>, source: f32) -> bool {
    frame.params.global(SOURCE) == source
}

impl UnitProcessor for Controller {
    fn on_controller(&mut self, frame: &mut Frame<'_>, controller: u8, value: f32) {
        if source_is(frame, SOURCE_CC) && frame.params.global(CONTROLLER) == controller as f32 {
            frame.outputs[VALUE].fire(0, value);
        }
    }

    fn on_pitchbend(&mut self, frame: &mut Frame<'_>, _voice: usize, value: f32) {
        if source_is(frame, SOURCE_BEND) {
            frame.outputs[VALUE].fire(0, value);
        }
    }

    fn on_aftertouch(&mut self, frame: &mut Frame<'_>, _voice: usize, value: f32) {
        if source_is(frame, SOURCE_AFTERTOUCH) {
            frame.outputs[VALUE].fire(0, value);
        }
    }
}
