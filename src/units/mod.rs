//! Concrete unit kinds.
//!
//! The set is closed: [`UnitKind`] names every kind and [`UnitBody`] carries
//! each kind's per-voice state. Calls from the graph go through a single
//! `match` on the body, never through trait objects.

/// Final mono output of an instrument.
pub mod master;
/// Band-limited waveform oscillator.
pub mod oscillator;
/// Linear ADSR, the usual voice-lifetime sentinel.
pub mod envelope;
/// Mono feedback delay.
pub mod delay;
/// Note source: pitch and gate events per voice.
pub mod keyboard;
/// Controller, pitch bend and aftertouch source.
pub mod controller;
/// Mono low frequency oscillator.
pub mod lfo;

use core::{fmt, str::FromStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, UnitDescriptor};
use crate::graph::port::InPort;
use crate::graph::unit::{idle, Frame, ProcessFn, Unit};
use crate::graph::{PortKind, UnitId, Voicing};
use crate::param::ParamId;
use crate::{Error, Result};

pub use controller::Controller;
pub use delay::Delay;
pub use envelope::EnvelopeGenerator;
pub use keyboard::Keyboard;
pub use lfo::LfoUnit;
pub use master::Master;
pub use oscillator::Oscillator;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitKind {
    Master,
    Oscillator,
    Envelope,
    Delay,
    Keyboard,
    Controller,
    Lfo,
}

impl UnitKind {
    pub const ALL: [UnitKind; 7] = [
        UnitKind::Master,
        UnitKind::Oscillator,
        UnitKind::Envelope,
        UnitKind::Delay,
        UnitKind::Keyboard,
        UnitKind::Controller,
        UnitKind::Lfo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UnitKind::Master => "master",
            UnitKind::Oscillator => "oscillator",
            UnitKind::Envelope => "envelope",
            UnitKind::Delay => "delay",
            UnitKind::Keyboard => "keyboard",
            UnitKind::Controller => "controller",
            UnitKind::Lfo => "lfo",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnitKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        UnitKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownKind(s.to_owned()))
    }
}

/// Port kinds and parameter count a unit body is written against.
///
/// A catalog may change names, ranges and defaults, but not this.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    pub inputs: &'static [PortKind],
    pub outputs: &'static [PortKind],
    pub params: usize,
}

impl Layout {
    fn check(&self, descriptor: &UnitDescriptor) -> Result<()> {
        let mismatch = |detail| Error::CatalogMismatch {
            kind: descriptor.kind,
            detail,
        };
        if !descriptor.inputs.iter().map(|p| p.kind).eq(self.inputs.iter().copied()) {
            return Err(mismatch("inputs"));
        }
        if !descriptor.outputs.iter().map(|p| p.kind).eq(self.outputs.iter().copied()) {
            return Err(mismatch("outputs"));
        }
        if descriptor.params.len() != self.params {
            return Err(mismatch("parameters"));
        }
        if descriptor.kind == UnitKind::Master && descriptor.voicing != Voicing::Mono {
            return Err(mismatch("master must be mono"));
        }
        Ok(())
    }
}

/// Hooks a unit body implements. Everything defaults to doing nothing.
pub trait UnitProcessor {
    /// (Re)allocate per-voice state.
    fn resize(&mut self, _num_voices: usize, _sample_rate: f32) {}

    /// Free per-voice state.
    fn reset(&mut self) {}

    /// Entry point for the current connectivity of `inputs`.
    fn select_entry(&self, _inputs: &[InPort]) -> ProcessFn {
        idle
    }

    fn process_control(&mut self, _frame: &mut Frame<'_>) {}

    /// A parameter changed; `voice = None` for all voices.
    fn on_parameter(&mut self, _frame: &mut Frame<'_>, _id: ParamId, _voice: Option<usize>) {}

    fn on_note(&mut self, _frame: &mut Frame<'_>, _voice: usize, _pitch: f32, _gate: f32) {}

    fn on_pitch(&mut self, _frame: &mut Frame<'_>, _voice: usize, _pitch: f32) {}

    fn on_gate(&mut self, _frame: &mut Frame<'_>, _voice: usize, _gate: f32) {}

    fn on_pitchbend(&mut self, _frame: &mut Frame<'_>, _voice: usize, _value: f32) {}

    fn on_aftertouch(&mut self, _frame: &mut Frame<'_>, _voice: usize, _value: f32) {}

    fn on_controller(&mut self, _frame: &mut Frame<'_>, _controller: u8, _value: f32) {}

    /// Whether `voice` finished sounding since the last call.
    fn take_finished(&mut self, _voice: usize) -> bool {
        false
    }

    /// Sample handed to the host, for the master.
    fn output(&self) -> Option<f32> {
        None
    }
}

/// Per-kind state of a unit.
#[derive(Debug, Clone)]
pub enum UnitBody {
    Master(Master),
    Oscillator(Oscillator),
    Envelope(EnvelopeGenerator),
    Delay(Delay),
    Keyboard(Keyboard),
    Controller(Controller),
    Lfo(LfoUnit),
}

macro_rules! dispatch {
    ($body:expr, $unit:ident => $call:expr) => {
        match $body {
            UnitBody::Master($unit) => $call,
            UnitBody::Oscillator($unit) => $call,
            UnitBody::Envelope($unit) => $call,
            UnitBody::Delay($unit) => $call,
            UnitBody::Keyboard($unit) => $call,
            UnitBody::Controller($unit) => $call,
            UnitBody::Lfo($unit) => $call,
        }
    };
}

impl UnitBody {
    pub fn new(kind: UnitKind) -> Self {
        match kind {
            UnitKind::Master => UnitBody::Master(Master::default()),
            UnitKind::Oscillator => UnitBody::Oscillator(Oscillator::default()),
            UnitKind::Envelope => UnitBody::Envelope(EnvelopeGenerator::default()),
            UnitKind::Delay => UnitBody::Delay(Delay::default()),
            UnitKind::Keyboard => UnitBody::Keyboard(Keyboard),
            UnitKind::Controller => UnitBody::Controller(Controller),
            UnitKind::Lfo => UnitBody::Lfo(LfoUnit::default()),
        }
    }
}

impl UnitProcessor for UnitBody {
    fn resize(&mut self, num_voices: usize, sample_rate: f32) {
        dispatch!(self, unit => unit.resize(num_voices, sample_rate))
    }

    fn reset(&mut self) {
        dispatch!(self, unit => unit.reset())
    }

    fn select_entry(&self, inputs: &[InPort]) -> ProcessFn {
        dispatch!(self, unit => unit.select_entry(inputs))
    }

    fn process_control(&mut self, frame: &mut Frame<'_>) {
        dispatch!(self, unit => unit.process_control(frame))
    }

    fn on_parameter(&mut self, frame: &mut Frame<'_>, id: ParamId, voice: Option<usize>) {
        dispatch!(self, unit => unit.on_parameter(frame, id, voice))
    }

    fn on_note(&mut self, frame: &mut Frame<'_>, voice: usize, pitch: f32, gate: f32) {
        dispatch!(self, unit => unit.on_note(frame, voice, pitch, gate))
    }

    fn on_pitch(&mut self, frame: &mut Frame<'_>, voice: usize, pitch: f32) {
        dispatch!(self, unit => unit.on_pitch(frame, voice, pitch))
    }

    fn on_gate(&mut self, frame: &mut Frame<'_>, voice: usize, gate: f32) {
        dispatch!(self, unit => unit.on_gate(frame, voice, gate))
    }

    fn on_pitchbend(&mut self, frame: &mut Frame<'_>, voice: usize, value: f32) {
        dispatch!(self, unit => unit.on_pitchbend(frame, voice, value))
    }

    fn on_aftertouch(&mut self, frame: &mut Frame<'_>, voice: usize, value: f32) {
        dispatch!(self, unit => unit.on_aftertouch(frame, voice, value))
    }

    fn on_controller(&mut self, frame: &mut Frame<'_>, controller: u8, value: f32) {
        dispatch!(self, unit => unit.on_controller(frame, controller, value))
    }

    fn take_finished(&mut self, voice: usize) -> bool {
        dispatch!(self, unit => unit.take_finished(voice))
    }

    fn output(&self) -> Option<f32> {
        dispatch!(self, unit => unit.output())
    }
}

/// Built-in descriptor for a kind.
pub fn descriptor(kind: UnitKind) -> UnitDescriptor {
    match kind {
        UnitKind::Master => master::descriptor(),
        UnitKind::Oscillator => oscillator::descriptor(),
        UnitKind::Envelope => envelope::descriptor(),
        UnitKind::Delay => delay::descriptor(),
        UnitKind::Keyboard => keyboard::descriptor(),
        UnitKind::Controller => controller::descriptor(),
        UnitKind::Lfo => lfo::descriptor(),
    }
}

fn layout(kind: UnitKind) -> Layout {
    match kind {
        UnitKind::Master => master::LAYOUT,
        UnitKind::Oscillator => oscillator::LAYOUT,
        UnitKind::Envelope => envelope::LAYOUT,
        UnitKind::Delay => delay::LAYOUT,
        UnitKind::Keyboard => keyboard::LAYOUT,
        UnitKind::Controller => controller::LAYOUT,
        UnitKind::Lfo => lfo::LAYOUT,
    }
}

/// Construct an uninitialized unit of `kind` from the catalog's defaults.
pub fn create(kind: UnitKind, id: UnitId, catalog: &Catalog) -> Result<Unit> {
    let descriptor = catalog.get(kind)?;
    layout(kind).check(descriptor)?;
    Ok(Unit::new(id, descriptor, UnitBody::new(kind)))
}

/// [`create`] from a kind name, as found in presets.
pub fn create_named(name: &str, id: UnitId, catalog: &Catalog) -> Result<Unit> {
    create(name.parse()?, id, catalog)
}
