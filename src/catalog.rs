//! Per-kind port and parameter defaults.
//!
//! A [`Catalog`] is built once and shared with every instrument through an
//! `Arc`. Units are constructed from it, so a host can ship its own defaults
//! (ranges, curves, initial values) as long as the port and parameter layout
//! of each kind stays the same.

use std::collections::BTreeMap;

use crate::graph::{PortKind, Processing, Subscriptions, UnitId, Voicing};
use crate::param::{ControlKind, ParamId, Parameter, ValueShaper};
use crate::units::UnitKind;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDef {
    pub name: &'static str,
    pub kind: PortKind,
}

impl PortDef {
    pub const fn audio(name: &'static str) -> Self {
        Self {
            name,
            kind: PortKind::Audio,
        }
    }

    pub const fn event(name: &'static str) -> Self {
        Self {
            name,
            kind: PortKind::Event,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: &'static str,
    pub shaper: ValueShaper,
    pub default: f32,
    pub control: ControlKind,
    pub resolution: f32,
}

impl ParamDef {
    pub fn knob(name: &'static str, shaper: ValueShaper, default: f32) -> Self {
        Self {
            name,
            shaper,
            default,
            control: ControlKind::Knob,
            resolution: 0.0,
        }
    }

    /// Discrete choice between `steps + 1` positions starting at 0.
    pub fn switch(name: &'static str, steps: u32, default: f32) -> Self {
        Self {
            name,
            shaper: ValueShaper::linear_range(0.0, steps as f32).with_steps(steps),
            default,
            control: ControlKind::Switch,
            resolution: 1.0,
        }
    }

    pub fn toggle(name: &'static str, default: bool) -> Self {
        Self {
            name,
            shaper: ValueShaper::linear_range(0.0, 1.0).with_steps(1),
            default: if default { 1.0 } else { 0.0 },
            control: ControlKind::Toggle,
            resolution: 1.0,
        }
    }

    pub fn with_resolution(mut self, resolution: f32) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn build(&self, id: ParamId, owner: UnitId) -> Parameter {
        let mut param = Parameter::new(id, owner, self.name, self.shaper, self.default);
        param.resolution = self.resolution;
        param.set_control(self.control);
        param
    }
}

/// Everything needed to construct one kind of unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDescriptor {
    pub kind: UnitKind,
    pub voicing: Voicing,
    pub processing: Processing,
    pub subscriptions: Subscriptions,
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
    pub params: Vec<ParamDef>,
}

impl UnitDescriptor {
    pub fn param_index(&self, name: &str) -> Option<ParamId> {
        self.params
            .iter()
            .position(|p| p.name == name)
            .map(|index| ParamId(index as u16))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    descriptors: BTreeMap<UnitKind, UnitDescriptor>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Descriptors for every built-in unit kind.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        for kind in UnitKind::ALL {
            catalog.insert(crate::units::descriptor(kind));
        }
        catalog
    }

    /// Add or replace the descriptor for its kind.
    pub fn insert(&mut self, descriptor: UnitDescriptor) -> Option<UnitDescriptor> {
        self.descriptors.insert(descriptor.kind, descriptor)
    }

    pub fn get(&self, kind: UnitKind) -> Result<&UnitDescriptor> {
        self.descriptors
            .get(&kind)
            .ok_or(Error::MissingDescriptor(kind))
    }

    pub fn kinds(&self) -> impl Iterator<Item = UnitKind> + '_ {
        self.descriptors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
