//! In-memory instrument descriptions.
//!
//! A [`Preset`] is what a persistence layer hands over after parsing its own
//! format. Building an instrument from it skips single bad entities (an
//! unknown unit kind, a dangling link) and reports them, instead of failing
//! the whole load.

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::Catalog;
use crate::graph::instrument::Instrument;
use crate::graph::link::{Link, LinkKey};
use crate::graph::UnitId;
use crate::param::{MidiShaper, Parameter};
use crate::synth::poly::PolySettings;
use crate::units::UnitKind;
use crate::{Error, Result, MAX_VOICES};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ParamValue {
    pub name: String,
    pub value: f32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub velocity_sensitivity: f32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub key_track: f32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub midi: Option<MidiShaper>,
}

impl ParamValue {
    pub fn new(name: impl Into<String>, value: f32) -> Self {
        Self {
            name: name.into(),
            value,
            velocity_sensitivity: 0.0,
            key_track: 0.0,
            midi: None,
        }
    }

    fn of(param: &Parameter) -> Self {
        Self {
            name: param.name.to_owned(),
            value: param.value(),
            velocity_sensitivity: param.velocity_sensitivity,
            key_track: param.key_track,
            midi: param.midi,
        }
    }

    fn apply(&self, instrument: &mut Instrument, unit: UnitId) -> Result<()> {
        instrument.set_parameter_by_name(unit, &self.name, self.value)?;
        let id = instrument
            .unit(unit)
            .and_then(|target| target.param_by_name(&self.name))
            .map(Parameter::id)
            .ok_or_else(|| Error::UnknownParameter {
                unit,
                name: self.name.clone(),
            })?;
        instrument.set_parameter_modulation(unit, id, self.velocity_sensitivity, self.key_track)?;
        instrument.set_parameter_midi(unit, id, self.midi.map(fresh))
    }
}

/// A loaded mapping starts without takeover history.
fn fresh(mut midi: MidiShaper) -> MidiShaper {
    midi.release();
    midi
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    pub id: u16,
    /// Kind name, e.g. `"oscillator"`.
    pub kind: String,
    pub params: Vec<ParamValue>,
}

impl UnitSpec {
    pub fn new(id: u16, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f32) -> Self {
        self.params.push(ParamValue::new(name, value));
        self
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSpec {
    pub source: u16,
    pub source_port: usize,
    pub dest: u16,
    pub dest_port: usize,
    pub value: f32,
    pub velocity_sensitivity: f32,
    pub key_track: f32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub midi: Option<MidiShaper>,
}

impl LinkSpec {
    pub fn new(source: u16, source_port: usize, dest: u16, dest_port: usize) -> Self {
        Self {
            source,
            source_port,
            dest,
            dest_port,
            value: 1.0,
            velocity_sensitivity: 0.0,
            key_track: 0.0,
            midi: None,
        }
    }

    pub fn key(&self) -> LinkKey {
        LinkKey::new(
            UnitId(self.source),
            self.source_port,
            UnitId(self.dest),
            self.dest_port,
        )
    }

    fn to_link(self) -> Link {
        let mut link = Link::new(self.key())
            .with_value(self.value)
            .with_velocity_sensitivity(self.velocity_sensitivity)
            .with_key_track(self.key_track);
        link.midi = self.midi.map(fresh);
        link
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Preset {
    pub settings: PolySettings,
    pub units: Vec<UnitSpec>,
    pub links: Vec<LinkSpec>,
}

/// What went wrong while building an instrument from a preset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadReport {
    /// One entry per skipped unit, parameter or link.
    pub skipped: Vec<(String, Error)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    fn skip(&mut self, what: String, error: Error) {
        warn!(%what, %error, "preset entity skipped");
        self.skipped.push((what, error));
    }
}

impl Preset {
    /// Build an uninitialized instrument. Only an invalid voice count fails
    /// the whole load; everything else is skipped and reported.
    pub fn build(&self, catalog: Arc<Catalog>) -> Result<(Instrument, LoadReport)> {
        if !(1..=MAX_VOICES).contains(&self.settings.num_voices) {
            return Err(Error::VoiceCount(self.settings.num_voices));
        }
        let mut instrument = Instrument::with_settings(catalog, self.settings);
        let mut report = LoadReport::default();

        for spec in &self.units {
            let id = UnitId(spec.id);
            let added = spec
                .kind
                .parse::<UnitKind>()
                .and_then(|kind| instrument.add_unit_with_id(kind, id));
            if let Err(error) = added {
                report.skip(format!("unit {id} ({})", spec.kind), error);
                continue;
            }
            for param in &spec.params {
                if let Err(error) = param.apply(&mut instrument, id) {
                    report.skip(format!("parameter {id}.{}", param.name), error);
                }
            }
        }

        for spec in &self.links {
            if let Err(error) = instrument.add_link(spec.to_link()) {
                report.skip(format!("link {}", spec.key()), error);
            }
        }

        Ok((instrument, report))
    }

    /// Snapshot an instrument's units, parameter values and links.
    pub fn capture(instrument: &Instrument) -> Self {
        let units = instrument
            .units()
            .map(|unit| UnitSpec {
                id: unit.id().0,
                kind: unit.kind().name().to_owned(),
                params: unit.params().iter().map(ParamValue::of).collect(),
            })
            .collect();
        let links = instrument
            .links()
            .iter()
            .map(|link| LinkSpec {
                source: link.key.source.0,
                source_port: link.key.source_port,
                dest: link.key.dest.0,
                dest_port: link.key.dest_port,
                value: link.value,
                velocity_sensitivity: link.velocity_sensitivity,
                key_track: link.key_track,
                midi: link.midi,
            })
            .collect();
        Self {
            settings: *instrument.settings(),
            units,
            links,
        }
    }
}

impl Instrument {
    /// See [`Preset::build`].
    pub fn from_preset(preset: &Preset, catalog: Arc<Catalog>) -> Result<(Self, LoadReport)> {
        preset.build(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MASTER_ID;

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::standard())
    }

    #[test]
    fn bad_entities_are_skipped() {
        let preset = Preset {
            settings: PolySettings::default(),
            units: vec![
                UnitSpec::new(0, "master"),
                UnitSpec::new(1, "oscillator").with_param("level", 0.25),
                UnitSpec::new(2, "vocoder"),
                UnitSpec::new(3, "envelope").with_param("cutoff", 1.0),
            ],
            links: vec![
                LinkSpec::new(1, 0, 3, 0),
                LinkSpec::new(3, 0, 0, 0),
                LinkSpec::new(2, 0, 0, 0),
            ],
        };
        let (instrument, report) = preset.build(catalog()).unwrap();

        assert_eq!(instrument.len(), 3);
        assert_eq!(instrument.links().len(), 2);
        assert_eq!(report.skipped.len(), 3);
        assert!(matches!(report.skipped[0].1, Error::UnknownKind(_)));
        assert!(matches!(report.skipped[1].1, Error::UnknownParameter { .. }));
        assert_eq!(report.skipped[2].1, Error::NoSuchUnit(UnitId(2)));

        let level = instrument
            .unit(UnitId(1))
            .and_then(|unit| unit.param_by_name("level"))
            .map(|param| param.value());
        assert_eq!(level, Some(0.25));
        assert!(instrument.master().is_some());
        assert_eq!(instrument.master().map(|m| m.id()), Some(MASTER_ID));
    }

    #[test]
    fn invalid_voice_count_fails_the_load() {
        let preset = Preset {
            settings: PolySettings {
                num_voices: 0,
                ..PolySettings::default()
            },
            ..Preset::default()
        };
        assert_eq!(preset.build(catalog()).err(), Some(Error::VoiceCount(0)));
    }

    #[test]
    fn capture_keeps_midi_learn_and_note_tracking() {
        use crate::units::{delay, master};

        let mut instrument = Instrument::new(catalog());
        instrument.create_and_add_unit(UnitKind::Master).unwrap();
        let echo = instrument.create_and_add_unit(UnitKind::Delay).unwrap();
        let learned = MidiShaper::new(74, 0.0, 0.5).with_soft_takeover(true);
        instrument
            .add_link(Link::between(echo, delay::OUT, MASTER_ID, master::IN).with_midi(learned))
            .unwrap();
        instrument
            .set_parameter_modulation(echo, delay::FEEDBACK, 0.5, -0.25)
            .unwrap();
        instrument
            .set_parameter_midi(echo, delay::FEEDBACK, Some(MidiShaper::new(1, 0.0, 0.9)))
            .unwrap();

        let captured = Preset::capture(&instrument);
        let (rebuilt, report) = captured.build(catalog()).unwrap();
        assert!(report.is_clean());

        let link = &rebuilt.links()[0];
        assert_eq!(link.midi, Some(learned));
        let Some(feedback) = rebuilt.unit(echo).and_then(|unit| unit.param(delay::FEEDBACK)) else {
            panic!("feedback parameter missing");
        };
        assert_eq!(feedback.velocity_sensitivity, 0.5);
        assert_eq!(feedback.key_track, -0.25);
        assert_eq!(feedback.midi.map(|midi| midi.controller), Some(1));
        assert_eq!(Preset::capture(&rebuilt), captured);
    }

    #[test]
    fn capture_rebuilds_the_same_graph() {
        let preset = Preset {
            settings: PolySettings::default(),
            units: vec![
                UnitSpec::new(0, "master"),
                UnitSpec::new(4, "delay").with_param("feedback", 0.5),
            ],
            links: vec![LinkSpec::new(4, 0, 0, 0)],
        };
        let (instrument, _) = preset.build(catalog()).unwrap();
        let captured = Preset::capture(&instrument);
        let (rebuilt, report) = captured.build(catalog()).unwrap();
        assert!(report.is_clean());
        assert_eq!(Preset::capture(&rebuilt), captured);
        assert_eq!(captured.units[1].id, 4);
    }
}
