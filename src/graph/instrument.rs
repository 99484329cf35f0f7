use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::graph::link::{Link, LinkKey};
use crate::graph::unit::{ActiveVoices, LinkTarget, Unit};
use crate::graph::{PortKind, UnitId, MASTER_ID};
use crate::param::{MidiShaper, ParamId};
use crate::synth::poly::{PolySettings, VoiceListener};
use crate::synth::voice::Voice;
use crate::units::{self, UnitKind};
use crate::{Error, Result, MAX_VOICES};

/// Soft-takeover tolerance for continuous link amounts.
const LINK_TAKEOVER_STEP: f32 = 1.0 / 64.0;

/// Owns every unit and link of one patch.
///
/// Units sit in an arena indexed by [`UnitId`]. Links are kept as a flat list
/// of keys plus their modulation settings; the connections they turn into
/// live on the source unit's out-ports and are rebuilt by
/// [`connect_modules`](Self::connect_modules).
///
/// Mutations are not meant to overlap a running [`Sink`](super::sink::Sink)
/// tick. The engine suspends processing around them.
#[derive(Debug)]
pub struct Instrument {
    catalog: Arc<Catalog>,
    units: Vec<Option<Unit>>,
    links: Vec<Link>,
    settings: PolySettings,
    sample_rate: f32,
    initialized: bool,
}

impl Instrument {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_settings(catalog, PolySettings::default())
    }

    pub fn with_settings(catalog: Arc<Catalog>, settings: PolySettings) -> Self {
        Self {
            catalog,
            units: Vec::new(),
            links: Vec::new(),
            settings,
            sample_rate: 0.0,
            initialized: false,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn settings(&self) -> &PolySettings {
        &self.settings
    }

    pub fn num_voices(&self) -> usize {
        self.settings.num_voices
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn require(&self, id: UnitId) -> Result<&Unit> {
        self.unit(id).ok_or(Error::NoSuchUnit(id))
    }

    fn require_mut(&mut self, id: UnitId) -> Result<&mut Unit> {
        self.unit_mut(id).ok_or(Error::NoSuchUnit(id))
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.units().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn master(&self) -> Option<&Unit> {
        self.unit(MASTER_ID)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, key: &LinkKey) -> Option<&Link> {
        self.links.iter().find(|link| link.key == *key)
    }

    /// Links arriving at `unit`.
    pub fn incoming(&self, unit: UnitId) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |link| link.key.dest == unit)
    }

    /// Add a unit of `kind`. The master takes [`MASTER_ID`]; everything else
    /// takes the lowest free id above it.
    pub fn create_and_add_unit(&mut self, kind: UnitKind) -> Result<UnitId> {
        let id = if kind == UnitKind::Master {
            MASTER_ID
        } else {
            let free = (1..self.units.len())
                .find(|&index| self.units[index].is_none())
                .unwrap_or(self.units.len().max(1));
            let free = u16::try_from(free).map_err(|_| Error::InvalidConfig("unit ids exhausted"))?;
            UnitId(free)
        };
        self.add_unit_with_id(kind, id)
    }

    /// Add a unit under a caller-chosen id, as presets do.
    pub fn add_unit_with_id(&mut self, kind: UnitKind, id: UnitId) -> Result<UnitId> {
        match (kind == UnitKind::Master, id == MASTER_ID) {
            (true, true) if self.master().is_some() => return Err(Error::DuplicateMaster),
            (true, false) => return Err(Error::InvalidConfig("the master unit must use id 0")),
            (false, true) => return Err(Error::UnitIdInUse(MASTER_ID)),
            _ => {}
        }
        if self.unit(id).is_some() {
            return Err(Error::UnitIdInUse(id));
        }

        let mut unit = units::create(kind, id, &self.catalog)?;
        if self.initialized {
            unit.init(self.sample_rate, self.settings.num_voices);
        }
        if self.units.len() <= id.index() {
            self.units.resize_with(id.index() + 1, || None);
        }
        self.units[id.index()] = Some(unit);
        debug!(%id, %kind, "unit added");
        Ok(id)
    }

    /// Remove a unit together with every link that touches it.
    pub fn remove_unit(&mut self, id: UnitId) -> Result<Unit> {
        self.require(id)?;
        let touching: Vec<Link> = self
            .links
            .iter()
            .filter(|link| link.key.touches(id))
            .cloned()
            .collect();
        for link in &touching {
            self.disconnect(link);
        }
        self.links.retain(|link| !link.key.touches(id));

        let unit = self.units[id.index()].take().ok_or(Error::NoSuchUnit(id))?;
        while matches!(self.units.last(), Some(None)) {
            self.units.pop();
        }
        debug!(%id, links = touching.len(), "unit removed");
        Ok(unit)
    }

    /// Check that a link's endpoints exist and carry the same kind of signal.
    pub fn validate_link(&self, key: &LinkKey) -> Result<()> {
        let source = self.require(key.source)?;
        let dest = self.require(key.dest)?;
        let output = source.outputs().get(key.source_port).ok_or(Error::InvalidEndpoint {
            key: *key,
            side: "output",
        })?;
        let input = dest.inputs().get(key.dest_port).ok_or(Error::InvalidEndpoint {
            key: *key,
            side: "input",
        })?;
        if output.kind() != input.kind() {
            return Err(Error::PortKindMismatch(*key));
        }
        Ok(())
    }

    /// Register a link. It carries signal after the next
    /// [`connect_modules`](Self::connect_modules).
    pub fn add_link(&mut self, link: Link) -> Result<()> {
        self.validate_link(&link.key)?;
        if self.link(&link.key).is_some() {
            return Err(Error::DuplicateLink(link.key));
        }
        debug!(key = %link.key, "link added");
        self.links.push(link);
        Ok(())
    }

    pub fn remove_link(&mut self, key: &LinkKey) -> Result<Link> {
        let index = self
            .links
            .iter()
            .position(|link| link.key == *key)
            .ok_or(Error::NoSuchLink(*key))?;
        let link = self.links.remove(index);
        self.disconnect(&link);
        debug!(%key, "link removed");
        Ok(link)
    }

    fn disconnect(&mut self, link: &Link) {
        let disconnected = self
            .unit_mut(link.key.source)
            .is_some_and(|source| source.disconnect_output(link));
        if disconnected {
            if let Some(dest) = self.unit_mut(link.key.dest) {
                dest.detach_input(link.key.dest_port);
            }
        }
    }

    /// Change a link's base amount; live connections follow immediately.
    pub fn set_link_value(&mut self, key: &LinkKey, value: f32) -> Result<()> {
        let link = self
            .links
            .iter_mut()
            .find(|link| link.key == *key)
            .ok_or(Error::NoSuchLink(*key))?;
        link.set_value(value);
        let link = link.clone();
        if let Some(source) = self.unit_mut(key.source) {
            source.update_link(&link);
        }
        Ok(())
    }

    /// Replace a link's modulation settings, keeping its key.
    pub fn update_link(&mut self, link: Link) -> Result<()> {
        let slot = self
            .links
            .iter_mut()
            .find(|existing| existing.key == link.key)
            .ok_or(Error::NoSuchLink(link.key))?;
        *slot = link.clone();
        if let Some(source) = self.unit_mut(link.key.source) {
            source.update_link(&link);
        }
        Ok(())
    }

    /// (Re)build every connection from the link list.
    ///
    /// Links whose endpoints do not resolve are skipped and stay excluded
    /// from execution. Returns the number of links connected.
    pub fn connect_modules(&mut self) -> usize {
        for unit in self.units.iter_mut().flatten() {
            unit.clear_connections();
        }

        let mut connected = 0;
        for index in 0..self.links.len() {
            let key = self.links[index].key;
            let target = self.unit(key.dest).and_then(|dest| {
                dest.inputs().get(key.dest_port).map(|input| LinkTarget {
                    voicing: dest.voicing(),
                    port_kind: input.kind(),
                })
            });
            let Some(target) = target else {
                warn!(%key, "link destination does not resolve, skipped");
                continue;
            };
            let Some(Some(source)) = self.units.get_mut(key.source.index()) else {
                warn!(%key, "link source does not resolve, skipped");
                continue;
            };
            if let Err(error) = source.connect_port(&self.links[index], target) {
                warn!(%key, %error, "link not connected");
                continue;
            }
            if let Some(dest) = self.unit_mut(key.dest) {
                dest.attach_input(key.dest_port);
            }
            connected += 1;
        }
        debug!(connected, total = self.links.len(), "modules connected");
        connected
    }

    /// Initialize every unit for `sample_rate` and the current voice count.
    pub fn init(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        let num_voices = self.settings.num_voices;
        for unit in self.units.iter_mut().flatten() {
            unit.init(sample_rate, num_voices);
        }
        self.initialized = true;
    }

    /// Undo [`init`](Self::init) on every unit. Connections are dropped too.
    pub fn reset(&mut self) {
        for unit in self.units.iter_mut().flatten() {
            unit.reset();
        }
        self.initialized = false;
    }

    pub fn suspend(&mut self) {
        for unit in self.units.iter_mut().flatten() {
            unit.suspend();
        }
    }

    pub fn resume(&mut self) {
        for unit in self.units.iter_mut().flatten() {
            unit.resume();
        }
    }

    /// Resize every unit's per-voice state. Connections are kept.
    pub fn set_num_voices(&mut self, num_voices: usize) -> Result<()> {
        if !(1..=MAX_VOICES).contains(&num_voices) {
            return Err(Error::VoiceCount(num_voices));
        }
        self.settings.num_voices = num_voices;
        if self.initialized {
            for unit in self.units.iter_mut().flatten() {
                unit.update(num_voices)?;
            }
        }
        debug!(num_voices, "instrument voice count changed");
        Ok(())
    }

    pub fn set_unison(&mut self, num_unison: usize, spread: f32) {
        self.settings.num_unison = num_unison.max(1);
        self.settings.unison_spread = if spread.is_finite() { spread } else { 0.0 };
    }

    pub fn set_hold(&mut self, hold: bool) {
        self.settings.hold = hold;
    }

    pub fn set_retrigger(&mut self, retrigger: bool) {
        self.settings.retrigger = retrigger;
    }

    pub fn set_legato(&mut self, legato: bool) {
        self.settings.legato = legato;
    }

    pub fn set_parameter(
        &mut self,
        unit: UnitId,
        param: ParamId,
        value: f32,
        modulation: f32,
        voice: Option<usize>,
    ) -> Result<()> {
        self.require_mut(unit)?
            .set_parameter(param, value, modulation, voice)
    }

    /// Set a parameter by name, as presets and editors address them.
    pub fn set_parameter_by_name(&mut self, unit: UnitId, name: &str, value: f32) -> Result<()> {
        let target = self.require(unit)?;
        let id = target
            .param_by_name(name)
            .map(|param| param.id())
            .ok_or_else(|| Error::UnknownParameter {
                unit,
                name: name.to_owned(),
            })?;
        self.set_parameter(unit, id, value, 0.0, None)
    }

    /// Velocity sensitivity and key tracking applied on every note.
    pub fn set_parameter_modulation(
        &mut self,
        unit: UnitId,
        param: ParamId,
        velocity_sensitivity: f32,
        key_track: f32,
    ) -> Result<()> {
        let param = self.param_mut(unit, param)?;
        param.velocity_sensitivity = velocity_sensitivity.clamp(-1.0, 1.0);
        param.key_track = key_track.clamp(-1.0, 1.0);
        Ok(())
    }

    /// Map a parameter to a MIDI controller, or unmap it with `None`.
    pub fn set_parameter_midi(
        &mut self,
        unit: UnitId,
        param: ParamId,
        midi: Option<MidiShaper>,
    ) -> Result<()> {
        self.param_mut(unit, param)?.midi = midi;
        Ok(())
    }

    fn param_mut(&mut self, unit: UnitId, param: ParamId) -> Result<&mut crate::param::Parameter> {
        self.require_mut(unit)?
            .param_mut(param)
            .ok_or(Error::NoSuchParameter {
                unit,
                param: param.0,
            })
    }

    /// Run one unit for the current sample and hand its outputs to the
    /// connected in-ports.
    #[inline]
    pub(crate) fn run_unit(&mut self, id: UnitId, voices: &[Voice]) {
        let Some(Some(unit)) = self.units.get_mut(id.index()) else {
            return;
        };
        unit.run(voices);
        let voicing = unit.voicing();
        let mut outputs = core::mem::take(&mut unit.outputs);

        for output in &mut outputs {
            for connection in output.connections() {
                let key = connection.key();
                let Some(Some(target)) = self.units.get_mut(key.dest.index()) else {
                    continue;
                };
                let Some(input) = target.inputs.get_mut(key.dest_port) else {
                    continue;
                };
                match output.kind() {
                    PortKind::Audio => {
                        for voice in ActiveVoices::new(voices, voicing) {
                            connection.deliver(input, voice, output.value(voice));
                        }
                    }
                    PortKind::Event => {
                        for voice in 0..output.num_voices() {
                            if output.has_fired(voice) {
                                connection.deliver(input, voice, output.value(voice));
                            }
                        }
                    }
                }
            }
            output.clear_fired();
        }

        if let Some(Some(unit)) = self.units.get_mut(id.index()) {
            unit.outputs = outputs;
        }
    }

    #[inline]
    pub(crate) fn run_control(&mut self, id: UnitId, voices: &[Voice]) {
        if let Some(unit) = self.unit_mut(id) {
            unit.run_control(voices);
        }
    }

    #[inline]
    pub(crate) fn take_finished(&mut self, id: UnitId, voice: usize) -> bool {
        self.unit_mut(id).is_some_and(|unit| unit.take_finished(voice))
    }

    /// The master's sample for the current frame.
    #[inline]
    pub fn master_sample(&self) -> Option<f32> {
        self.master().and_then(Unit::output_sample)
    }

    fn links_follow_controller(&mut self, controller: u8, position: f32) {
        for index in 0..self.links.len() {
            let link = &mut self.links[index];
            let current = link.value;
            let Some(midi) = link.midi.as_mut().filter(|m| m.controller == controller) else {
                continue;
            };
            let Some(value) = midi.take_over(current, position, LINK_TAKEOVER_STEP) else {
                continue;
            };
            link.set_value(value);
            let clamped = link.value;
            if let Some(midi) = link.midi.as_mut() {
                midi.confirm(clamped);
            }
            if let Some(Some(unit)) = self.units.get_mut(link.key.source.index()) {
                unit.update_link(link);
            }
        }
    }
}

impl VoiceListener for Instrument {
    fn on_note(&mut self, voice: usize, pitch: f32, gate: f32) {
        for unit in self.units.iter_mut().flatten() {
            unit.on_note(voice, pitch, gate);
        }
    }

    fn on_pitch(&mut self, voice: usize, pitch: f32) {
        for unit in self.units.iter_mut().flatten() {
            unit.on_pitch(voice, pitch);
        }
    }

    fn on_gate(&mut self, voice: usize, gate: f32) {
        for unit in self.units.iter_mut().flatten() {
            unit.on_gate(voice, gate);
        }
    }

    fn on_pitchbend(&mut self, voice: usize, value: f32) {
        for unit in self.units.iter_mut().flatten() {
            unit.on_pitchbend(voice, value);
        }
    }

    fn on_aftertouch(&mut self, voice: usize, value: f32) {
        for unit in self.units.iter_mut().flatten() {
            unit.on_aftertouch(voice, value);
        }
    }

    fn on_controller(&mut self, controller: u8, value: f32) {
        for unit in self.units.iter_mut().flatten() {
            unit.on_controller(controller, value);
        }
        self.links_follow_controller(controller, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::port::Adapter;
    use crate::units::{envelope, lfo, master, oscillator};

    fn instrument() -> Instrument {
        Instrument::new(Arc::new(Catalog::standard()))
    }

    #[test]
    fn ids_fill_the_lowest_gap() {
        let mut inst = instrument();
        assert_eq!(inst.create_and_add_unit(UnitKind::Oscillator), Ok(UnitId(1)));
        assert_eq!(inst.create_and_add_unit(UnitKind::Master), Ok(MASTER_ID));
        assert_eq!(inst.create_and_add_unit(UnitKind::Envelope), Ok(UnitId(2)));
        assert_eq!(inst.create_and_add_unit(UnitKind::Lfo), Ok(UnitId(3)));
        inst.remove_unit(UnitId(2)).unwrap();
        assert_eq!(inst.create_and_add_unit(UnitKind::Delay), Ok(UnitId(2)));
        assert_eq!(inst.len(), 4);
    }

    #[test]
    fn master_is_unique() {
        let mut inst = instrument();
        inst.create_and_add_unit(UnitKind::Master).unwrap();
        assert_eq!(
            inst.create_and_add_unit(UnitKind::Master),
            Err(Error::DuplicateMaster)
        );
        assert_eq!(
            inst.add_unit_with_id(UnitKind::Oscillator, MASTER_ID),
            Err(Error::UnitIdInUse(MASTER_ID))
        );
    }

    #[test]
    fn links_are_validated() {
        let mut inst = instrument();
        inst.create_and_add_unit(UnitKind::Master).unwrap();
        let osc = inst.create_and_add_unit(UnitKind::Oscillator).unwrap();

        let good = Link::between(osc, oscillator::OUT, MASTER_ID, master::IN);
        inst.add_link(good.clone()).unwrap();
        assert_eq!(inst.add_link(good.clone()), Err(Error::DuplicateLink(good.key)));

        let missing = Link::between(UnitId(9), 0, MASTER_ID, 0);
        assert_eq!(inst.add_link(missing), Err(Error::NoSuchUnit(UnitId(9))));

        let bad_port = Link::between(osc, 3, MASTER_ID, 0);
        assert!(matches!(
            inst.add_link(bad_port),
            Err(Error::InvalidEndpoint { side: "output", .. })
        ));

        let kb = inst.create_and_add_unit(UnitKind::Keyboard).unwrap();
        let mismatch = Link::between(kb, 0, MASTER_ID, 0);
        assert_eq!(
            inst.add_link(mismatch.clone()),
            Err(Error::PortKindMismatch(mismatch.key))
        );
    }

    #[test]
    fn removing_a_unit_drops_its_links() {
        let mut inst = instrument();
        inst.create_and_add_unit(UnitKind::Master).unwrap();
        let osc = inst.create_and_add_unit(UnitKind::Oscillator).unwrap();
        let env = inst.create_and_add_unit(UnitKind::Envelope).unwrap();
        inst.add_link(Link::between(osc, oscillator::OUT, env, envelope::IN))
            .unwrap();
        inst.add_link(Link::between(env, envelope::OUT, MASTER_ID, master::IN))
            .unwrap();
        inst.init(48_000.0);
        assert_eq!(inst.connect_modules(), 2);

        inst.remove_unit(env).unwrap();
        assert!(inst.links().is_empty());
        let Some(osc_unit) = inst.unit(osc) else {
            panic!("oscillator missing");
        };
        assert!(osc_unit.outputs()[oscillator::OUT].connections().is_empty());
        assert!(!inst.master().unwrap().inputs()[master::IN].is_connected());
    }

    #[test]
    fn voice_count_reaches_every_unit() {
        let mut inst = instrument();
        inst.create_and_add_unit(UnitKind::Master).unwrap();
        let osc = inst.create_and_add_unit(UnitKind::Oscillator).unwrap();
        inst.add_link(Link::between(osc, oscillator::OUT, MASTER_ID, master::IN))
            .unwrap();
        inst.init(48_000.0);
        inst.connect_modules();

        inst.set_num_voices(13).unwrap();
        for unit in inst.units() {
            assert_eq!(unit.num_voices(), 13);
            assert_eq!(unit.bank().num_voices(), 13);
        }
        let connection = &inst.unit(osc).unwrap().outputs()[0].connections()[0];
        assert_eq!(connection.num_voices(), 13);
        assert_eq!(inst.set_num_voices(0), Err(Error::VoiceCount(0)));
    }

    #[test]
    fn link_values_follow_learned_controllers() {
        let mut inst = instrument();
        inst.create_and_add_unit(UnitKind::Master).unwrap();
        let osc = inst.create_and_add_unit(UnitKind::Oscillator).unwrap();
        let link = Link::between(osc, oscillator::OUT, MASTER_ID, master::IN)
            .with_midi(MidiShaper::new(7, 0.0, 1.0));
        let key = link.key;
        inst.add_link(link).unwrap();
        inst.init(48_000.0);
        inst.connect_modules();

        inst.on_controller(7, 0.25);
        assert_eq!(inst.link(&key).map(|l| l.value), Some(0.25));
        let connection = &inst.unit(osc).unwrap().outputs()[0].connections()[0];
        assert_eq!(connection.modulation(0), 0.25);
    }

    #[test]
    fn mono_source_tracks_velocity_for_every_target_voice() {
        let mut inst = instrument();
        inst.create_and_add_unit(UnitKind::Master).unwrap();
        let vibrato = inst.create_and_add_unit(UnitKind::Lfo).unwrap();
        let osc = inst.create_and_add_unit(UnitKind::Oscillator).unwrap();
        inst.add_link(
            Link::between(vibrato, lfo::OUT, osc, oscillator::FM)
                .with_value(0.0)
                .with_velocity_sensitivity(1.0),
        )
        .unwrap();
        inst.init(48_000.0);
        inst.connect_modules();

        inst.on_note(0, 60.0, 1.0);
        inst.on_note(1, 64.0, 0.5);

        let connection = &inst.unit(vibrato).unwrap().outputs()[lfo::OUT].connections()[0];
        assert_eq!(connection.adapter(), Adapter::MonoToPoly);
        assert_eq!(connection.modulation(0), 1.0);
        assert_eq!(connection.modulation(1), 0.5);
        assert_eq!(connection.modulation(2), 0.0);
    }
}
