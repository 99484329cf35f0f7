//! Typed unit endpoints and the per-voice plumbing between them.

use crate::catalog::PortDef;
use crate::graph::link::{Link, LinkAmount, LinkKey};
use crate::graph::{PortKind, Voicing};
use crate::param::KEY_TRACK_CENTER;

/*
Voice Adapters
==============

Every unit is either mono (one state) or poly (one state per voice). When a
link joins two units the out-port picks an adapter from the two voicings:

    source  target   adapter      delivery of a value produced for voice v
    ------  ------   -----------  -------------------------------------------
    mono    mono     None         voice 0 → voice 0
    poly    poly     None         voice v → voice v
    mono    poly     MonoToPoly   voice 0 → every voice of the target
    poly    mono     PolyToMono   voice v → voice 0 (audio inputs sum them)

Per-voice buffers are sized to the instrument's voice count on both kinds of
unit, so voice indices never need translating; mono units only touch
index 0.

Each connection carries one modulation value per voice. Values are scaled
by it on delivery, and it is recomputed when notes arrive so velocity and key
tracking cost nothing per sample.
*/

/// How values cross a link between units of different voicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    None,
    MonoToPoly,
    PolyToMono,
}

impl Adapter {
    pub fn between(source: Voicing, target: Voicing) -> Self {
        match (source, target) {
            (Voicing::Mono, Voicing::Poly) => Adapter::MonoToPoly,
            (Voicing::Poly, Voicing::Mono) => Adapter::PolyToMono,
            _ => Adapter::None,
        }
    }
}

/// Receiving end of links.
#[derive(Debug, Clone)]
pub struct InPort {
    def: PortDef,
    values: Vec<f32>,
    changed: Vec<bool>,
    connections: usize,
}

impl InPort {
    pub fn new(def: PortDef) -> Self {
        Self {
            def,
            values: Vec::new(),
            changed: Vec::new(),
            connections: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn kind(&self) -> PortKind {
        self.def.kind
    }

    pub fn is_connected(&self) -> bool {
        self.connections > 0
    }

    pub fn num_voices(&self) -> usize {
        self.values.len()
    }

    /// Current value for a voice: the running sum for audio inputs, the
    /// latest event for event inputs.
    #[inline]
    pub fn value(&self, voice: usize) -> f32 {
        self.values.get(voice).copied().unwrap_or_default()
    }

    /// The event that arrived for `voice` since the unit last ran, if any.
    #[inline]
    pub fn take_event(&mut self, voice: usize) -> Option<f32> {
        let changed = self.changed.get_mut(voice)?;
        if !*changed {
            return None;
        }
        *changed = false;
        self.values.get(voice).copied()
    }

    pub(crate) fn resize(&mut self, num_voices: usize) {
        self.values.clear();
        self.values.resize(num_voices, 0.0);
        self.changed.clear();
        self.changed.resize(num_voices, false);
    }

    pub(crate) fn attach(&mut self) {
        self.connections += 1;
    }

    pub(crate) fn detach(&mut self) {
        self.connections = self.connections.saturating_sub(1);
        if self.connections == 0 {
            self.values.fill(0.0);
            self.changed.fill(false);
        }
    }

    pub(crate) fn detach_all(&mut self) {
        self.connections = 0;
        self.values.fill(0.0);
        self.changed.fill(false);
    }

    pub(crate) fn release(&mut self) {
        self.values = Vec::new();
        self.changed = Vec::new();
        self.connections = 0;
    }

    #[inline]
    pub(crate) fn receive(&mut self, voice: usize, value: f32) {
        let Some(slot) = self.values.get_mut(voice) else {
            return;
        };
        match self.def.kind {
            PortKind::Audio => *slot += value,
            PortKind::Event => {
                *slot = value;
                if let Some(changed) = self.changed.get_mut(voice) {
                    *changed = true;
                }
            }
        }
    }

    /// Prepare for the next sample once the owning unit has run.
    #[inline]
    pub(crate) fn settle(&mut self) {
        match self.def.kind {
            PortKind::Audio => self.values.fill(0.0),
            PortKind::Event => self.changed.fill(false),
        }
    }
}

/// One registered target of an out-port.
#[derive(Debug, Clone)]
pub struct Connection {
    key: LinkKey,
    adapter: Adapter,
    amount: LinkAmount,
    modulation: Vec<f32>,
    /// Last (pitch, gate) per voice, for recomputing after link edits.
    notes: Vec<(f32, f32)>,
}

impl Connection {
    pub fn new(link: &Link, adapter: Adapter, num_voices: usize) -> Self {
        let mut connection = Self {
            key: link.key,
            adapter,
            amount: link.amount(),
            modulation: Vec::new(),
            notes: Vec::new(),
        };
        connection.resize(num_voices);
        connection
    }

    pub fn key(&self) -> LinkKey {
        self.key
    }

    pub fn adapter(&self) -> Adapter {
        self.adapter
    }

    pub fn modulation(&self, voice: usize) -> f32 {
        self.modulation.get(voice).copied().unwrap_or_default()
    }

    pub fn num_voices(&self) -> usize {
        self.modulation.len()
    }

    /// Reallocate for a new voice count, reseeded from the link's base value.
    pub(crate) fn resize(&mut self, num_voices: usize) {
        self.modulation.clear();
        self.modulation.resize(num_voices, self.amount.base);
        self.notes.clear();
        self.notes.resize(num_voices, (KEY_TRACK_CENTER, 0.0));
    }

    pub(crate) fn update(&mut self, link: &Link) {
        self.amount = link.amount();
        for (modulation, &(pitch, gate)) in self.modulation.iter_mut().zip(&self.notes) {
            *modulation = self.amount.for_note(pitch, gate);
        }
    }

    /// Modulation slot a broadcast for `voice` lands in. A mono source
    /// fanning out to a poly target keeps one slot per target voice.
    #[inline]
    pub(crate) fn note_voice(&self, voice: usize, local: usize) -> usize {
        match self.adapter {
            Adapter::MonoToPoly => voice,
            Adapter::None | Adapter::PolyToMono => local,
        }
    }

    #[inline]
    pub(crate) fn on_note(&mut self, voice: usize, pitch: f32, gate: f32) {
        if let Some(note) = self.notes.get_mut(voice) {
            *note = (pitch, gate);
        }
        self.recompute(voice);
    }

    #[inline]
    pub(crate) fn on_pitch(&mut self, voice: usize, pitch: f32) {
        if let Some(note) = self.notes.get_mut(voice) {
            note.0 = pitch;
        }
        self.recompute(voice);
    }

    #[inline]
    pub(crate) fn on_gate(&mut self, voice: usize, gate: f32) {
        if let Some(note) = self.notes.get_mut(voice) {
            note.1 = gate;
        }
        self.recompute(voice);
    }

    fn recompute(&mut self, voice: usize) {
        if !self.amount.is_note_sensitive() {
            return;
        }
        if let (Some(modulation), Some(&(pitch, gate))) =
            (self.modulation.get_mut(voice), self.notes.get(voice))
        {
            *modulation = self.amount.for_note(pitch, gate);
        }
    }

    /// Hand a value produced for `voice` to the target in-port.
    #[inline]
    pub(crate) fn deliver(&self, target: &mut InPort, voice: usize, value: f32) {
        match self.adapter {
            Adapter::None => target.receive(voice, value * self.modulation(voice)),
            Adapter::MonoToPoly => {
                for target_voice in 0..target.num_voices() {
                    target.receive(target_voice, value * self.modulation(target_voice));
                }
            }
            Adapter::PolyToMono => target.receive(0, value * self.modulation(voice)),
        }
    }
}

/// Producing end of links.
#[derive(Debug, Clone)]
pub struct OutPort {
    def: PortDef,
    values: Vec<f32>,
    fired: Vec<bool>,
    connections: Vec<Connection>,
}

impl OutPort {
    pub fn new(def: PortDef) -> Self {
        Self {
            def,
            values: Vec::new(),
            fired: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn kind(&self) -> PortKind {
        self.def.kind
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn num_voices(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn value(&self, voice: usize) -> f32 {
        self.values.get(voice).copied().unwrap_or_default()
    }

    /// Write this sample's audio value for a voice.
    #[inline]
    pub fn set(&mut self, voice: usize, value: f32) {
        if let Some(slot) = self.values.get_mut(voice) {
            *slot = value;
        }
    }

    /// Emit an event for a voice; delivered after the unit's next run.
    #[inline]
    pub fn fire(&mut self, voice: usize, value: f32) {
        if let (Some(slot), Some(fired)) = (self.values.get_mut(voice), self.fired.get_mut(voice)) {
            *slot = value;
            *fired = true;
        }
    }

    #[inline]
    pub fn has_fired(&self, voice: usize) -> bool {
        self.fired.get(voice).copied().unwrap_or(false)
    }

    pub(crate) fn clear_fired(&mut self) {
        self.fired.fill(false);
    }

    pub(crate) fn connections_mut(&mut self) -> &mut [Connection] {
        &mut self.connections
    }

    /// Register a target. Replaces an existing connection with the same key.
    pub(crate) fn connect(&mut self, connection: Connection) {
        match self.connections.iter_mut().find(|c| c.key == connection.key) {
            Some(existing) => *existing = connection,
            None => self.connections.push(connection),
        }
    }

    pub(crate) fn disconnect(&mut self, key: &LinkKey) -> Option<Connection> {
        let index = self.connections.iter().position(|c| c.key == *key)?;
        Some(self.connections.remove(index))
    }

    pub(crate) fn disconnect_all(&mut self) {
        self.connections.clear();
    }

    pub(crate) fn resize(&mut self, num_voices: usize) {
        self.values.clear();
        self.values.resize(num_voices, 0.0);
        self.fired.clear();
        self.fired.resize(num_voices, false);
        for connection in &mut self.connections {
            connection.resize(num_voices);
        }
    }

    pub(crate) fn release(&mut self) {
        self.values = Vec::new();
        self.fired = Vec::new();
        self.connections.clear();
    }
}
