use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::engine::allocator::VoiceAllocator;
use crate::graph::instrument::Instrument;
use crate::graph::{Processing, UnitId, MASTER_ID};
use crate::io::AudioOutput;
use crate::units::UnitKind;
use crate::{Error, Result};

/*
Compile
=======

Only what the master can hear is executed. The compiler walks backward from
the master along incoming links, breadth first:

    osc ──→ env ──→ delay ──→ master        lfo (not reachable, dropped)

    visit order   master, delay, env, osc

Units that process audio or events are then ordered so that every unit runs
after the units feeding it (Kahn's algorithm). Ties, and units caught in a
feedback cycle, fall back to reversed visit order, which for plain chains is
already source before sink:

    execution     osc, env, delay, master

The first envelope met on the walk is the sentinel: when it reports a voice
finished, that voice is ended in the allocator.

Execute
=======

Per sample frame: count down to the next control tick and run the control
pass (then collect finished voices from the sentinel), run every unit's bound
entry point in order, add the master's sample to every output channel.
*/

/// Compiled, ordered view of an instrument.
#[derive(Debug, Clone)]
pub struct Sink {
    order: Vec<UnitId>,
    control: Vec<UnitId>,
    sentinel: Option<UnitId>,
    control_period: usize,
    countdown: usize,
}

impl Sink {
    pub fn new(control_period: usize) -> Self {
        Self {
            order: Vec::new(),
            control: Vec::new(),
            sentinel: None,
            control_period: control_period.max(1),
            countdown: 0,
        }
    }

    /// Execution order, sources first.
    pub fn order(&self) -> &[UnitId] {
        &self.order
    }

    /// Units run once per control tick.
    pub fn control_units(&self) -> &[UnitId] {
        &self.control
    }

    pub fn sentinel(&self) -> Option<UnitId> {
        self.sentinel
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn control_period(&self) -> usize {
        self.control_period
    }

    pub fn set_control_period(&mut self, control_period: usize) {
        self.control_period = control_period.max(1);
        self.countdown = 0;
    }

    /// Rebuild the execution lists from the instrument's current topology.
    pub fn compile(&mut self, instrument: &Instrument) {
        self.order.clear();
        self.control.clear();
        self.sentinel = None;
        self.countdown = 0;

        if instrument.master().is_none() {
            debug!("no master unit, nothing to execute");
            return;
        }
        if instrument.incoming(MASTER_ID).next().is_none() {
            debug!("master has no inputs, nothing to execute");
            return;
        }

        let visited = reachable(instrument);
        self.sentinel = visited.iter().copied().find(|&id| {
            instrument
                .unit(id)
                .is_some_and(|unit| unit.kind() == UnitKind::Envelope)
        });

        let executable: Vec<UnitId> = visited
            .iter()
            .rev()
            .copied()
            .filter(|&id| {
                instrument
                    .unit(id)
                    .is_some_and(|unit| unit.processing().is_executable())
            })
            .collect();
        self.order = topological(instrument, &executable);

        self.control = self
            .order
            .iter()
            .chain(visited.iter().rev().filter(|id| !executable.contains(id)))
            .copied()
            .filter(|&id| {
                instrument
                    .unit(id)
                    .is_some_and(|unit| unit.processing().contains(Processing::CONTROL))
            })
            .collect();

        debug!(
            order = ?self.order,
            control = ?self.control,
            sentinel = ?self.sentinel,
            "sink compiled"
        );
    }

    /// Render `frames` samples into `output` starting at `start`.
    ///
    /// Adds to what is already in `output`. An empty sink adds nothing.
    pub fn process<A: VoiceAllocator + ?Sized>(
        &mut self,
        instrument: &mut Instrument,
        allocator: &mut A,
        output: &mut AudioOutput,
        start: usize,
        frames: usize,
    ) -> Result<()> {
        if allocator.voices().len() != instrument.num_voices() {
            return Err(Error::VoiceCount(allocator.voices().len()));
        }
        if self.order.is_empty() {
            return Ok(());
        }

        for frame in start..start + frames {
            if self.countdown == 0 {
                self.countdown = self.control_period;
                for &id in &self.control {
                    instrument.run_control(id, allocator.voices());
                }
                if let Some(sentinel) = self.sentinel {
                    for voice in 0..allocator.voices().len() {
                        if instrument.take_finished(sentinel, voice)
                            && allocator.voices()[voice].is_sounding()
                        {
                            allocator.end_voice(voice);
                        }
                    }
                }
            }
            self.countdown -= 1;

            for &id in &self.order {
                instrument.run_unit(id, allocator.voices());
            }
            if let Some(sample) = instrument.master_sample() {
                output.accumulate(frame, sample);
            }
        }
        Ok(())
    }
}

/// Units reachable backward from the master, in breadth-first visit order.
fn reachable(instrument: &Instrument) -> Vec<UnitId> {
    let mut visited = vec![MASTER_ID];
    let mut queue = VecDeque::from([MASTER_ID]);
    while let Some(id) = queue.pop_front() {
        for link in instrument.incoming(id) {
            let source = link.key.source;
            if instrument.unit(source).is_some() && !visited.contains(&source) {
                visited.push(source);
                queue.push_back(source);
            }
        }
    }
    visited
}

/// Kahn's algorithm over the links between `units`, which are given in
/// fallback order.
fn topological(instrument: &Instrument, units: &[UnitId]) -> Vec<UnitId> {
    let rank = |id: UnitId| units.iter().position(|&u| u == id);
    let edges: Vec<(usize, usize)> = instrument
        .links()
        .iter()
        .filter(|link| link.key.source != link.key.dest)
        .filter_map(|link| Some((rank(link.key.source)?, rank(link.key.dest)?)))
        .collect();

    let mut in_degree = vec![0usize; units.len()];
    for &(_, dest) in &edges {
        in_degree[dest] += 1;
    }

    let mut placed = vec![false; units.len()];
    let mut order = Vec::with_capacity(units.len());
    while let Some(next) = (0..units.len()).find(|&i| !placed[i] && in_degree[i] == 0) {
        placed[next] = true;
        order.push(units[next]);
        for &(source, dest) in &edges {
            if source == next {
                in_degree[dest] -= 1;
            }
        }
    }

    if order.len() < units.len() {
        let cyclic: Vec<UnitId> = (0..units.len())
            .filter(|&i| !placed[i])
            .map(|i| units[i])
            .collect();
        warn!(units = ?cyclic, "feedback cycle, falling back to walk order");
        order.extend(cyclic);
    }
    order
}
