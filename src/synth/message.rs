use std::collections::VecDeque;

#[cfg(feature = "rtrb")]
use rtrb::Consumer;

use crate::graph::UnitId;
use crate::param::ParamId;

/// Commands sent to the engine from outside the audio callback.
///
/// None of these change the graph topology, so they are safe to apply
/// between two samples. Topology edits go through `Engine::edit`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SynthMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    /// Normalized to -1.0..=1.0.
    PitchBend { value: f32 },
    /// Normalized to 0.0..=1.0.
    Controller { controller: u8, value: f32 },
    AllNotesOff,
    SetHold(bool),
    SetParameter { unit: UnitId, param: ParamId, value: f32 },
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<SynthMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<SynthMessage> {
    fn pop(&mut self) -> Option<SynthMessage> {
        Consumer::pop(self).ok()
    }
}

impl MessageReceiver for VecDeque<SynthMessage> {
    fn pop(&mut self) -> Option<SynthMessage> {
        self.pop_front()
    }
}
