//! Monitoring events for a UI, batched on the audio side and flushed once
//! per UI tick.

#[cfg(feature = "rtrb")]
use rtrb::Producer;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default number of events kept between two flushes.
pub const DEFAULT_MONITOR_CAPACITY: usize = 256;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorEvent {
    /// Number of sounding voices.
    Voices(usize),
    Note { pitch: f32, gate: f32 },
    Controller { controller: u8, value: f32 },
    PitchBend(f32),
}

/// Destination of flushed monitoring events.
pub trait MonitorSink {
    /// Deliver one event; `false` when the sink is full and it was dropped.
    fn push(&mut self, event: MonitorEvent) -> bool;
}

impl MonitorSink for Vec<MonitorEvent> {
    fn push(&mut self, event: MonitorEvent) -> bool {
        Vec::push(self, event);
        true
    }
}

#[cfg(feature = "rtrb")]
impl MonitorSink for Producer<MonitorEvent> {
    fn push(&mut self, event: MonitorEvent) -> bool {
        Producer::push(self, event).is_ok()
    }
}

/// Fixed-capacity batch filled from the audio path.
///
/// The voice count is coalesced: only the latest value is reported per flush.
#[derive(Debug, Clone)]
pub struct MonitorBatch {
    events: Vec<MonitorEvent>,
    capacity: usize,
    voices: Option<usize>,
    dropped: usize,
}

impl Default for MonitorBatch {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MONITOR_CAPACITY)
    }
}

impl MonitorBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            voices: None,
            dropped: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, event: MonitorEvent) {
        if let MonitorEvent::Voices(count) = event {
            self.voices = Some(count);
            return;
        }
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            tracing::trace!(?event, "monitor batch full, event dropped");
            return;
        }
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len() + usize::from(self.voices.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events lost because the batch or the sink was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Hand everything to `sink` and start a new batch. Returns the number of
    /// events delivered.
    pub fn flush(&mut self, sink: &mut dyn MonitorSink) -> usize {
        let mut delivered = 0;
        if let Some(count) = self.voices.take() {
            if sink.push(MonitorEvent::Voices(count)) {
                delivered += 1;
            } else {
                self.dropped += 1;
            }
        }
        for event in self.events.drain(..) {
            if sink.push(event) {
                delivered += 1;
            } else {
                self.dropped += 1;
            }
        }
        delivered
    }

    /// Forget pending events without delivering them.
    pub fn clear(&mut self) {
        self.events.clear();
        self.voices = None;
    }
}
