use crate::io::midi::MidiEvent;

/// Default number of pending events.
pub const DEFAULT_SCHEDULER_CAPACITY: usize = 256;

/// Sample-accurate MIDI queue.
///
/// Offsets are in frames relative to the start of the next `Engine::process`
/// call. Events with the same offset keep their enqueue order. The queue
/// never grows past its capacity, so enqueueing from the audio thread does
/// not allocate.
#[derive(Debug, Clone)]
pub struct Scheduler {
    queue: Vec<(usize, MidiEvent)>,
    capacity: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEDULER_CAPACITY)
    }
}

impl Scheduler {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Queue `event` at `offset`. Returns `false` when the queue is full.
    pub fn enqueue(&mut self, offset: usize, event: MidiEvent) -> bool {
        if self.queue.len() >= self.capacity {
            return false;
        }
        let index = self.queue.partition_point(|(at, _)| *at <= offset);
        self.queue.insert(index, (offset, event));
        true
    }

    /// Offset of the earliest pending event.
    pub fn next_offset(&self) -> Option<usize> {
        self.queue.first().map(|(offset, _)| *offset)
    }

    /// Remove and return the earliest event if it is due at or before
    /// `position`.
    pub fn pop_due(&mut self, position: usize) -> Option<MidiEvent> {
        match self.queue.first() {
            Some((offset, _)) if *offset <= position => Some(self.queue.remove(0).1),
            _ => None,
        }
    }

    /// Shift every pending offset back by `frames`.
    pub fn advance(&mut self, frames: usize) {
        for (offset, _) in &mut self.queue {
            *offset = offset.saturating_sub(frames);
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(key: u8) -> MidiEvent {
        MidiEvent::NoteOn {
            channel: 0,
            key,
            velocity: 100,
        }
    }

    #[test]
    fn events_come_out_in_offset_order() {
        let mut scheduler = Scheduler::new(8);
        scheduler.enqueue(32, note(3));
        scheduler.enqueue(0, note(1));
        scheduler.enqueue(32, note(4));
        scheduler.enqueue(16, note(2));

        assert_eq!(scheduler.next_offset(), Some(0));
        assert_eq!(scheduler.pop_due(0), Some(note(1)));
        assert_eq!(scheduler.pop_due(15), None);
        assert_eq!(scheduler.pop_due(32), Some(note(2)));
        assert_eq!(scheduler.pop_due(32), Some(note(3)));
        assert_eq!(scheduler.pop_due(32), Some(note(4)));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn advance_carries_events_into_the_next_block() {
        let mut scheduler = Scheduler::new(8);
        scheduler.enqueue(100, note(60));
        scheduler.advance(64);
        assert_eq!(scheduler.next_offset(), Some(36));
        scheduler.advance(64);
        assert_eq!(scheduler.next_offset(), Some(0));
    }

    #[test]
    fn full_queue_rejects_events() {
        let mut scheduler = Scheduler::new(1);
        assert!(scheduler.enqueue(0, note(60)));
        assert!(!scheduler.enqueue(0, note(61)));
        assert_eq!(scheduler.len(), 1);
    }
}
