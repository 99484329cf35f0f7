//! External interfaces and format conversions: raw MIDI, pitch/frequency
//! helpers and the host's output buffers.

pub mod converter;
pub mod midi;

/// Non-interleaved output, one buffer per channel.
///
/// The sink adds into these; callers clear the region they render.
#[derive(Debug, Default, Clone)]
pub struct AudioOutput {
    pub buffers: Vec<Vec<f32>>,
}

impl AudioOutput {
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            buffers: vec![vec![0.0; frames]; channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.buffers.len()
    }

    /// Frames every channel can hold.
    pub fn frames(&self) -> usize {
        self.buffers.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Zero `frames` samples starting at `start` on every channel.
    pub fn clear_range(&mut self, start: usize, frames: usize) {
        for buffer in &mut self.buffers {
            let end = (start + frames).min(buffer.len());
            if let Some(region) = buffer.get_mut(start.min(end)..end) {
                region.fill(0.0);
            }
        }
    }

    /// Add one sample to every channel at `frame`.
    #[inline]
    pub fn accumulate(&mut self, frame: usize, sample: f32) {
        for buffer in &mut self.buffers {
            if let Some(slot) = buffer.get_mut(frame) {
                *slot += sample;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_adds_to_every_channel() {
        let mut output = AudioOutput::new(2, 4);
        output.accumulate(1, 0.5);
        output.accumulate(1, 0.25);
        assert_eq!(output.buffers[0][1], 0.75);
        assert_eq!(output.buffers[1][1], 0.75);

        output.clear_range(0, 8);
        assert!(output.buffers.iter().flatten().all(|s| *s == 0.0));
    }
}
