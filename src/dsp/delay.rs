/// Circular buffer delay with linear interpolation between samples.
///
/// The buffer is sized once, outside the audio path; reading and writing
/// never allocate.
#[derive(Debug, Clone, Default)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples],
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Reallocate for a new maximum delay and clear the contents.
    pub fn resize(&mut self, max_samples: usize) {
        self.buffer.clear();
        self.buffer.resize(max_samples, 0.0);
        self.write_pos = 0;
    }

    /// Read `delay_samples` behind the last written sample.
    ///
    /// A delay of 1 returns the most recent sample. Fractional delays blend
    /// the two neighbours.
    #[inline]
    pub fn read(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        if len < 2 {
            return 0.0;
        }
        let delay = if delay_samples.is_nan() {
            1.0
        } else {
            delay_samples.clamp(1.0, (len - 1) as f32)
        };
        let whole = delay.floor();
        let frac = delay - whole;
        let whole = whole as usize;

        let newer = self.buffer[(self.write_pos + len - whole) % len];
        let older = self.buffer[(self.write_pos + len - whole - 1) % len];
        newer + (older - newer) * frac
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        let len = self.buffer.len();
        if len == 0 {
            return;
        }
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % len;
    }

    /// Feedback delay for one sample: returns the delayed signal and writes
    /// `input + delayed · feedback`.
    #[inline]
    pub fn next_sample(&mut self, input: f32, delay_samples: f32, feedback: f32) -> f32 {
        let delayed = self.read(delay_samples);
        self.write(input + delayed * feedback);
        delayed
    }

    pub fn render(&mut self, buffer: &mut [f32], delay_samples: f32, feedback: f32) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample(*sample, delay_samples, feedback);
        }
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_comes_back_after_delay() {
        let mut line = DelayLine::with_capacity(16);
        let mut buffer = [0.0f32; 8];
        buffer[0] = 1.0;
        line.render(&mut buffer, 3.0, 0.0);
        assert_eq!(buffer, [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn fractional_read_interpolates() {
        let mut line = DelayLine::with_capacity(8);
        line.write(1.0);
        line.write(0.0);
        // 1.0 sits two samples back, 0.0 one sample back
        assert!((line.read(1.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn feedback_repeats_decay() {
        let mut line = DelayLine::with_capacity(16);
        let mut buffer = [0.0f32; 10];
        buffer[0] = 1.0;
        line.render(&mut buffer, 4.0, 0.5);
        assert_eq!(buffer[4], 1.0);
        assert_eq!(buffer[8], 0.5);
    }

    #[test]
    fn empty_line_is_silent() {
        let mut line = DelayLine::default();
        assert_eq!(line.next_sample(1.0, 10.0, 0.9), 0.0);
    }
}
