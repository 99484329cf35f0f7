/*
ADSR Envelope, Split Across Two Clocks
======================================

  Level
    1.0 ┐     ╱╲
        │    ╱  ╲___________
    S   │   ╱               ╲
        │  ╱                 ╲
    0.0 └─╱───────────────────╲──→ Time
        Attack Decay  Sustain  Release

Ramps are linear. The work is split between two rates:

  audio rate    `next_sample` adds the stage's increment to the level and
                stops at the stage target. One add and one compare.

  control rate  `control` runs once per control tick (a few hundred times a
                second). It moves to the next stage once a target has been
                reached and re-derives the increment from the current
                parameters, so knob changes take effect without any per-sample
                division.

The cost of the split is timing resolution: a stage can sit at its target for
up to one control period before the next stage starts. At 48 kHz and a
400 Hz control rate that is 2.5 ms.

Increments come from the stage time:

    attack   +1 / (attack · sample_rate)
    decay    −(1 − sustain) / (decay · sample_rate)
    release  −release_start / (release · sample_rate)

Stage times are floored at one sample of the running rate, so a zero attack
jumps to full level on the next sample whatever the sample rate.

Release starts from the level at gate-off, not from the sustain level, so
releasing during the attack does not click. A gate-on restarts the attack from
zero for a clean retrigger.

When the release reaches zero, `control` reports it once. That report is how a
voice learns it has stopped sounding.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Envelope shape: times in seconds, sustain as a level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Adsr {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: if sustain.is_nan() { 0.0 } else { sustain.clamp(0.0, 1.0) },
            release: release.max(0.0),
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new(0.01, 0.1, 0.7, 0.3)
    }
}

/// Length of a stage in samples, never shorter than one.
#[inline]
fn stage_samples(time: f32, sample_rate: f32) -> f32 {
    (time * sample_rate).max(1.0)
}

#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    stage: EnvelopeStage,
    level: f32,
    increment: f32,
    target: f32,
    release_start: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    pub const fn new() -> Self {
        Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            increment: 0.0,
            target: 0.0,
            release_start: 0.0,
        }
    }

    pub fn gate_on(&mut self, adsr: &Adsr, sample_rate: f32) {
        self.level = 0.0;
        self.stage = EnvelopeStage::Attack;
        self.retarget(adsr, sample_rate);
    }

    pub fn gate_off(&mut self, adsr: &Adsr, sample_rate: f32) {
        if self.stage == EnvelopeStage::Idle {
            return;
        }
        self.release_start = self.level;
        self.stage = EnvelopeStage::Release;
        self.retarget(adsr, sample_rate);
    }

    /// Evaluate stage transitions; `true` exactly once, when the release
    /// has reached zero.
    pub fn control(&mut self, adsr: &Adsr, sample_rate: f32) -> bool {
        let mut finished = false;
        match self.stage {
            EnvelopeStage::Attack if self.level >= 1.0 => self.stage = EnvelopeStage::Decay,
            EnvelopeStage::Decay if self.level <= adsr.sustain => {
                self.stage = EnvelopeStage::Sustain
            }
            EnvelopeStage::Release if self.level <= 0.0 => {
                self.stage = EnvelopeStage::Idle;
                self.level = 0.0;
                finished = true;
            }
            _ => {}
        }
        self.retarget(adsr, sample_rate);
        finished
    }

    fn retarget(&mut self, adsr: &Adsr, sample_rate: f32) {
        let (target, increment) = match self.stage {
            EnvelopeStage::Idle => (0.0, 0.0),
            EnvelopeStage::Attack => (1.0, 1.0 / stage_samples(adsr.attack, sample_rate)),
            EnvelopeStage::Decay => (
                adsr.sustain,
                -(1.0 - adsr.sustain) / stage_samples(adsr.decay, sample_rate),
            ),
            EnvelopeStage::Sustain => {
                self.level = adsr.sustain;
                (adsr.sustain, 0.0)
            }
            EnvelopeStage::Release => (
                0.0,
                -self.release_start / stage_samples(adsr.release, sample_rate),
            ),
        };
        self.target = target;
        self.increment = if increment.is_finite() { increment } else { 0.0 };
    }

    /// Advance one sample and return the new level.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let next = self.level + self.increment;
        self.level = if self.increment > 0.0 {
            next.min(self.target)
        } else if self.increment < 0.0 {
            next.max(self.target)
        } else {
            self.level
        };
        self.level
    }

    /// Render a block, running `control` every `control_period` samples.
    pub fn render(
        &mut self,
        buffer: &mut [f32],
        adsr: &Adsr,
        sample_rate: f32,
        control_period: usize,
    ) {
        let period = control_period.max(1);
        for (index, sample) in buffer.iter_mut().enumerate() {
            if index % period == 0 {
                self.control(adsr, sample_rate);
            }
            *sample = self.next_sample();
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 1_000.0;

    fn run(env: &mut Envelope, adsr: &Adsr, samples: usize, control_period: usize) -> bool {
        let mut finished = false;
        for index in 0..samples {
            if index % control_period == 0 {
                finished |= env.control(adsr, SAMPLE_RATE);
            }
            env.next_sample();
        }
        finished
    }

    #[test]
    fn attack_reaches_full_level() {
        let adsr = Adsr::new(0.01, 0.1, 0.7, 0.2);
        let mut env = Envelope::new();
        env.gate_on(&adsr, SAMPLE_RATE);

        for _ in 0..11 {
            env.next_sample();
        }
        assert!(env.level() > 0.99, "expected attack to reach full level");

        env.control(&adsr, SAMPLE_RATE);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn attack_holds_at_peak_until_control_tick() {
        let adsr = Adsr::new(0.01, 0.1, 0.7, 0.2);
        let mut env = Envelope::new();
        env.gate_on(&adsr, SAMPLE_RATE);
        for _ in 0..30 {
            env.next_sample();
        }
        assert_eq!(env.level(), 1.0);
        assert_eq!(env.stage(), EnvelopeStage::Attack);
    }

    #[test]
    fn sustain_holds_target_level() {
        let adsr = Adsr::new(0.01, 0.05, 0.6, 0.2);
        let mut env = Envelope::new();
        env.gate_on(&adsr, SAMPLE_RATE);
        run(&mut env, &adsr, 100, 4);

        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert!((env.level() - 0.6).abs() < 1e-6, "sustain level should be held");
    }

    #[test]
    fn release_falls_back_to_idle_and_reports_once() {
        let adsr = Adsr::new(0.01, 0.05, 0.5, 0.03);
        let mut env = Envelope::new();
        env.gate_on(&adsr, SAMPLE_RATE);
        run(&mut env, &adsr, 20, 4);

        env.gate_off(&adsr, SAMPLE_RATE);
        assert!(run(&mut env, &adsr, 40, 4));
        assert_eq!(env.level(), 0.0);
        assert_eq!(env.stage(), EnvelopeStage::Idle);
        assert!(!run(&mut env, &adsr, 40, 4));
    }

    #[test]
    fn gate_off_while_idle_is_ignored() {
        let adsr = Adsr::default();
        let mut env = Envelope::new();
        env.gate_off(&adsr, SAMPLE_RATE);
        assert!(!env.is_active());
    }

    #[test]
    fn degenerate_shape_is_clamped() {
        let adsr = Adsr::new(0.0, -1.0, f32::NAN, f32::NAN);
        assert_eq!((adsr.attack, adsr.decay, adsr.release), (0.0, 0.0, 0.0));
        assert_eq!(adsr.sustain, 0.0);
    }

    #[test]
    fn zero_attack_takes_one_sample_at_any_rate() {
        let adsr = Adsr::new(0.0, 0.1, 0.5, 0.1);
        for sample_rate in [8_000.0, 44_100.0, 96_000.0, 192_000.0] {
            let mut env = Envelope::new();
            env.gate_on(&adsr, sample_rate);
            assert_eq!(env.next_sample(), 1.0, "at {sample_rate} Hz");
        }
    }
}
