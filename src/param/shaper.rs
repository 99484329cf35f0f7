//! Nonlinear value curves and quantization.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Value Shaping
=============

Knobs are linear, ears are not. A filter cutoff or an envelope time feels
right when the first half of the knob travel covers a small part of the range
and the second half covers the rest. The shaper maps a stored parameter value
through a curve before the unit sees it.

Vocabulary
----------

  range       [min, max] of the parameter in its own units (Hz, seconds, ...).

  normalized  The value rescaled to [0, 1]:  v = (value - min) / (max - min)

  factor      Curve strength. 0 is a straight line, > 0 bends the curve
              below the diagonal (convex, slow start), < 0 bends it above
              (concave, fast start).

  steps       Number of equal intervals [min, max] is split into for
              quantization. 0 means continuous.


The Curve
---------

With k = |factor| * ln(CURVE_BASE) the convex curve is

    g(v) = v * CURVE_BASE^((1 - v) * -|factor|) = v * e^(k (v - 1))

g(0) = 0 and g(1) = 1, so the end points of the range never move. The
concave curve is the same shape mirrored through the centre of the unit
square:

    h(v) = 1 - g(1 - v)

Both are strictly increasing for every factor, which is what makes an exact
inverse possible.

    1.0 ┐          ..·´          1.0 ┐   ..·········
        │        .´                  │  ·´
        │      .´                    │ ·
        │   ..´                      │·
    0.0 └···────────→           0.0 └────────────→
          factor > 0                   factor < 0


The Inverse (Lambert W)
-----------------------

Solving y = v e^(k (v - 1)) for v:

    y e^k       = v e^(k v)
    k y e^k     = (k v) e^(k v)
    k v         = W(k y e^k)
    v           = W(k y e^k) / k

W is the principal branch of the Lambert W function (w e^w = x). The
argument is never negative here, so the principal branch is always the right
one. `linear` applies this (mirrored for negative factors), so that

    linear(exponential(x)) == x

for every x in range, up to floating-point error.


Degenerate Input
----------------

NaN, infinities and denormals never leave the shaper: they collapse to the
minimum of the range. Out-of-range input is clamped first.
*/

/// Base of the curve exponent.
pub const CURVE_BASE: f64 = 10.0;

/// Maps parameter values through an invertible curve and optional quantization.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueShaper {
    pub min: f32,
    pub max: f32,
    pub steps: u32,
    pub factor: f32,
}

impl Default for ValueShaper {
    fn default() -> Self {
        Self::linear_range(0.0, 1.0)
    }
}

impl ValueShaper {
    pub fn new(min: f32, max: f32, steps: u32, factor: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            steps,
            factor: if factor.is_finite() { factor } else { 0.0 },
        }
    }

    /// Continuous range with no curve.
    pub fn linear_range(min: f32, max: f32) -> Self {
        Self::new(min, max, 0, 0.0)
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_factor(mut self, factor: f32) -> Self {
        self.factor = if factor.is_finite() { factor } else { 0.0 };
        self
    }

    /// Clamp into range; NaN becomes `min`.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }

    fn span(&self) -> f32 {
        self.max - self.min
    }

    pub fn normalize(&self, value: f32) -> f32 {
        let span = self.span();
        if span <= 0.0 {
            return 0.0;
        }
        (self.clamp(value) - self.min) / span
    }

    pub fn denormalize(&self, normalized: f32) -> f32 {
        self.min + normalized.clamp(0.0, 1.0) * self.span()
    }

    /// Width of one quantization step, or 0 for continuous ranges.
    pub fn step_size(&self) -> f32 {
        if self.steps == 0 {
            0.0
        } else {
            self.span() / self.steps as f32
        }
    }

    /// Round to the nearest step boundary. Continuous ranges only clamp.
    pub fn quantize(&self, value: f32) -> f32 {
        let value = self.clamp(value);
        let step = self.step_size();
        if step <= 0.0 {
            return value;
        }
        let index = ((value - self.min) / step).round();
        self.clamp(self.min + index * step)
    }

    /// Apply the curve: stored value → value the unit works with.
    pub fn exponential(&self, value: f32) -> f32 {
        let v = self.normalize(value) as f64;
        if self.factor == 0.0 {
            return self.denormalize(v as f32);
        }

        let k = self.curve_constant();
        let shaped = if self.factor > 0.0 {
            convex(v, k)
        } else {
            1.0 - convex(1.0 - v, k)
        };
        self.denormalize(sanitize(shaped))
    }

    /// Inverse of [`exponential`](Self::exponential) for the same factor.
    pub fn linear(&self, value: f32) -> f32 {
        let y = self.normalize(value) as f64;
        if self.factor == 0.0 {
            return self.denormalize(y as f32);
        }

        let k = self.curve_constant();
        let v = if self.factor > 0.0 {
            convex_inverse(y, k)
        } else {
            1.0 - convex_inverse(1.0 - y, k)
        };
        self.denormalize(sanitize(v))
    }

    fn curve_constant(&self) -> f64 {
        (self.factor as f64).abs() * CURVE_BASE.ln()
    }
}

/// v · e^(k (v − 1)), k ≥ 0.
#[inline]
fn convex(v: f64, k: f64) -> f64 {
    v * (k * (v - 1.0)).exp()
}

#[inline]
fn convex_inverse(y: f64, k: f64) -> f64 {
    if k == 0.0 || y <= 0.0 {
        return y.max(0.0);
    }
    lambert_w0(k * y * k.exp()) / k
}

/// Collapse NaN, infinities and denormals to the bottom of the range.
#[inline]
fn sanitize(normalized: f64) -> f32 {
    let value = normalized as f32;
    if !value.is_finite() || (value != 0.0 && !value.is_normal()) {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Principal branch of the Lambert W function for x ≥ −1/e.
///
/// Halley iteration; converges in a handful of steps over the arguments the
/// shaper produces.
pub fn lambert_w0(x: f64) -> f64 {
    if x.is_nan() || x < -1.0 / core::f64::consts::E {
        return f64::NAN;
    }
    if x == 0.0 {
        return 0.0;
    }
    if x.is_infinite() {
        return f64::INFINITY;
    }

    let mut w = if x < 1.0 {
        // series around 0
        x * (1.0 - x)
    } else {
        let l = x.ln();
        l - l.max(1.0).ln()
    };

    for _ in 0..64 {
        let ew = w.exp();
        let f = w * ew - x;
        let wp1 = w + 1.0;
        if wp1 == 0.0 {
            break;
        }
        let step = f / (ew * wp1 - (w + 2.0) * f / (2.0 * wp1));
        w -= step;
        if step.abs() <= 1e-14 * (1.0 + w.abs()) {
            break;
        }
    }
    w
}
