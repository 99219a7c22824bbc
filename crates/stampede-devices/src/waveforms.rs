//! Time-varying source waveforms.
//!
//! Periodic shapes share the same parameters: peak `amplitude` around a
//! `bias`, a `frequency` in Hz and a `phase` in radians. They are evaluated
//! from the phase angle `w = 2*pi*f*t + phase`.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{finite, Error, Result};
use crate::rng;

const TWO_PI: f64 = 2.0 * PI;

/// A time-varying waveform specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Waveform {
    /// Constant value.
    Dc { value: f64 },

    /// Sine wave.
    Ac {
        amplitude: f64,
        bias: f64,
        frequency: f64,
        #[serde(default)]
        phase: f64,
    },

    /// Square wave, high for the first `duty` fraction of each period.
    Square {
        amplitude: f64,
        bias: f64,
        frequency: f64,
        #[serde(default)]
        phase: f64,
        duty: f64,
    },

    /// Symmetric triangle from `-amplitude` up to `+amplitude` and back.
    Triangle {
        amplitude: f64,
        bias: f64,
        frequency: f64,
        #[serde(default)]
        phase: f64,
    },

    /// Linear ramp from `-amplitude` to `+amplitude` each period.
    Sawtooth {
        amplitude: f64,
        bias: f64,
        frequency: f64,
        #[serde(default)]
        phase: f64,
    },

    /// Narrow pulse at the start of each period, lasting one radian of
    /// phase.
    Pulse {
        amplitude: f64,
        bias: f64,
        frequency: f64,
        #[serde(default)]
        phase: f64,
    },

    /// Piecewise linear: interpolates `(time, value)` points, holding the
    /// end values outside their range.
    Pwl { points: Vec<(f64, f64)> },

    /// Uniform noise in `bias +/- amplitude`, reproducible from `seed`.
    Noise {
        amplitude: f64,
        bias: f64,
        #[serde(default)]
        seed: u64,
    },
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Dc { value: 5.0 }
    }
}

impl Waveform {
    /// Create a DC waveform.
    pub fn dc(value: f64) -> Self {
        Waveform::Dc { value }
    }

    /// Create a sine wave with no bias.
    pub fn ac(amplitude: f64, frequency: f64) -> Self {
        Waveform::Ac {
            amplitude,
            bias: 0.0,
            frequency,
            phase: 0.0,
        }
    }

    /// Create a square wave swinging between `low` and `high`.
    pub fn square(low: f64, high: f64, frequency: f64, duty: f64) -> Self {
        Waveform::Square {
            amplitude: (high - low) / 2.0,
            bias: (high + low) / 2.0,
            frequency,
            phase: 0.0,
            duty,
        }
    }

    /// Create a piecewise linear waveform.
    pub fn pwl(points: Vec<(f64, f64)>) -> Self {
        Waveform::Pwl { points }
    }

    /// True if the value never changes with time.
    pub fn is_constant(&self) -> bool {
        matches!(self, Waveform::Dc { .. })
    }

    /// Check ranges: finite parameters, non-negative frequency, duty cycle
    /// within [0, 1] and PWL times in ascending order.
    pub fn validate(&self) -> Result<()> {
        match self {
            Waveform::Dc { value } => finite("dc value", *value),
            Waveform::Ac {
                amplitude,
                bias,
                frequency,
                phase,
            }
            | Waveform::Triangle {
                amplitude,
                bias,
                frequency,
                phase,
            }
            | Waveform::Sawtooth {
                amplitude,
                bias,
                frequency,
                phase,
            }
            | Waveform::Pulse {
                amplitude,
                bias,
                frequency,
                phase,
            } => check_periodic(*amplitude, *bias, *frequency, *phase),
            Waveform::Square {
                amplitude,
                bias,
                frequency,
                phase,
                duty,
            } => {
                check_periodic(*amplitude, *bias, *frequency, *phase)?;
                if !(0.0..=1.0).contains(duty) {
                    return Err(Error::InvalidValue {
                        name: "duty cycle".to_string(),
                        value: *duty,
                    });
                }
                Ok(())
            }
            Waveform::Pwl { points } => {
                if points.is_empty() {
                    return Err(Error::InvalidParameter(
                        "PWL waveform needs at least one point".to_string(),
                    ));
                }
                for (t, v) in points {
                    finite("pwl time", *t)?;
                    finite("pwl value", *v)?;
                }
                if points.windows(2).any(|w| w[1].0 < w[0].0) {
                    return Err(Error::InvalidParameter(
                        "PWL times must be ascending".to_string(),
                    ));
                }
                Ok(())
            }
            Waveform::Noise {
                amplitude, bias, ..
            } => {
                finite("amplitude", *amplitude)?;
                finite("bias", *bias)
            }
        }
    }

    /// Evaluate the waveform at a given time.
    pub fn value_at(&self, time: f64) -> f64 {
        match self {
            Waveform::Dc { value } => *value,
            Waveform::Ac {
                amplitude,
                bias,
                frequency,
                phase,
            } => (angle(time, *frequency, *phase)).sin() * amplitude + bias,
            Waveform::Square {
                amplitude,
                bias,
                frequency,
                phase,
                duty,
            } => {
                let w = angle(time, *frequency, *phase).rem_euclid(TWO_PI);
                if w > TWO_PI * duty {
                    bias - amplitude
                } else {
                    bias + amplitude
                }
            }
            Waveform::Triangle {
                amplitude,
                bias,
                frequency,
                phase,
            } => {
                let w = angle(time, *frequency, *phase).rem_euclid(TWO_PI);
                bias + triangle(w) * amplitude
            }
            Waveform::Sawtooth {
                amplitude,
                bias,
                frequency,
                phase,
            } => {
                let w = angle(time, *frequency, *phase).rem_euclid(TWO_PI);
                bias + w * (amplitude / PI) - amplitude
            }
            Waveform::Pulse {
                amplitude,
                bias,
                frequency,
                phase,
            } => {
                let w = angle(time, *frequency, *phase).rem_euclid(TWO_PI);
                if w < 1.0 {
                    amplitude + bias
                } else {
                    *bias
                }
            }
            Waveform::Pwl { points } => eval_pwl(points, time),
            Waveform::Noise {
                amplitude,
                bias,
                seed,
            } => {
                let u = rng::uniform(*seed, time.to_bits(), 0);
                (u * 2.0 - 1.0) * amplitude + bias
            }
        }
    }

    /// Peak-to-peak extremes, used for reporting.
    pub fn range(&self) -> (f64, f64) {
        match self {
            Waveform::Dc { value } => (*value, *value),
            Waveform::Ac {
                amplitude, bias, ..
            }
            | Waveform::Square {
                amplitude, bias, ..
            }
            | Waveform::Triangle {
                amplitude, bias, ..
            }
            | Waveform::Sawtooth {
                amplitude, bias, ..
            }
            | Waveform::Noise {
                amplitude, bias, ..
            } => (bias - amplitude.abs(), bias + amplitude.abs()),
            Waveform::Pulse {
                amplitude, bias, ..
            } => (bias.min(bias + amplitude), bias.max(bias + amplitude)),
            Waveform::Pwl { points } => points.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)),
            ),
        }
    }
}

fn check_periodic(amplitude: f64, bias: f64, frequency: f64, phase: f64) -> Result<()> {
    finite("amplitude", amplitude)?;
    finite("bias", bias)?;
    finite("phase", phase)?;
    if !frequency.is_finite() || frequency < 0.0 {
        return Err(Error::InvalidValue {
            name: "frequency".to_string(),
            value: frequency,
        });
    }
    Ok(())
}

fn angle(time: f64, frequency: f64, phase: f64) -> f64 {
    TWO_PI * time * frequency + phase
}

/// Triangle over one period of phase: -1 at 0, +1 at pi.
fn triangle(x: f64) -> f64 {
    if x < PI {
        x * (2.0 / PI) - 1.0
    } else {
        1.0 - (x - PI) * (2.0 / PI)
    }
}

fn eval_pwl(points: &[(f64, f64)], time: f64) -> f64 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return 0.0,
    };
    if time <= first.0 {
        return first.1;
    }
    if time >= last.0 {
        return last.1;
    }
    for w in points.windows(2) {
        let (t0, v0) = w[0];
        let (t1, v1) = w[1];
        if time >= t0 && time <= t1 {
            if t1 == t0 {
                return v1;
            }
            return v0 + (v1 - v0) * (time - t0) / (t1 - t0);
        }
    }
    last.1
}
