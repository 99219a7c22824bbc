//! Diode, LED and zener models.
//!
//! The junction follows `i = Is * (exp(v / Vt) - 1)` with `Is = 1e-14`. `Vt`
//! is chosen so that the diode carries 1 A at its forward drop. Each Newton
//! iteration the voltage is step-limited the way SPICE does it, then the
//! exponential is linearized into a conductance and a parallel current
//! source.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, Pins, StepContext, Stamper};

use crate::error::{finite, positive, Error};

/// Saturation current (A).
pub const LEAKAGE: f64 = 1e-14;

/// Default forward drop of a silicon diode (V).
pub const DEFAULT_FORWARD_DROP: f64 = 0.805904783;

/// Default forward drop of an LED (V).
pub const LED_FORWARD_DROP: f64 = 2.1;

/// Zener offset is chosen to give this current at the zener voltage (A).
const ZENER_CURRENT: f64 = -0.005;

/// Largest voltage change between iterations that still counts as settled.
pub const VOLTAGE_TOLERANCE: f64 = 0.01;

/// Derived junction constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Junction {
    pub leakage: f64,
    pub vdcoef: f64,
    pub vt: f64,
    pub vcrit: f64,
    /// Reverse-breakdown offset, zero for a plain diode.
    pub zoffset: f64,
}

impl Junction {
    pub fn new(leakage: f64, forward_drop: f64, zener_voltage: f64) -> Self {
        let vdcoef = (1.0 / leakage + 1.0).ln() / forward_drop;
        let vt = 1.0 / vdcoef;
        let vcrit = vt * (vt / (std::f64::consts::SQRT_2 * leakage)).ln();
        let zoffset = if zener_voltage == 0.0 {
            0.0
        } else {
            zener_voltage - (-(1.0 + ZENER_CURRENT / leakage)).ln() / vdcoef
        };
        Self {
            leakage,
            vdcoef,
            vt,
            vcrit,
            zoffset,
        }
    }

    fn limit_forward(&self, vnew: f64, vold: f64) -> Option<f64> {
        if vnew > self.vcrit && (vnew - vold).abs() > self.vt + self.vt {
            let limited = if vold > 0.0 {
                let arg = 1.0 + (vnew - vold) / self.vt;
                if arg > 0.0 {
                    // current at v0 = 1uA
                    let v0 = (1e-6 / self.leakage).ln() * self.vt;
                    (vold + self.vt * arg.ln()).max(v0)
                } else {
                    self.vcrit
                }
            } else {
                self.vt * (vnew / self.vt).ln()
            };
            Some(limited)
        } else {
            None
        }
    }

    /// SPICE-style step limiting. Returns the limited voltage and whether
    /// limiting kicked in.
    pub fn limit_step(&self, vnew: f64, vold: f64) -> (f64, bool) {
        if let Some(v) = self.limit_forward(vnew, vold) {
            return (v, true);
        }
        if vnew < 0.0 && self.zoffset != 0.0 {
            // zener breakdown mirrors the forward case around the offset
            let mnew = -vnew - self.zoffset;
            let mold = -vold - self.zoffset;
            if let Some(v) = self.limit_forward(mnew, mold) {
                return (-(v + self.zoffset), true);
            }
        }
        (vnew, false)
    }

    fn is_forward(&self, v: f64) -> bool {
        v >= 0.0 || self.zoffset == 0.0
    }

    /// Conductance `geq` and companion current `nc` at `v`.
    pub fn linearize(&self, v: f64) -> (f64, f64) {
        if self.is_forward(v) {
            // linear in reverse bias, which aids convergence
            let eval = if v < 0.0 { 1.0 } else { (v * self.vdcoef).exp() };
            let geq = self.vdcoef * self.leakage * eval;
            let nc = (eval - 1.0) * self.leakage - geq * v;
            (geq, nc)
        } else {
            let fwd = (v * self.vdcoef).exp();
            let rev = ((-v - self.zoffset) * self.vdcoef).exp();
            let geq = self.leakage * self.vdcoef * (fwd + rev);
            let nc = self.leakage * (fwd - rev - 1.0) - geq * v;
            (geq, nc)
        }
    }

    /// Junction current at `v`.
    pub fn current(&self, v: f64) -> f64 {
        if self.is_forward(v) {
            self.leakage * ((v * self.vdcoef).exp() - 1.0)
        } else {
            self.leakage
                * ((v * self.vdcoef).exp() - ((-v - self.zoffset) * self.vdcoef).exp() - 1.0)
        }
    }

    /// One Newton iteration for a junction between `anode` and `cathode`.
    ///
    /// `last` holds the previous iterate and is updated in place.
    pub fn step(&self, s: &mut Stamper<'_>, anode: usize, cathode: usize, last: &mut f64) -> Convergence {
        let v = s.volt(anode) - s.volt(cathode);
        let moved = (v - *last).abs() > VOLTAGE_TOLERANCE;
        let (v, limited) = self.limit_step(v, *last);
        *last = v;
        let (geq, nc) = self.linearize(v);
        let (a, c) = (s.node(anode), s.node(cathode));
        s.stamp_conductance(a, c, geq);
        s.stamp_current_source(a, c, nc);
        Convergence::when(!moved && !limited)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiodeKind {
    #[default]
    Diode,
    Led,
    Zener,
}

/// A diode element. Post 0 is the anode, post 1 the cathode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diode {
    #[serde(default)]
    pub kind: DiodeKind,
    /// Voltage at which the diode carries 1 A.
    pub forward_drop: f64,
    /// Reverse breakdown voltage; 0 disables breakdown.
    #[serde(default)]
    pub zener_voltage: f64,
    #[serde(default)]
    last_voltdiff: f64,
    #[serde(default)]
    current: f64,
}

impl Default for Diode {
    fn default() -> Self {
        Self::new()
    }
}

impl Diode {
    /// Create a silicon diode with the default forward drop.
    pub fn new() -> Self {
        Self {
            kind: DiodeKind::Diode,
            forward_drop: DEFAULT_FORWARD_DROP,
            zener_voltage: 0.0,
            last_voltdiff: 0.0,
            current: 0.0,
        }
    }

    pub fn led() -> Self {
        Self {
            kind: DiodeKind::Led,
            forward_drop: LED_FORWARD_DROP,
            ..Self::new()
        }
    }

    pub fn zener(zener_voltage: f64) -> Self {
        Self {
            kind: DiodeKind::Zener,
            zener_voltage,
            ..Self::new()
        }
    }

    pub fn with_forward_drop(mut self, forward_drop: f64) -> Self {
        self.forward_drop = forward_drop;
        self
    }

    pub fn junction(&self) -> Junction {
        Junction::new(LEAKAGE, self.forward_drop, self.zener_voltage)
    }
}

impl Device for Diode {
    fn name(&self) -> &str {
        match self.kind {
            DiodeKind::Diode => "diode",
            DiodeKind::Led => "led",
            DiodeKind::Zener => "zener",
        }
    }

    fn post_count(&self) -> usize {
        2
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn validate(&self) -> stampede_core::Result<()> {
        positive("forward drop", self.forward_drop)?;
        finite("zener voltage", self.zener_voltage)?;
        if self.zener_voltage < 0.0 {
            return Err(Error::InvalidValue {
                name: "zener voltage".to_string(),
                value: self.zener_voltage,
            }
            .into());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.last_voltdiff = 0.0;
        self.current = 0.0;
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        Ok(self.junction().step(s, 0, 1, &mut self.last_voltdiff))
    }

    fn calculate_current(&mut self, pins: &Pins) {
        self.current = self.junction().current(pins.voltage_diff(0, 1));
    }

    fn current(&self) -> f64 {
        self.current
    }
}
