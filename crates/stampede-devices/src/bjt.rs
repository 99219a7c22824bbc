//! Bipolar junction transistor (Ebers-Moll).
//!
//! Posts: 0 base, 1 collector, 2 emitter.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, Pins, StepContext, Stamper, Unknown};

use crate::error::positive;

const BASE: usize = 0;
const COLLECTOR: usize = 1;
const EMITTER: usize = 2;

/// Saturation current (A).
pub const LEAKAGE: f64 = 1e-13;
/// Thermal voltage (V).
pub const VT: f64 = 0.025;
const VDCOEF: f64 = 1.0 / VT;
/// Largest junction voltage change that still counts as settled.
const VOLTAGE_TOLERANCE: f64 = 0.01;

/// Transistor polarity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    #[default]
    Npn,
    Pnp,
}

impl Polarity {
    /// +1 for NPN, -1 for PNP.
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Npn => 1.0,
            Polarity::Pnp => -1.0,
        }
    }
}

/// Operating region, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Cutoff,
    ForwardActive,
    ReverseActive,
    Saturation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transistor {
    pub polarity: Polarity,
    /// Forward common-base current gain.
    pub forward_gain: f64,
    /// Reverse common-base current gain.
    pub reverse_gain: f64,
    #[serde(default)]
    state: TransistorState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TransistorState {
    last_vbc: f64,
    last_vbe: f64,
    ic: f64,
    ie: f64,
    ib: f64,
}

impl Transistor {
    pub fn new(polarity: Polarity) -> Self {
        Self {
            polarity,
            forward_gain: 0.99,
            reverse_gain: 0.5,
            state: TransistorState::default(),
        }
    }

    pub fn npn() -> Self {
        Self::new(Polarity::Npn)
    }

    pub fn pnp() -> Self {
        Self::new(Polarity::Pnp)
    }

    fn vcrit() -> f64 {
        VT * (VT / (std::f64::consts::SQRT_2 * LEAKAGE)).ln()
    }

    /// SPICE junction limiting, without the diode's 1 uA floor.
    fn limit_step(vnew: f64, vold: f64) -> (f64, bool) {
        let vcrit = Self::vcrit();
        if vnew > vcrit && (vnew - vold).abs() > VT + VT {
            let v = if vold > 0.0 {
                let arg = 1.0 + (vnew - vold) / VT;
                if arg > 0.0 {
                    vold + VT * arg.ln()
                } else {
                    vcrit
                }
            } else {
                VT * (vnew / VT).ln()
            };
            (v, true)
        } else {
            (vnew, false)
        }
    }

    pub fn collector_current(&self) -> f64 {
        self.state.ic
    }

    pub fn base_current(&self) -> f64 {
        self.state.ib
    }

    pub fn emitter_current(&self) -> f64 {
        self.state.ie
    }

    pub fn region(&self, pins: &Pins) -> Region {
        let pnp = self.polarity.sign();
        let vbc = pins.voltage_diff(BASE, COLLECTOR) * pnp;
        let vbe = pins.voltage_diff(BASE, EMITTER) * pnp;
        match (vbc > 0.2, vbe > 0.2) {
            (true, true) => Region::Saturation,
            (true, false) => Region::ReverseActive,
            (false, true) => Region::ForwardActive,
            (false, false) => Region::Cutoff,
        }
    }
}

impl Device for Transistor {
    fn name(&self) -> &str {
        match self.polarity {
            Polarity::Npn => "npn transistor",
            Polarity::Pnp => "pnp transistor",
        }
    }

    fn post_count(&self) -> usize {
        3
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn validate(&self) -> stampede_core::Result<()> {
        positive("forward gain", self.forward_gain)?;
        positive("reverse gain", self.reverse_gain)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.state = TransistorState::default();
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        let pnp = self.polarity.sign();
        let st = &mut self.state;
        let mut vbc = s.volt(BASE) - s.volt(COLLECTOR);
        let mut vbe = s.volt(BASE) - s.volt(EMITTER);
        let moved = (vbc - st.last_vbc).abs() > VOLTAGE_TOLERANCE
            || (vbe - st.last_vbe).abs() > VOLTAGE_TOLERANCE;

        let (lbc, limited_bc) = Self::limit_step(pnp * vbc, pnp * st.last_vbc);
        let (lbe, limited_be) = Self::limit_step(pnp * vbe, pnp * st.last_vbe);
        vbc = pnp * lbc;
        vbe = pnp * lbe;
        st.last_vbc = vbc;
        st.last_vbe = vbe;

        let pcoef = VDCOEF * pnp;
        let expbc = (vbc * pcoef).exp();
        let expbe = (vbe * pcoef).exp().max(1.0);
        let (fgain, rgain) = (self.forward_gain, self.reverse_gain);
        st.ie = pnp * LEAKAGE * (-(expbe - 1.0) + rgain * (expbc - 1.0));
        st.ic = pnp * LEAKAGE * (fgain * (expbe - 1.0) - (expbc - 1.0));
        st.ib = -(st.ie + st.ic);

        let gee = -LEAKAGE * VDCOEF * expbe;
        let gec = rgain * LEAKAGE * VDCOEF * expbc;
        let gce = -gee * fgain;
        let gcc = -gec * (1.0 / rgain);

        let b = Unknown::Node(s.node(BASE));
        let c = Unknown::Node(s.node(COLLECTOR));
        let e = Unknown::Node(s.node(EMITTER));
        s.stamp_matrix(b, b, -gee - gec - gce - gcc);
        s.stamp_matrix(b, c, gec + gcc);
        s.stamp_matrix(b, e, gee + gce);
        s.stamp_matrix(c, b, gce + gcc);
        s.stamp_matrix(c, c, -gcc);
        s.stamp_matrix(c, e, -gce);
        s.stamp_matrix(e, b, gee + gec);
        s.stamp_matrix(e, c, -gec);
        s.stamp_matrix(e, e, -gee);

        s.stamp_right_side(b, -st.ib - (gec + gcc) * vbc - (gee + gce) * vbe);
        s.stamp_right_side(c, -st.ic + gce * vbe + gcc * vbc);
        s.stamp_right_side(e, -st.ie + gee * vbe + gec * vbc);

        Ok(Convergence::when(!moved && !limited_bc && !limited_be))
    }

    fn current(&self) -> f64 {
        self.state.ic
    }

    fn post_current(&self, post: usize) -> f64 {
        match post {
            BASE => -self.state.ib,
            COLLECTOR => -self.state.ic,
            EMITTER => -self.state.ie,
            _ => 0.0,
        }
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        pins.voltage_diff(COLLECTOR, EMITTER)
    }

    fn power(&self, pins: &Pins) -> f64 {
        pins.voltage_diff(BASE, EMITTER) * self.state.ib
            + pins.voltage_diff(COLLECTOR, EMITTER) * self.state.ic
    }
}
