//! Transformer (coupled inductor pair).
//!
//! Posts: 0 primary top, 1 secondary top, 2 primary bottom, 3 secondary
//! bottom.
//!
//! The winding equations
//!
//! ```text
//! v1 = L1 di1/dt + M  di2/dt
//! v2 = M  di1/dt + L2 di2/dt
//! ```
//!
//! are inverted to `di1/dt = a1 v1 + a2 v2`, `di2/dt = a3 v1 + a4 v2` and
//! integrated over one step, which gives two conductances, two
//! cross-coupling transconductances and two companion current sources.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, Pins, StepContext, Stamper};

use crate::error::{positive, Error};

const PRI_TOP: usize = 0;
const SEC_TOP: usize = 1;
const PRI_BOTTOM: usize = 2;
const SEC_BOTTOM: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
    /// Primary inductance (H).
    pub inductance: f64,
    /// Secondary to primary turns ratio.
    pub ratio: f64,
    /// Coupling coefficient `k`, in [0, 1).
    pub coupling: f64,
    #[serde(default)]
    state: TransformerState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TransformerState {
    coefficients: [f64; 4],
    currents: [f64; 2],
    cur_sources: [f64; 2],
    voltdiffs: [f64; 2],
}

impl Transformer {
    pub fn new(inductance: f64, ratio: f64, coupling: f64) -> Self {
        Self {
            inductance,
            ratio,
            coupling,
            state: TransformerState::default(),
        }
    }

    /// Secondary inductance (H).
    pub fn secondary_inductance(&self) -> f64 {
        self.inductance * self.ratio * self.ratio
    }

    /// `[a1, a2, a3, a4]` for the given step.
    fn coefficients(&self, ctx: &StepContext) -> [f64; 4] {
        let l1 = self.inductance;
        let l2 = self.secondary_inductance();
        let m = self.coupling * (l1 * l2).sqrt();
        let deti = 1.0 / (l1 * l2 - m * m);
        let ts = if ctx.is_trapezoidal() {
            ctx.dt / 2.0
        } else {
            ctx.dt
        };
        [l2 * deti * ts, -m * deti * ts, -m * deti * ts, l1 * deti * ts]
    }

    /// Primary and secondary winding currents.
    pub fn currents(&self) -> [f64; 2] {
        self.state.currents
    }
}

impl Device for Transformer {
    fn name(&self) -> &str {
        "transformer"
    }

    fn post_count(&self) -> usize {
        4
    }

    fn validate(&self) -> stampede_core::Result<()> {
        positive("inductance", self.inductance)?;
        positive("ratio", self.ratio)?;
        if !(0.0..1.0).contains(&self.coupling) {
            return Err(Error::InvalidValue {
                name: "coupling coefficient".to_string(),
                value: self.coupling,
            }
            .into());
        }
        Ok(())
    }

    fn reset(&mut self) {
        let coefficients = self.state.coefficients;
        self.state = TransformerState {
            coefficients,
            ..TransformerState::default()
        };
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, ctx: &StepContext) {
        let [a1, a2, a3, a4] = self.coefficients(ctx);
        self.state.coefficients = [a1, a2, a3, a4];
        let (p0, p1) = (s.node(PRI_TOP), s.node(PRI_BOTTOM));
        let (s0, s1) = (s.node(SEC_TOP), s.node(SEC_BOTTOM));
        s.stamp_conductance(p0, p1, a1);
        s.stamp_vccs(p0, p1, s0, s1, a2);
        s.stamp_vccs(s0, s1, p0, p1, a3);
        s.stamp_conductance(s0, s1, a4);
    }

    fn start_iteration(&mut self, _pins: &Pins, ctx: &StepContext) {
        let [a1, a2, a3, a4] = self.state.coefficients;
        let [vd1, vd2] = self.state.voltdiffs;
        let [i1, i2] = self.state.currents;
        self.state.cur_sources = if ctx.is_trapezoidal() {
            [vd1 * a1 + vd2 * a2 + i1, vd1 * a3 + vd2 * a4 + i2]
        } else {
            [i1, i2]
        };
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        let [cs1, cs2] = self.state.cur_sources;
        s.stamp_current_source(s.node(PRI_TOP), s.node(PRI_BOTTOM), cs1);
        s.stamp_current_source(s.node(SEC_TOP), s.node(SEC_BOTTOM), cs2);
        Ok(Convergence::Converged)
    }

    fn calculate_current(&mut self, pins: &Pins) {
        let [a1, a2, a3, a4] = self.state.coefficients;
        let vd1 = pins.voltage_diff(PRI_TOP, PRI_BOTTOM);
        let vd2 = pins.voltage_diff(SEC_TOP, SEC_BOTTOM);
        let [cs1, cs2] = self.state.cur_sources;
        self.state.voltdiffs = [vd1, vd2];
        self.state.currents = [vd1 * a1 + vd2 * a2 + cs1, vd1 * a3 + vd2 * a4 + cs2];
    }

    fn current(&self) -> f64 {
        self.state.currents[0]
    }

    fn post_current(&self, post: usize) -> f64 {
        let [i1, i2] = self.state.currents;
        match post {
            PRI_TOP => -i1,
            PRI_BOTTOM => i1,
            SEC_TOP => -i2,
            SEC_BOTTOM => i2,
            _ => 0.0,
        }
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        pins.voltage_diff(PRI_TOP, PRI_BOTTOM)
    }

    fn power(&self, pins: &Pins) -> f64 {
        let [i1, i2] = self.state.currents;
        pins.voltage_diff(PRI_TOP, PRI_BOTTOM) * i1 + pins.voltage_diff(SEC_TOP, SEC_BOTTOM) * i2
    }

    fn connection(&self, a: usize, b: usize) -> bool {
        matches!(
            (a.min(b), a.max(b)),
            (PRI_TOP, PRI_BOTTOM) | (SEC_TOP, SEC_BOTTOM)
        )
    }
}
