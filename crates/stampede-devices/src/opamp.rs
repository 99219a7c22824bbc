//! Operational amplifier.
//!
//! Posts: 0 inverting input, 1 non-inverting input, 2 output. The output is
//! driven by one voltage-source unknown whose row holds the gain equation
//! `dx * (v- - v+) + v_out = x`. Away from the rails `dx` is the open-loop
//! gain and `x` is 0. Near a rail the row switches to a small `dx` and
//! clamps the output at the rail.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, Pins, StepContext, Stamper, Unknown};

use crate::error::{positive, Error};
use crate::rng;

const INVERTING: usize = 0;
const NON_INVERTING: usize = 1;
const OUTPUT: usize = 2;

/// Gain-row coefficient while clamped at a rail.
const RAIL_DX: f64 = 1e-4;
/// Input move that still counts as settled (V).
const INPUT_TOLERANCE: f64 = 0.1;
/// Output overshoot past a rail that still counts as settled (V).
const RAIL_TOLERANCE: f64 = 0.1;
const RAIL_ESCAPE_SEED: u64 = 0x6f70_616d;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpAmp {
    /// Open-loop gain.
    pub gain: f64,
    /// Most positive output voltage (V).
    pub max_out: f64,
    /// Most negative output voltage (V).
    pub min_out: f64,
    #[serde(default)]
    last_vd: f64,
    #[serde(default)]
    current: f64,
}

impl Default for OpAmp {
    fn default() -> Self {
        Self::new()
    }
}

impl OpAmp {
    pub fn new() -> Self {
        Self {
            gain: 1000.0,
            max_out: 15.0,
            min_out: -15.0,
            last_vd: 0.0,
            current: 0.0,
        }
    }

    pub fn with_rails(mut self, min_out: f64, max_out: f64) -> Self {
        self.min_out = min_out;
        self.max_out = max_out;
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Occasionally let the output leave a rail even when the previous
    /// differential input pointed at it, so a circuit cannot lock up on a
    /// wrong rail. Drawn from (step, iteration), so runs are reproducible.
    fn escape_rail(ctx: &StepContext) -> bool {
        rng::one_in(4, RAIL_ESCAPE_SEED, ctx.step, ctx.iteration as u64)
    }
}

impl Device for OpAmp {
    fn name(&self) -> &str {
        "op-amp"
    }

    fn post_count(&self) -> usize {
        3
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn validate(&self) -> stampede_core::Result<()> {
        positive("gain", self.gain)?;
        if !(self.min_out.is_finite() && self.max_out.is_finite() && self.min_out < self.max_out) {
            return Err(Error::InvalidParameter(format!(
                "op-amp rails must satisfy min < max, got {} and {}",
                self.min_out, self.max_out
            ))
            .into());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.last_vd = 0.0;
        self.current = 0.0;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        let vn = Unknown::Source(s.source(0));
        s.stamp_matrix(Unknown::Node(s.node(OUTPUT)), vn, 1.0);
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        let vd = s.volt(NON_INVERTING) - s.volt(INVERTING);
        let vout = s.volt(OUTPUT);
        let settled = (self.last_vd - vd).abs() <= INPUT_TOLERANCE
            && vout <= self.max_out + RAIL_TOLERANCE
            && vout >= self.min_out - RAIL_TOLERANCE;

        let (dx, x) = if vd >= self.max_out / self.gain
            && (self.last_vd >= 0.0 || Self::escape_rail(ctx))
        {
            (RAIL_DX, self.max_out - RAIL_DX * self.max_out / self.gain)
        } else if vd <= self.min_out / self.gain
            && (self.last_vd <= 0.0 || Self::escape_rail(ctx))
        {
            (RAIL_DX, self.min_out - RAIL_DX * self.min_out / self.gain)
        } else {
            (self.gain, 0.0)
        };

        let vn = Unknown::Source(s.source(0));
        s.stamp_matrix(vn, Unknown::Node(s.node(INVERTING)), dx);
        s.stamp_matrix(vn, Unknown::Node(s.node(NON_INVERTING)), -dx);
        s.stamp_matrix(vn, Unknown::Node(s.node(OUTPUT)), 1.0);
        s.stamp_right_side(vn, x);

        self.last_vd = vd;
        Ok(Convergence::when(settled))
    }

    fn set_source_current(&mut self, _local: usize, current: f64) {
        self.current = current;
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn post_current(&self, post: usize) -> f64 {
        if post == OUTPUT {
            -self.current
        } else {
            0.0
        }
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        pins.volt(OUTPUT)
    }

    fn power(&self, pins: &Pins) -> f64 {
        pins.volt(OUTPUT) * self.current
    }

    fn connection(&self, _a: usize, _b: usize) -> bool {
        false
    }

    fn has_ground_connection(&self, post: usize) -> bool {
        post == OUTPUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{IntegrationMethod, MnaSystem, NodeId, VsIndex};

    fn stamp_at(op: &mut OpAmp, vminus: f64, vplus: f64, vout: f64) -> MnaSystem {
        let mut pins = Pins::new(vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)], 0, 1);
        pins.set_volt(INVERTING, vminus);
        pins.set_volt(NON_INVERTING, vplus);
        pins.set_volt(OUTPUT, vout);
        let mut mna = MnaSystem::new(3, 1);
        let ctx = StepContext::new(1e-6, IntegrationMethod::Trapezoidal);
        op.do_step(&mut Stamper::new(&mut mna, &pins), &ctx).unwrap();
        mna
    }

    #[test]
    fn test_linear_gain_row() {
        let mut op = OpAmp::new();
        let mna = stamp_at(&mut op, 0.0, 0.001, 1.0);
        let row = mna.row(Unknown::Source(VsIndex(0))).unwrap();
        assert_eq!(mna.matrix()[(row, 0)], 1000.0);
        assert_eq!(mna.matrix()[(row, 1)], -1000.0);
        assert_eq!(mna.matrix()[(row, 2)], 1.0);
        assert_eq!(mna.rhs()[row], 0.0);
    }

    #[test]
    fn test_clamps_at_positive_rail() {
        let mut op = OpAmp::new();
        let mna = stamp_at(&mut op, 0.0, 1.0, 15.0);
        let row = mna.row(Unknown::Source(VsIndex(0))).unwrap();
        assert_eq!(mna.matrix()[(row, 0)], RAIL_DX);
        let x = 15.0 - RAIL_DX * 15.0 / 1000.0;
        assert!((mna.rhs()[row] - x).abs() < 1e-12);
    }

    #[test]
    fn test_overshoot_not_converged() {
        let mut op = OpAmp::new();
        let mut pins = Pins::new(vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)], 0, 1);
        pins.set_volt(OUTPUT, 16.0);
        let mut mna = MnaSystem::new(3, 1);
        let ctx = StepContext::new(1e-6, IntegrationMethod::Trapezoidal);
        let verdict = op.do_step(&mut Stamper::new(&mut mna, &pins), &ctx).unwrap();
        assert_eq!(verdict, Convergence::NotConverged);
    }

    #[test]
    fn test_rail_escape_is_deterministic() {
        let ctx = StepContext {
            step: 12,
            iteration: 3,
            ..StepContext::new(1e-6, IntegrationMethod::Trapezoidal)
        };
        assert_eq!(OpAmp::escape_rail(&ctx), OpAmp::escape_rail(&ctx));
    }

    #[test]
    fn test_rails_validated() {
        assert!(OpAmp::new().with_rails(5.0, -5.0).validate().is_err());
        assert!(OpAmp::new().with_gain(0.0).validate().is_err());
        assert!(OpAmp::new().validate().is_ok());
    }
}
