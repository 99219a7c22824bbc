//! Voltage-controlled oscillator in the style of the CD4046 VCO section.
//!
//! Posts: 0 control input, 1 output, 2 and 3 the timing capacitor, 4 R1,
//! 5 R2. The control voltage is copied onto R1 and a fixed 5 V onto R2, so
//! the currents through the external resistors set the charging current.
//! That current is steered through the capacitor in one direction or the
//! other, and the output flips when the capacitor voltage crosses 4.5 V or
//! 0.5 V.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, NodeId, Pins, StepContext, Stamper, Unknown};

use crate::logic;

pub const CONTROL: usize = 0;
pub const OUTPUT: usize = 1;
pub const CAP_A: usize = 2;
pub const CAP_B: usize = 3;
pub const R1: usize = 4;
pub const R2: usize = 5;

/// Resistor across the capacitor pins so they never float.
const CAP_BYPASS: f64 = 1e6;
const SWITCH_HIGH: f64 = 4.5;
const SWITCH_LOW: f64 = 0.5;
const R2_REFERENCE: f64 = 5.0;

const OUTPUT_SOURCE: usize = 0;
const R1_SOURCE: usize = 1;
const R2_SOURCE: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vco {
    #[serde(default)]
    output_high: bool,
    #[serde(default)]
    currents: [f64; 3],
}

impl Vco {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_high(&self) -> bool {
        self.output_high
    }
}

impl Device for Vco {
    fn name(&self) -> &str {
        "vco"
    }

    fn post_count(&self) -> usize {
        6
    }

    fn voltage_source_count(&self) -> usize {
        3
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        s.stamp_voltage_source(NodeId::GROUND, s.node(OUTPUT), OUTPUT_SOURCE, 0.0);
        s.stamp_voltage_source(s.node(CONTROL), s.node(R1), R1_SOURCE, 0.0);
        s.stamp_voltage_source(NodeId::GROUND, s.node(R2), R2_SOURCE, R2_REFERENCE);
        s.stamp_resistor(s.node(CAP_A), s.node(CAP_B), CAP_BYPASS);
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        let vc = s.volt(CAP_B) - s.volt(CAP_A);
        let mut high = s.volt(OUTPUT) > logic::THRESHOLD;
        if !high && vc > SWITCH_HIGH {
            high = true;
        } else if high && vc < SWITCH_LOW {
            high = false;
        }
        let dir = if high { -1.0 } else { 1.0 };
        s.update_voltage_source(OUTPUT_SOURCE, logic::level(high));

        let a = Unknown::Node(s.node(CAP_A));
        let b = Unknown::Node(s.node(CAP_B));
        for j in [R1_SOURCE, R2_SOURCE] {
            let cur = Unknown::Source(s.source(j));
            s.stamp_matrix(a, cur, dir);
            s.stamp_matrix(b, cur, -dir);
        }

        let changed = high != self.output_high;
        self.output_high = high;
        Ok(Convergence::when(!changed))
    }

    fn set_source_current(&mut self, local: usize, current: f64) {
        if let Some(c) = self.currents.get_mut(local) {
            *c = current;
        }
    }

    fn current(&self) -> f64 {
        self.currents[OUTPUT_SOURCE]
    }

    fn post_current(&self, post: usize) -> f64 {
        match post {
            OUTPUT => self.currents[OUTPUT_SOURCE],
            R2 => self.currents[R2_SOURCE],
            R1 => self.currents[R1_SOURCE],
            CONTROL => -self.currents[R1_SOURCE],
            _ => 0.0,
        }
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        pins.volt(OUTPUT)
    }

    fn connection(&self, a: usize, b: usize) -> bool {
        matches!((a.min(b), a.max(b)), (CONTROL, R1) | (CAP_A, CAP_B))
    }

    fn has_ground_connection(&self, post: usize) -> bool {
        matches!(post, OUTPUT | R2)
    }
}
