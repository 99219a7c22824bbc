//! 555 timer.
//!
//! Posts: 0 discharge, 1 trigger, 2 threshold, 3 supply, 4 control,
//! 5 output, then 6 reset when present. The control pin sits on an internal
//! 5k/10k divider from the supply. The comparators are evaluated once per
//! step from the previous step's voltages; the discharge transistor is a
//! 10 ohm path to ground while the output is low.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, NodeId, Pins, StepContext, Stamper};

pub const DISCHARGE: usize = 0;
pub const TRIGGER: usize = 1;
pub const THRESHOLD: usize = 2;
pub const SUPPLY: usize = 3;
pub const CONTROL: usize = 4;
pub const OUTPUT: usize = 5;
pub const RESET: usize = 6;

const DIVIDER_UPPER: f64 = 5000.0;
const DIVIDER_LOWER: f64 = 10000.0;
const DISCHARGE_RESISTANCE: f64 = 10.0;
/// Reset input is active below this voltage.
const RESET_THRESHOLD: f64 = 0.7;
const OUTPUT_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timer555 {
    pub has_reset: bool,
    #[serde(default)]
    state: TimerState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TimerState {
    out: bool,
    set_out: bool,
    last_output: f64,
    current: f64,
    post_currents: [f64; 7],
}

impl Default for Timer555 {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer555 {
    pub fn new() -> Self {
        Self {
            has_reset: false,
            state: TimerState::default(),
        }
    }

    pub fn with_reset_pin(mut self) -> Self {
        self.has_reset = true;
        self
    }

    /// Output state chosen for the present step.
    pub fn output_high(&self) -> bool {
        self.state.out
    }

    fn discharging(&self) -> bool {
        !self.state.out && !self.state.set_out
    }
}

impl Device for Timer555 {
    fn name(&self) -> &str {
        "555 timer"
    }

    fn post_count(&self) -> usize {
        if self.has_reset {
            7
        } else {
            6
        }
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.state = TimerState::default();
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        s.stamp_resistor(s.node(SUPPLY), s.node(CONTROL), DIVIDER_UPPER);
        s.stamp_resistor(s.node(CONTROL), NodeId::GROUND, DIVIDER_LOWER);
        s.stamp_voltage_source(NodeId::GROUND, s.node(OUTPUT), 0, 0.0);
    }

    fn start_iteration(&mut self, pins: &Pins, _ctx: &StepContext) {
        let st = &mut self.state;
        st.out = pins.volt(OUTPUT) > pins.volt(SUPPLY) / 2.0;
        st.set_out = false;
        if pins.volt(CONTROL) / 2.0 > pins.volt(TRIGGER) {
            st.set_out = true;
            st.out = true;
        }
        if pins.volt(THRESHOLD) > pins.volt(CONTROL)
            || (self.has_reset && pins.volt(RESET) < RESET_THRESHOLD)
        {
            st.out = false;
        }
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        if self.discharging() {
            s.stamp_resistor(s.node(DISCHARGE), NodeId::GROUND, DISCHARGE_RESISTANCE);
        }
        let target = if self.state.out { s.volt(SUPPLY) } else { 0.0 };
        s.update_voltage_source(0, target);
        let settled = (target - self.state.last_output).abs() < OUTPUT_TOLERANCE;
        self.state.last_output = target;
        Ok(Convergence::when(settled))
    }

    fn set_source_current(&mut self, _local: usize, current: f64) {
        self.state.current = current;
    }

    fn calculate_current(&mut self, pins: &Pins) {
        let upper = pins.voltage_diff(SUPPLY, CONTROL) / DIVIDER_UPPER;
        let lower = pins.volt(CONTROL) / DIVIDER_LOWER;
        let discharge = if self.discharging() {
            pins.volt(DISCHARGE) / DISCHARGE_RESISTANCE
        } else {
            0.0
        };
        let c = &mut self.state.post_currents;
        *c = [0.0; 7];
        c[DISCHARGE] = -discharge;
        c[SUPPLY] = -upper;
        c[CONTROL] = upper - lower;
        c[OUTPUT] = self.state.current;
    }

    fn current(&self) -> f64 {
        self.state.current
    }

    fn post_current(&self, post: usize) -> f64 {
        self.state.post_currents.get(post).copied().unwrap_or(0.0)
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        pins.volt(OUTPUT)
    }

    fn connection(&self, a: usize, b: usize) -> bool {
        matches!((a.min(b), a.max(b)), (SUPPLY, CONTROL))
    }

    fn has_ground_connection(&self, post: usize) -> bool {
        matches!(post, OUTPUT | CONTROL | DISCHARGE)
    }
}
