//! Mechanical and analog switches.
//!
//! A closed contact is a 0 V source, an open one contributes nothing and
//! reports no connection. Changing a mechanical switch changes the source
//! count, so the circuit re-analyzes after a toggle.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, PathRole, Pins, StepContext, Stamper};

use crate::error::positive;
use crate::logic;

/// Single-pole single-throw switch. Posts: 0 and 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub closed: bool,
    /// Springs back open on reset.
    #[serde(default)]
    pub momentary: bool,
    /// Switches sharing a link id toggle together.
    #[serde(default)]
    pub link: Option<u32>,
    #[serde(default)]
    current: f64,
}

impl Switch {
    pub fn new(closed: bool) -> Self {
        Self {
            closed,
            ..Self::default()
        }
    }

    pub fn momentary() -> Self {
        Self {
            momentary: true,
            ..Self::default()
        }
    }

    pub fn with_link(mut self, link: u32) -> Self {
        self.link = Some(link);
        self
    }
}

impl Device for Switch {
    fn name(&self) -> &str {
        if self.momentary {
            "push switch"
        } else {
            "switch"
        }
    }

    fn post_count(&self) -> usize {
        2
    }

    fn path_role(&self) -> PathRole {
        PathRole::Wire
    }

    fn voltage_source_count(&self) -> usize {
        usize::from(self.closed)
    }

    fn reset(&mut self) {
        self.current = 0.0;
        if self.momentary {
            self.closed = false;
        }
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        if self.closed {
            s.stamp_voltage_source(s.node(0), s.node(1), 0, 0.0);
        }
    }

    fn set_source_current(&mut self, _local: usize, current: f64) {
        self.current = current;
    }

    fn current(&self) -> f64 {
        if self.closed {
            self.current
        } else {
            0.0
        }
    }

    fn power(&self, _pins: &Pins) -> f64 {
        0.0
    }

    fn connection(&self, _a: usize, _b: usize) -> bool {
        self.closed
    }

    fn switch_link(&self) -> Option<u32> {
        self.link
    }

    fn toggle(&mut self) -> bool {
        self.closed = !self.closed;
        if !self.closed {
            self.current = 0.0;
        }
        true
    }
}

/// Single-pole double-throw switch. Posts: 0 common, 1 first throw,
/// 2 second throw. With `center_off` a third position connects neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spdt {
    /// 0 selects post 1, 1 selects post 2, 2 is the centre-off position.
    pub position: usize,
    #[serde(default)]
    pub center_off: bool,
    #[serde(default)]
    pub link: Option<u32>,
    #[serde(default)]
    current: f64,
}

impl Spdt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn center_off() -> Self {
        Self {
            center_off: true,
            ..Self::default()
        }
    }

    pub fn with_link(mut self, link: u32) -> Self {
        self.link = Some(link);
        self
    }

    fn positions(&self) -> usize {
        if self.center_off {
            3
        } else {
            2
        }
    }

    /// Post connected to the common, if any.
    pub fn selected_throw(&self) -> Option<usize> {
        (self.position < 2).then_some(self.position + 1)
    }
}

impl Device for Spdt {
    fn name(&self) -> &str {
        "spdt switch"
    }

    fn post_count(&self) -> usize {
        3
    }

    fn path_role(&self) -> PathRole {
        PathRole::Wire
    }

    fn voltage_source_count(&self) -> usize {
        usize::from(self.selected_throw().is_some())
    }

    fn reset(&mut self) {
        self.current = 0.0;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        if let Some(throw) = self.selected_throw() {
            s.stamp_voltage_source(s.node(0), s.node(throw), 0, 0.0);
        }
    }

    fn set_source_current(&mut self, _local: usize, current: f64) {
        self.current = current;
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn post_current(&self, post: usize) -> f64 {
        match (post, self.selected_throw()) {
            (0, Some(_)) => -self.current,
            (p, Some(throw)) if p == throw => self.current,
            _ => 0.0,
        }
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        match self.selected_throw() {
            Some(throw) => pins.voltage_diff(0, throw),
            None => 0.0,
        }
    }

    fn power(&self, _pins: &Pins) -> f64 {
        0.0
    }

    fn connection(&self, a: usize, b: usize) -> bool {
        match self.selected_throw() {
            Some(throw) => (a.min(b), a.max(b)) == (0, throw),
            None => false,
        }
    }

    fn switch_link(&self) -> Option<u32> {
        self.link
    }

    fn toggle(&mut self) -> bool {
        self.position = (self.position + 1) % self.positions();
        self.current = 0.0;
        true
    }
}

/// Electronically controlled switch. Posts: 0 input, 1 output, 2 control.
/// The control pin draws no current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogSwitch {
    pub r_on: f64,
    pub r_off: f64,
    #[serde(default)]
    open: bool,
    #[serde(default)]
    current: f64,
}

impl Default for AnalogSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalogSwitch {
    pub fn new() -> Self {
        Self {
            r_on: 20.0,
            r_off: 1e10,
            open: true,
            current: 0.0,
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.open
    }

    fn resistance(&self) -> f64 {
        if self.open {
            self.r_off
        } else {
            self.r_on
        }
    }
}

impl Device for AnalogSwitch {
    fn name(&self) -> &str {
        "analog switch"
    }

    fn post_count(&self) -> usize {
        3
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn validate(&self) -> stampede_core::Result<()> {
        positive("r_on", self.r_on)?;
        positive("r_off", self.r_off)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.open = true;
        self.current = 0.0;
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        let open = !logic::is_high(s.volt(2));
        let changed = open != self.open;
        self.open = open;
        s.stamp_resistor(s.node(0), s.node(1), self.resistance());
        Ok(Convergence::when(!changed))
    }

    fn calculate_current(&mut self, pins: &Pins) {
        self.current = pins.voltage_diff(0, 1) / self.resistance();
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn connection(&self, a: usize, b: usize) -> bool {
        a != 2 && b != 2
    }
}
