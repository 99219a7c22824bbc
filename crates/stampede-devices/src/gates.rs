//! Logic gates and logic-level inputs and outputs.
//!
//! A gate's posts are its inputs followed by the output. The output is an
//! ideal voltage source from ground, so inputs draw no current and have no
//! conductive path through the gate.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, NodeId, Pins, StepContext, Stamper};

use crate::error::{Error, Result};
use crate::logic;

/// Allowed input counts for multi-input gates.
pub const MIN_INPUTS: usize = 2;
pub const MAX_INPUTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum GateKind {
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Inverter,
}

impl GateKind {
    /// Parse a gate name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "and" => Some(GateKind::And),
            "nand" => Some(GateKind::Nand),
            "or" => Some(GateKind::Or),
            "nor" => Some(GateKind::Nor),
            "xor" => Some(GateKind::Xor),
            "not" | "inverter" => Some(GateKind::Inverter),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GateKind::And => "and gate",
            GateKind::Nand => "nand gate",
            GateKind::Or => "or gate",
            GateKind::Nor => "nor gate",
            GateKind::Xor => "xor gate",
            GateKind::Inverter => "inverter",
        }
    }

    /// Evaluate the boolean function.
    pub fn eval(self, inputs: &[bool]) -> bool {
        match self {
            GateKind::And => inputs.iter().all(|b| *b),
            GateKind::Nand => !inputs.iter().all(|b| *b),
            GateKind::Or => inputs.iter().any(|b| *b),
            GateKind::Nor => !inputs.iter().any(|b| *b),
            GateKind::Xor => inputs.iter().filter(|b| **b).count() % 2 == 1,
            GateKind::Inverter => !inputs.first().copied().unwrap_or(false),
        }
    }

    fn accepts(self, inputs: usize) -> bool {
        match self {
            GateKind::Inverter => inputs == 1,
            _ => (MIN_INPUTS..=MAX_INPUTS).contains(&inputs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub kind: GateKind,
    inputs: usize,
    #[serde(default)]
    last_output: bool,
    #[serde(default)]
    current: f64,
}

impl Gate {
    pub fn new(kind: GateKind, inputs: usize) -> Result<Self> {
        if !kind.accepts(inputs) {
            return Err(Error::InvalidParameter(format!(
                "{} cannot have {} inputs",
                kind.name(),
                inputs
            )));
        }
        Ok(Self {
            kind,
            inputs,
            last_output: false,
            current: 0.0,
        })
    }

    pub fn inverter() -> Self {
        Self {
            kind: GateKind::Inverter,
            inputs: 1,
            last_output: false,
            current: 0.0,
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs
    }

    /// Change the number of inputs. The circuit must be re-analyzed.
    pub fn set_input_count(&mut self, inputs: usize) -> Result<()> {
        if !self.kind.accepts(inputs) {
            return Err(Error::InvalidParameter(format!(
                "{} cannot have {} inputs",
                self.kind.name(),
                inputs
            )));
        }
        self.inputs = inputs;
        Ok(())
    }

    /// Output level driven at the last iteration.
    pub fn output(&self) -> bool {
        self.last_output
    }
}

impl Device for Gate {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn post_count(&self) -> usize {
        self.inputs + 1
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn validate(&self) -> stampede_core::Result<()> {
        if !self.kind.accepts(self.inputs) {
            return Err(Error::InvalidParameter(format!(
                "{} cannot have {} inputs",
                self.kind.name(),
                self.inputs
            ))
            .into());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.last_output = false;
        self.current = 0.0;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        s.stamp_voltage_source(NodeId::GROUND, s.node(self.inputs), 0, 0.0);
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        ctx: &StepContext,
    ) -> std::result::Result<Convergence, DeviceFault> {
        let mut levels = [false; MAX_INPUTS];
        for (i, level) in levels.iter_mut().enumerate().take(self.inputs) {
            *level = logic::is_high(s.volt(i));
        }
        let out = self.kind.eval(&levels[..self.inputs]);
        let changed = out != self.last_output;
        self.last_output = out;
        s.update_voltage_source(0, logic::level(out));
        Ok(logic::settle(changed, ctx))
    }

    fn set_source_current(&mut self, _local: usize, current: f64) {
        self.current = current;
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn post_current(&self, post: usize) -> f64 {
        if post == self.inputs {
            self.current
        } else {
            0.0
        }
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        pins.volt(self.inputs)
    }

    fn connection(&self, _a: usize, _b: usize) -> bool {
        false
    }

    fn has_ground_connection(&self, post: usize) -> bool {
        post == self.inputs
    }
}

/// A switchable logic source: 0 V or 5 V from ground onto its single post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicInput {
    pub high: bool,
    #[serde(default)]
    current: f64,
}

impl LogicInput {
    pub fn new(high: bool) -> Self {
        Self {
            high,
            current: 0.0,
        }
    }
}

impl Device for LogicInput {
    fn name(&self) -> &str {
        "logic input"
    }

    fn post_count(&self) -> usize {
        1
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn reset(&mut self) {
        self.current = 0.0;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        s.stamp_voltage_source(NodeId::GROUND, s.node(0), 0, logic::level(self.high));
    }

    fn set_source_current(&mut self, _local: usize, current: f64) {
        self.current = current;
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn post_current(&self, _post: usize) -> f64 {
        self.current
    }

    fn has_ground_connection(&self, _post: usize) -> bool {
        true
    }

    fn toggle(&mut self) -> bool {
        self.high = !self.high;
        true
    }
}

/// High-impedance logic probe on a single post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicOutput {
    #[serde(default)]
    high: bool,
}

impl LogicOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logic level read at the last committed step.
    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl Device for LogicOutput {
    fn name(&self) -> &str {
        "logic output"
    }

    fn post_count(&self) -> usize {
        1
    }

    fn reset(&mut self) {
        self.high = false;
    }

    fn calculate_current(&mut self, pins: &Pins) {
        self.high = logic::is_high(pins.volt(0));
    }

    fn power(&self, _pins: &Pins) -> f64 {
        0.0
    }
}
