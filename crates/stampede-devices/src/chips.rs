//! Digital chips: flip-flops, counters and adders.
//!
//! Every chip is a row of pins, each either an input (thresholded at 2.5 V)
//! or an output (an ideal 0 V / 5 V source from ground). Each iteration the
//! inputs are read, the chip's logic runs and the output sources are
//! updated. Clocked chips act only on a rising clock edge.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, NodeId, Pins, StepContext, Stamper};

use crate::error::{Error, Result};
use crate::logic::{self, EdgeDetector};

pub const MAX_COUNTER_BITS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "chip", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ChipKind {
    /// Pins: D, Q, Q', CLK, then R and S when present.
    DFlipFlop { has_reset: bool, has_set: bool },
    /// Pins: J, Q, CLK, K, Q', then R when present.
    JkFlipFlop { has_reset: bool },
    /// Pins: T, Q, Q', CLK, then R when present.
    TFlipFlop { has_reset: bool },
    /// Binary counter. Pins: CLK, R, then outputs most significant first.
    Counter { bits: usize },
    /// Ring counter with one output high at a time. Pins: CLK, R, Q0..
    DecadeCounter { bits: usize },
    /// Pins: A, B, S, C.
    HalfAdder,
    /// Pins: A, B, Cin, S, Cout.
    FullAdder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSpec {
    pub name: &'static str,
    pub output: bool,
}

const fn input(name: &'static str) -> PinSpec {
    PinSpec {
        name,
        output: false,
    }
}

const fn output(name: &'static str) -> PinSpec {
    PinSpec { name, output: true }
}

const BIT_NAMES: [&str; MAX_COUNTER_BITS] = [
    "Q0", "Q1", "Q2", "Q3", "Q4", "Q5", "Q6", "Q7", "Q8", "Q9", "Q10", "Q11", "Q12", "Q13",
    "Q14", "Q15",
];

impl ChipKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChipKind::DFlipFlop { .. } => "d flip-flop",
            ChipKind::JkFlipFlop { .. } => "jk flip-flop",
            ChipKind::TFlipFlop { .. } => "t flip-flop",
            ChipKind::Counter { .. } => "counter",
            ChipKind::DecadeCounter { .. } => "decade counter",
            ChipKind::HalfAdder => "half adder",
            ChipKind::FullAdder => "full adder",
        }
    }

    /// Pin table in post order.
    pub fn pins(&self) -> Vec<PinSpec> {
        match *self {
            ChipKind::DFlipFlop { has_reset, has_set } => {
                let mut pins = vec![input("D"), output("Q"), output("Q'"), input("CLK")];
                if has_reset {
                    pins.push(input("R"));
                }
                if has_set {
                    pins.push(input("S"));
                }
                pins
            }
            ChipKind::JkFlipFlop { has_reset } => {
                let mut pins = vec![
                    input("J"),
                    output("Q"),
                    input("CLK"),
                    input("K"),
                    output("Q'"),
                ];
                if has_reset {
                    pins.push(input("R"));
                }
                pins
            }
            ChipKind::TFlipFlop { has_reset } => {
                let mut pins = vec![input("T"), output("Q"), output("Q'"), input("CLK")];
                if has_reset {
                    pins.push(input("R"));
                }
                pins
            }
            ChipKind::Counter { bits } => {
                let mut pins = vec![input("CLK"), input("R")];
                pins.extend((0..bits).rev().map(|b| output(BIT_NAMES[b])));
                pins
            }
            ChipKind::DecadeCounter { bits } => {
                let mut pins = vec![input("CLK"), input("R")];
                pins.extend((0..bits).map(|b| output(BIT_NAMES[b])));
                pins
            }
            ChipKind::HalfAdder => vec![input("A"), input("B"), output("S"), output("C")],
            ChipKind::FullAdder => vec![
                input("A"),
                input("B"),
                input("Cin"),
                output("S"),
                output("Cout"),
            ],
        }
    }

    fn check(&self) -> Result<()> {
        match *self {
            ChipKind::Counter { bits } if !(1..=MAX_COUNTER_BITS).contains(&bits) => Err(
                Error::InvalidParameter(format!("counter cannot have {bits} bits")),
            ),
            ChipKind::DecadeCounter { bits } if !(2..=MAX_COUNTER_BITS).contains(&bits) => Err(
                Error::InvalidParameter(format!("decade counter cannot have {bits} outputs")),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chip {
    pub kind: ChipKind,
    #[serde(default)]
    state: ChipState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ChipState {
    values: Vec<bool>,
    edge: EdgeDetector,
    count: u64,
    currents: Vec<f64>,
}

impl Chip {
    pub fn new(kind: ChipKind) -> Result<Self> {
        kind.check()?;
        let mut chip = Self {
            kind,
            state: ChipState::default(),
        };
        chip.reset();
        Ok(chip)
    }

    pub fn d_flip_flop() -> Self {
        Self::from_valid(ChipKind::DFlipFlop {
            has_reset: false,
            has_set: false,
        })
    }

    pub fn jk_flip_flop() -> Self {
        Self::from_valid(ChipKind::JkFlipFlop { has_reset: false })
    }

    pub fn t_flip_flop() -> Self {
        Self::from_valid(ChipKind::TFlipFlop { has_reset: false })
    }

    pub fn half_adder() -> Self {
        Self::from_valid(ChipKind::HalfAdder)
    }

    pub fn full_adder() -> Self {
        Self::from_valid(ChipKind::FullAdder)
    }

    pub fn counter(bits: usize) -> Result<Self> {
        Self::new(ChipKind::Counter { bits })
    }

    pub fn decade_counter(bits: usize) -> Result<Self> {
        Self::new(ChipKind::DecadeCounter { bits })
    }

    fn from_valid(kind: ChipKind) -> Self {
        let mut chip = Self {
            kind,
            state: ChipState::default(),
        };
        chip.reset();
        chip
    }

    /// Add or remove the reset pin of a flip-flop. Changes the post count,
    /// so the circuit must be re-analyzed.
    pub fn set_reset_pin(&mut self, present: bool) {
        match &mut self.kind {
            ChipKind::DFlipFlop { has_reset, .. }
            | ChipKind::JkFlipFlop { has_reset }
            | ChipKind::TFlipFlop { has_reset } => *has_reset = present,
            _ => return,
        }
        self.reset();
    }

    /// Level of pin `post` as last read or driven.
    pub fn pin_value(&self, post: usize) -> bool {
        self.state.values.get(post).copied().unwrap_or(false)
    }

    /// Value held by a binary or decade counter.
    pub fn count(&self) -> u64 {
        self.state.count
    }

    fn outputs(&self) -> Vec<usize> {
        self.kind
            .pins()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.output)
            .map(|(i, _)| i)
            .collect()
    }

    fn set_flip_flop(&mut self, q: usize, qbar: usize, high: bool) {
        self.state.values[q] = high;
        self.state.values[qbar] = !high;
    }

    /// Run the chip's logic on the input levels in `values`.
    fn execute(&mut self) {
        let v = |i: usize, s: &ChipState| s.values.get(i).copied().unwrap_or(false);
        match self.kind {
            ChipKind::DFlipFlop { has_reset, has_set } => {
                if self.state.edge.rising(v(3, &self.state)) {
                    let d = v(0, &self.state);
                    self.set_flip_flop(1, 2, d);
                }
                if has_reset && v(4, &self.state) {
                    self.set_flip_flop(1, 2, false);
                }
                let set_pin = if has_reset { 5 } else { 4 };
                if has_set && v(set_pin, &self.state) {
                    self.set_flip_flop(1, 2, true);
                }
            }
            ChipKind::JkFlipFlop { has_reset } => {
                if self.state.edge.rising(v(2, &self.state)) {
                    let q = v(1, &self.state);
                    let next = match (v(0, &self.state), v(3, &self.state)) {
                        (true, true) => !q,
                        (true, false) => true,
                        (false, true) => false,
                        (false, false) => q,
                    };
                    self.set_flip_flop(1, 4, next);
                }
                if has_reset && v(5, &self.state) {
                    self.set_flip_flop(1, 4, false);
                }
            }
            ChipKind::TFlipFlop { has_reset } => {
                if self.state.edge.rising(v(3, &self.state)) && v(0, &self.state) {
                    let q = v(1, &self.state);
                    self.set_flip_flop(1, 2, !q);
                }
                if has_reset && v(4, &self.state) {
                    self.set_flip_flop(1, 2, false);
                }
            }
            ChipKind::Counter { bits } => {
                if self.state.edge.rising(v(0, &self.state)) {
                    self.state.count = (self.state.count + 1) & ((1u64 << bits) - 1);
                }
                if v(1, &self.state) {
                    self.state.count = 0;
                }
                for b in 0..bits {
                    self.state.values[2 + bits - 1 - b] = (self.state.count >> b) & 1 == 1;
                }
            }
            ChipKind::DecadeCounter { bits } => {
                if self.state.edge.rising(v(0, &self.state)) {
                    self.state.count = (self.state.count + 1) % bits as u64;
                }
                if v(1, &self.state) {
                    self.state.count = 0;
                }
                for b in 0..bits {
                    self.state.values[2 + b] = self.state.count == b as u64;
                }
            }
            ChipKind::HalfAdder => {
                let (a, b) = (v(0, &self.state), v(1, &self.state));
                self.state.values[2] = a ^ b;
                self.state.values[3] = a && b;
            }
            ChipKind::FullAdder => {
                let (a, b, c) = (v(0, &self.state), v(1, &self.state), v(2, &self.state));
                self.state.values[3] = a ^ b ^ c;
                self.state.values[4] = (a && b) || (c && (a ^ b));
            }
        }
    }
}

impl Device for Chip {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn post_count(&self) -> usize {
        self.kind.pins().len()
    }

    fn voltage_source_count(&self) -> usize {
        self.kind.pins().iter().filter(|p| p.output).count()
    }

    fn validate(&self) -> stampede_core::Result<()> {
        self.kind.check()?;
        Ok(())
    }

    fn reset(&mut self) {
        let pins = self.kind.pins();
        let outputs = pins.iter().filter(|p| p.output).count();
        self.state = ChipState {
            values: vec![false; pins.len()],
            edge: EdgeDetector::default(),
            count: 0,
            currents: vec![0.0; outputs],
        };
        match self.kind {
            ChipKind::DFlipFlop { .. } | ChipKind::TFlipFlop { .. } => {
                self.state.values[2] = true
            }
            ChipKind::JkFlipFlop { .. } => self.state.values[4] = true,
            ChipKind::DecadeCounter { .. } => self.state.values[2] = true,
            _ => {}
        }
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        for (j, post) in self.outputs().into_iter().enumerate() {
            s.stamp_voltage_source(NodeId::GROUND, s.node(post), j, 0.0);
        }
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        ctx: &StepContext,
    ) -> std::result::Result<Convergence, DeviceFault> {
        let pins = self.kind.pins();
        if self.state.values.len() != pins.len() {
            self.reset();
        }
        for (i, pin) in pins.iter().enumerate() {
            if !pin.output {
                self.state.values[i] = logic::is_high(s.volt(i));
            }
        }
        let before = self.state.values.clone();
        self.execute();

        let mut changed = false;
        for (j, (i, _)) in pins.iter().enumerate().filter(|(_, p)| p.output).enumerate() {
            changed |= before[i] != self.state.values[i];
            s.update_voltage_source(j, logic::level(self.state.values[i]));
        }
        Ok(logic::settle(changed, ctx))
    }

    fn set_source_current(&mut self, local: usize, current: f64) {
        if let Some(c) = self.state.currents.get_mut(local) {
            *c = current;
        }
    }

    fn current(&self) -> f64 {
        self.state.currents.first().copied().unwrap_or(0.0)
    }

    fn post_current(&self, post: usize) -> f64 {
        self.outputs()
            .iter()
            .position(|p| *p == post)
            .and_then(|j| self.state.currents.get(j).copied())
            .unwrap_or(0.0)
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        self.outputs()
            .first()
            .map(|p| pins.volt(*p))
            .unwrap_or(0.0)
    }

    fn connection(&self, _a: usize, _b: usize) -> bool {
        false
    }

    fn has_ground_connection(&self, post: usize) -> bool {
        self.kind.pins().get(post).is_some_and(|p| p.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{IntegrationMethod, MnaSystem};

    /// Drive the chip's inputs and run iterations until it settles.
    fn drive(chip: &mut Chip, levels: &[(usize, bool)]) {
        let n = chip.post_count();
        let mut pins = Pins::new(
            (1..=n as u32).map(NodeId::new).collect(),
            0,
            chip.voltage_source_count(),
        );
        for (post, high) in levels {
            pins.set_volt(*post, logic::level(*high));
        }
        let mut mna = MnaSystem::new(n, chip.voltage_source_count());
        for iteration in 0..5 {
            let ctx = StepContext {
                iteration,
                ..StepContext::new(1e-6, IntegrationMethod::Trapezoidal)
            };
            let verdict = chip
                .do_step(&mut Stamper::new(&mut mna, &pins), &ctx)
                .unwrap();
            if verdict.is_converged() {
                break;
            }
        }
    }

    #[test]
    fn test_d_flip_flop_rising_edge_only() {
        let mut ff = Chip::d_flip_flop();
        assert!(!ff.pin_value(1));
        assert!(ff.pin_value(2));

        // D high, clock low: no change
        drive(&mut ff, &[(0, true), (3, false)]);
        assert!(!ff.pin_value(1));
        // rising edge latches D
        drive(&mut ff, &[(0, true), (3, true)]);
        assert!(ff.pin_value(1));
        assert!(!ff.pin_value(2));
        // D drops while clock held high: output holds
        drive(&mut ff, &[(0, false), (3, true)]);
        assert!(ff.pin_value(1));
        // falling edge: output holds
        drive(&mut ff, &[(0, false), (3, false)]);
        assert!(ff.pin_value(1));
        // next rising edge latches the low D
        drive(&mut ff, &[(0, false), (3, true)]);
        assert!(!ff.pin_value(1));
    }

    #[test]
    fn test_d_flip_flop_set_reset() {
        let mut ff = Chip::new(ChipKind::DFlipFlop {
            has_reset: true,
            has_set: true,
        })
        .unwrap();
        assert_eq!(ff.post_count(), 6);
        drive(&mut ff, &[(5, true)]);
        assert!(ff.pin_value(1));
        drive(&mut ff, &[(4, true)]);
        assert!(!ff.pin_value(1));
    }

    #[test]
    fn test_jk_toggle() {
        let mut ff = Chip::jk_flip_flop();
        drive(&mut ff, &[(0, true), (3, true), (2, false)]);
        drive(&mut ff, &[(0, true), (3, true), (2, true)]);
        assert!(ff.pin_value(1));
        drive(&mut ff, &[(0, true), (3, true), (2, false)]);
        drive(&mut ff, &[(0, true), (3, true), (2, true)]);
        assert!(!ff.pin_value(1));
        assert!(ff.pin_value(4));
    }

    #[test]
    fn test_t_flip_flop() {
        let mut ff = Chip::t_flip_flop();
        for expected in [true, false, true] {
            drive(&mut ff, &[(0, true), (3, false)]);
            drive(&mut ff, &[(0, true), (3, true)]);
            assert_eq!(ff.pin_value(1), expected);
        }
    }

    #[test]
    fn test_counter_counts_edges() {
        let mut c = Chip::counter(3).unwrap();
        assert_eq!(c.post_count(), 5);
        for _ in 0..5 {
            drive(&mut c, &[(0, false)]);
            drive(&mut c, &[(0, true)]);
        }
        assert_eq!(c.count(), 5);
        // outputs are most significant first: 101
        assert!(c.pin_value(2));
        assert!(!c.pin_value(3));
        assert!(c.pin_value(4));

        for _ in 0..3 {
            drive(&mut c, &[(0, false)]);
            drive(&mut c, &[(0, true)]);
        }
        assert_eq!(c.count(), 0, "3-bit counter wraps at 8");

        drive(&mut c, &[(0, false)]);
        drive(&mut c, &[(0, true)]);
        drive(&mut c, &[(1, true)]);
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn test_decade_counter_one_hot() {
        let mut c = Chip::decade_counter(4).unwrap();
        assert!(c.pin_value(2));
        drive(&mut c, &[(0, false)]);
        drive(&mut c, &[(0, true)]);
        assert!(!c.pin_value(2));
        assert!(c.pin_value(3));
        assert!(Chip::decade_counter(1).is_err());
    }

    #[test]
    fn test_adders() {
        let mut h = Chip::half_adder();
        drive(&mut h, &[(0, true), (1, true)]);
        assert!(!h.pin_value(2));
        assert!(h.pin_value(3));

        let mut f = Chip::full_adder();
        drive(&mut f, &[(0, true), (1, false), (2, true)]);
        assert!(!f.pin_value(3));
        assert!(f.pin_value(4));
        drive(&mut f, &[(0, true), (1, true), (2, true)]);
        assert!(f.pin_value(3));
        assert!(f.pin_value(4));
    }

    #[test]
    fn test_reset_pin_changes_post_count() {
        let mut ff = Chip::t_flip_flop();
        assert_eq!(ff.post_count(), 4);
        ff.set_reset_pin(true);
        assert_eq!(ff.post_count(), 5);
        assert_eq!(ff.voltage_source_count(), 2);
        assert!(ff.has_ground_connection(1));
        assert!(!ff.has_ground_connection(0));
    }
}
