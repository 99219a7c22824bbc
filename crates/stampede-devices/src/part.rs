//! The closed set of circuit parts.
//!
//! [`Part`] is what a circuit stores and serializes. Every variant wraps one
//! device model, and the `Device` impl forwards each call to it.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, PathRole, Pins, StepContext, Stamper};

use crate::bjt::Transistor;
use crate::chips::Chip;
use crate::diode::Diode;
use crate::gates::{Gate, LogicInput, LogicOutput};
use crate::jfet::Jfet;
use crate::mosfet::Mosfet;
use crate::opamp::OpAmp;
use crate::passive::{Capacitor, Inductor, Potentiometer, Resistor, Wire};
use crate::sources::{CurrentSource, Probe, Rail, VoltageSource};
use crate::switches::{AnalogSwitch, Spdt, Switch};
use crate::timer::Timer555;
use crate::transformer::Transformer;
use crate::vco::Vco;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Part {
    Wire(Wire),
    Resistor(Resistor),
    Potentiometer(Potentiometer),
    Capacitor(Capacitor),
    Inductor(Inductor),
    Transformer(Transformer),
    Diode(Diode),
    Transistor(Transistor),
    Mosfet(Mosfet),
    Jfet(Jfet),
    OpAmp(OpAmp),
    Gate(Gate),
    LogicInput(LogicInput),
    LogicOutput(LogicOutput),
    Chip(Chip),
    Timer555(Timer555),
    Vco(Vco),
    Switch(Switch),
    Spdt(Spdt),
    AnalogSwitch(AnalogSwitch),
    VoltageSource(VoltageSource),
    Rail(Rail),
    CurrentSource(CurrentSource),
    Probe(Probe),
}

macro_rules! each_part {
    ($part:expr, $d:ident => $body:expr) => {
        match $part {
            Part::Wire($d) => $body,
            Part::Resistor($d) => $body,
            Part::Potentiometer($d) => $body,
            Part::Capacitor($d) => $body,
            Part::Inductor($d) => $body,
            Part::Transformer($d) => $body,
            Part::Diode($d) => $body,
            Part::Transistor($d) => $body,
            Part::Mosfet($d) => $body,
            Part::Jfet($d) => $body,
            Part::OpAmp($d) => $body,
            Part::Gate($d) => $body,
            Part::LogicInput($d) => $body,
            Part::LogicOutput($d) => $body,
            Part::Chip($d) => $body,
            Part::Timer555($d) => $body,
            Part::Vco($d) => $body,
            Part::Switch($d) => $body,
            Part::Spdt($d) => $body,
            Part::AnalogSwitch($d) => $body,
            Part::VoltageSource($d) => $body,
            Part::Rail($d) => $body,
            Part::CurrentSource($d) => $body,
            Part::Probe($d) => $body,
        }
    };
}

macro_rules! impl_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Part {
                fn from(d: $variant) -> Self {
                    Part::$variant(d)
                }
            }
        )*
    };
}

impl_from!(
    Wire,
    Resistor,
    Potentiometer,
    Capacitor,
    Inductor,
    Transformer,
    Diode,
    Transistor,
    Mosfet,
    Jfet,
    OpAmp,
    Gate,
    LogicInput,
    LogicOutput,
    Chip,
    Timer555,
    Vco,
    Switch,
    Spdt,
    AnalogSwitch,
    VoltageSource,
    Rail,
    CurrentSource,
    Probe,
);

impl Device for Part {
    fn name(&self) -> &str {
        each_part!(self, d => d.name())
    }

    fn post_count(&self) -> usize {
        each_part!(self, d => d.post_count())
    }

    fn internal_node_count(&self) -> usize {
        each_part!(self, d => d.internal_node_count())
    }

    fn voltage_source_count(&self) -> usize {
        each_part!(self, d => d.voltage_source_count())
    }

    fn is_nonlinear(&self) -> bool {
        each_part!(self, d => d.is_nonlinear())
    }

    fn validate(&self) -> stampede_core::Result<()> {
        each_part!(self, d => d.validate())
    }

    fn reset(&mut self) {
        each_part!(self, d => d.reset())
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, ctx: &StepContext) {
        each_part!(self, d => d.stamp(s, ctx))
    }

    fn start_iteration(&mut self, pins: &Pins, ctx: &StepContext) {
        each_part!(self, d => d.start_iteration(pins, ctx))
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        each_part!(self, d => d.do_step(s, ctx))
    }

    fn set_source_current(&mut self, local: usize, current: f64) {
        each_part!(self, d => d.set_source_current(local, current))
    }

    fn calculate_current(&mut self, pins: &Pins) {
        each_part!(self, d => d.calculate_current(pins))
    }

    fn current(&self) -> f64 {
        each_part!(self, d => d.current())
    }

    fn post_current(&self, post: usize) -> f64 {
        each_part!(self, d => d.post_current(post))
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        each_part!(self, d => d.voltage_diff(pins))
    }

    fn power(&self, pins: &Pins) -> f64 {
        each_part!(self, d => d.power(pins))
    }

    fn connection(&self, a: usize, b: usize) -> bool {
        each_part!(self, d => d.connection(a, b))
    }

    fn has_ground_connection(&self, post: usize) -> bool {
        each_part!(self, d => d.has_ground_connection(post))
    }

    fn path_role(&self) -> PathRole {
        each_part!(self, d => d.path_role())
    }

    fn ground_reference_post(&self) -> Option<usize> {
        each_part!(self, d => d.ground_reference_post())
    }

    fn switch_link(&self) -> Option<u32> {
        each_part!(self, d => d.switch_link())
    }

    fn toggle(&mut self) -> bool {
        each_part!(self, d => d.toggle())
    }
}
