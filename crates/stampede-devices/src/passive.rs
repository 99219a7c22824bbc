//! Passive device models: Wire, Resistor, Potentiometer, Capacitor, Inductor.
//!
//! Capacitors and inductors are replaced every step by a companion model: a
//! resistor plus a source whose value is derived from the previous step's
//! voltage and current.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, PathRole, Pins, StepContext, Stamper};

use crate::error::{finite, positive, Error};

/// An ideal connection, modelled as a 0 V source so its current is known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    #[serde(default)]
    current: f64,
}

impl Wire {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Device for Wire {
    fn name(&self) -> &str {
        "wire"
    }

    fn post_count(&self) -> usize {
        2
    }

    fn path_role(&self) -> PathRole {
        PathRole::Wire
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn reset(&mut self) {
        self.current = 0.0;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        s.stamp_voltage_source(s.node(0), s.node(1), 0, 0.0);
    }

    fn set_source_current(&mut self, _local: usize, current: f64) {
        self.current = current;
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn power(&self, _pins: &Pins) -> f64 {
        0.0
    }
}

/// A resistor element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resistor {
    /// Resistance value in ohms.
    pub resistance: f64,
    #[serde(default)]
    current: f64,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(resistance: f64) -> Self {
        Self {
            resistance,
            current: 0.0,
        }
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }
}

impl Device for Resistor {
    fn name(&self) -> &str {
        "resistor"
    }

    fn post_count(&self) -> usize {
        2
    }

    fn validate(&self) -> stampede_core::Result<()> {
        positive("resistance", self.resistance)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.current = 0.0;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        s.stamp_resistor(s.node(0), s.node(1), self.resistance);
    }

    fn calculate_current(&mut self, pins: &Pins) {
        self.current = pins.voltage_diff(0, 1) / self.resistance;
    }

    fn current(&self) -> f64 {
        self.current
    }
}

/// Potentiometer: posts 0 and 1 are the track ends, post 2 the wiper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Potentiometer {
    /// Total track resistance (ohms).
    pub resistance: f64,
    /// Wiper position from post 0 (0.0) to post 1 (1.0).
    pub position: f64,
    #[serde(default)]
    currents: [f64; 2],
}

impl Potentiometer {
    /// Shortest arm allowed at either end of the track.
    const MIN_FRACTION: f64 = 1e-3;

    pub fn new(resistance: f64, position: f64) -> Self {
        Self {
            resistance,
            position,
            currents: [0.0; 2],
        }
    }

    /// Resistances from post 0 to the wiper and from the wiper to post 1.
    pub fn arms(&self) -> (f64, f64) {
        let p = self
            .position
            .clamp(Self::MIN_FRACTION, 1.0 - Self::MIN_FRACTION);
        (self.resistance * p, self.resistance * (1.0 - p))
    }
}

impl Device for Potentiometer {
    fn name(&self) -> &str {
        "potentiometer"
    }

    fn post_count(&self) -> usize {
        3
    }

    fn validate(&self) -> stampede_core::Result<()> {
        positive("resistance", self.resistance)?;
        if !(0.0..=1.0).contains(&self.position) {
            return Err(Error::InvalidValue {
                name: "wiper position".to_string(),
                value: self.position,
            }
            .into());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.currents = [0.0; 2];
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        let (r1, r2) = self.arms();
        s.stamp_resistor(s.node(0), s.node(2), r1);
        s.stamp_resistor(s.node(2), s.node(1), r2);
    }

    fn calculate_current(&mut self, pins: &Pins) {
        let (r1, r2) = self.arms();
        self.currents = [
            pins.voltage_diff(0, 2) / r1,
            pins.voltage_diff(1, 2) / r2,
        ];
    }

    fn current(&self) -> f64 {
        self.currents[0]
    }

    fn post_current(&self, post: usize) -> f64 {
        match post {
            0 => -self.currents[0],
            1 => -self.currents[1],
            2 => self.currents[0] + self.currents[1],
            _ => 0.0,
        }
    }

    fn power(&self, pins: &Pins) -> f64 {
        pins.voltage_diff(0, 2) * self.currents[0] + pins.voltage_diff(1, 2) * self.currents[1]
    }
}

/// A capacitor: companion resistor in series with a voltage source, joined
/// at one internal node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capacitor {
    /// Capacitance value in farads.
    pub capacitance: f64,
    /// Voltage across the capacitor after a reset.
    #[serde(default)]
    pub initial_voltage: f64,
    #[serde(default)]
    voltdiff: f64,
    #[serde(default)]
    current: f64,
    #[serde(default)]
    comp_resistance: f64,
    #[serde(default)]
    source_value: f64,
}

impl Capacitor {
    /// Create a new fixed-value capacitor.
    pub fn new(capacitance: f64) -> Self {
        Self {
            capacitance,
            initial_voltage: 0.0,
            voltdiff: 0.0,
            current: 0.0,
            comp_resistance: 0.0,
            source_value: 0.0,
        }
    }

    /// Start charged to `volts` after every reset.
    pub fn with_initial_voltage(mut self, volts: f64) -> Self {
        self.initial_voltage = volts;
        self.voltdiff = volts;
        self
    }

    /// Voltage across the capacitor at the last committed step.
    pub fn voltage(&self) -> f64 {
        self.voltdiff
    }

    /// Companion resistance for a step of `dt`.
    pub fn companion_resistance(&self, ctx: &StepContext) -> f64 {
        if ctx.is_trapezoidal() {
            ctx.dt / (2.0 * self.capacitance)
        } else {
            ctx.dt / self.capacitance
        }
    }
}

impl Device for Capacitor {
    fn name(&self) -> &str {
        "capacitor"
    }

    fn post_count(&self) -> usize {
        2
    }

    fn path_role(&self) -> PathRole {
        PathRole::Capacitor
    }

    fn internal_node_count(&self) -> usize {
        1
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn validate(&self) -> stampede_core::Result<()> {
        positive("capacitance", self.capacitance)?;
        finite("initial voltage", self.initial_voltage)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.voltdiff = self.initial_voltage;
        self.current = 0.0;
        self.source_value = 0.0;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, ctx: &StepContext) {
        self.comp_resistance = self.companion_resistance(ctx);
        s.stamp_resistor(s.node(0), s.node(2), self.comp_resistance);
        s.stamp_voltage_source(s.node(2), s.node(1), 0, 0.0);
    }

    fn start_iteration(&mut self, _pins: &Pins, ctx: &StepContext) {
        self.source_value = if ctx.is_trapezoidal() {
            -self.voltdiff - self.current * self.comp_resistance
        } else {
            -self.voltdiff
        };
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        s.update_voltage_source(0, self.source_value);
        Ok(Convergence::Converged)
    }

    fn set_source_current(&mut self, _local: usize, current: f64) {
        self.current = current;
    }

    fn calculate_current(&mut self, pins: &Pins) {
        self.voltdiff = pins.voltage_diff(0, 1);
    }

    fn current(&self) -> f64 {
        self.current
    }
}

/// An inductor in Norton companion form: resistor in parallel with a
/// current source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inductor {
    /// Inductance in henries.
    pub inductance: f64,
    /// Current through the inductor after a reset.
    #[serde(default)]
    pub initial_current: f64,
    #[serde(default)]
    current: f64,
    #[serde(default)]
    voltdiff: f64,
    #[serde(default)]
    comp_resistance: f64,
    #[serde(default)]
    cur_source: f64,
}

impl Inductor {
    pub fn new(inductance: f64) -> Self {
        Self {
            inductance,
            initial_current: 0.0,
            current: 0.0,
            voltdiff: 0.0,
            comp_resistance: 0.0,
            cur_source: 0.0,
        }
    }

    pub fn with_initial_current(mut self, amps: f64) -> Self {
        self.initial_current = amps;
        self.current = amps;
        self
    }

    pub fn companion_resistance(&self, ctx: &StepContext) -> f64 {
        if ctx.is_trapezoidal() {
            2.0 * self.inductance / ctx.dt
        } else {
            self.inductance / ctx.dt
        }
    }
}

impl Device for Inductor {
    fn name(&self) -> &str {
        "inductor"
    }

    fn post_count(&self) -> usize {
        2
    }

    fn path_role(&self) -> PathRole {
        PathRole::Inductor
    }

    fn validate(&self) -> stampede_core::Result<()> {
        positive("inductance", self.inductance)?;
        finite("initial current", self.initial_current)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.current = self.initial_current;
        self.voltdiff = 0.0;
        self.cur_source = self.initial_current;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, ctx: &StepContext) {
        self.comp_resistance = self.companion_resistance(ctx);
        s.stamp_resistor(s.node(0), s.node(1), self.comp_resistance);
    }

    fn start_iteration(&mut self, _pins: &Pins, ctx: &StepContext) {
        self.cur_source = if ctx.is_trapezoidal() {
            self.voltdiff / self.comp_resistance + self.current
        } else {
            self.current
        };
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        s.stamp_current_source(s.node(0), s.node(1), self.cur_source);
        Ok(Convergence::Converged)
    }

    fn calculate_current(&mut self, pins: &Pins) {
        self.voltdiff = pins.voltage_diff(0, 1);
        if self.comp_resistance > 0.0 {
            self.current = self.voltdiff / self.comp_resistance + self.cur_source;
        }
    }

    fn current(&self) -> f64 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{IntegrationMethod, MnaSystem, NodeId};

    fn ctx(dt: f64) -> StepContext {
        StepContext::new(dt, IntegrationMethod::Trapezoidal)
    }

    #[test]
    fn test_resistor_stamp() {
        let mut r = Resistor::new(1000.0);
        let mut mna = MnaSystem::new(2, 0);
        let pins = Pins::new(vec![NodeId::new(1), NodeId::new(2)], 0, 0);
        r.stamp(&mut Stamper::new(&mut mna, &pins), &ctx(1e-6));

        let g = 1.0 / 1000.0;
        assert!((mna.matrix()[(0, 0)] - g).abs() < 1e-15);
        assert!((mna.matrix()[(1, 1)] - g).abs() < 1e-15);
        assert!((mna.matrix()[(0, 1)] + g).abs() < 1e-15);
        assert!((mna.matrix()[(1, 0)] + g).abs() < 1e-15);
    }

    #[test]
    fn test_resistor_validation() {
        assert!(Resistor::new(-1.0).validate().is_err());
        assert!(Resistor::new(0.0).validate().is_err());
        assert!(Resistor::new(f64::NAN).validate().is_err());
        assert!(Resistor::new(10.0).validate().is_ok());
    }

    #[test]
    fn test_resistor_current() {
        let mut r = Resistor::new(100.0);
        r.calculate_current(&Pins::with_volts(&[5.0, 2.5]));
        assert!((r.current() - 0.025).abs() < 1e-15);
        assert!((r.power(&Pins::with_volts(&[5.0, 2.5])) - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn test_potentiometer_arms() {
        let p = Potentiometer::new(10_000.0, 0.25);
        let (r1, r2) = p.arms();
        assert!((r1 - 2500.0).abs() < 1e-9);
        assert!((r2 - 7500.0).abs() < 1e-9);
        // end stops keep both arms finite
        let (r1, _) = Potentiometer::new(10_000.0, 0.0).arms();
        assert!(r1 > 0.0);
        assert!(Potentiometer::new(1.0, 1.5).validate().is_err());
    }

    #[test]
    fn test_capacitor_companion_resistance() {
        let c = Capacitor::new(1e-6);
        assert!((c.companion_resistance(&ctx(1e-6)) - 0.5).abs() < 1e-12);
        let be = StepContext::new(1e-6, IntegrationMethod::BackwardEuler);
        assert!((c.companion_resistance(&be) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_capacitor_source_value() {
        let mut c = Capacitor::new(1e-6).with_initial_voltage(2.0);
        c.reset();
        let mut mna = MnaSystem::new(2, 1);
        let pins = Pins::new(vec![NodeId::new(1), NodeId::GROUND, NodeId::new(2)], 0, 1);
        let step = ctx(1e-6);
        c.stamp(&mut Stamper::new(&mut mna, &pins), &step);
        c.set_source_current(0, 1e-3);
        c.start_iteration(&pins, &step);
        // -voltdiff - current * R
        assert!((c.source_value + 2.0 + 1e-3 * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_capacitor_validation() {
        assert!(Capacitor::new(f64::NAN).validate().is_err());
        assert!(Capacitor::new(-1e-6).validate().is_err());
    }

    #[test]
    fn test_inductor_norton_source() {
        let mut l = Inductor::new(1e-3).with_initial_current(0.5);
        l.reset();
        let mut mna = MnaSystem::new(1, 0);
        let pins = Pins::new(vec![NodeId::new(1), NodeId::GROUND], 0, 0);
        let step = ctx(1e-6);
        l.stamp(&mut Stamper::new(&mut mna, &pins), &step);
        assert!((l.comp_resistance - 2000.0).abs() < 1e-9);
        l.start_iteration(&pins, &step);
        l.do_step(&mut Stamper::new(&mut mna, &pins), &step).unwrap();
        // current source from post 0 to post 1 pulls 0.5 A out of node 1
        assert!((mna.rhs()[0] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_wire_is_zero_volt_source() {
        let mut w = Wire::new();
        let mut mna = MnaSystem::new(2, 1);
        let pins = Pins::new(vec![NodeId::new(1), NodeId::new(2)], 0, 1);
        w.stamp(&mut Stamper::new(&mut mna, &pins), &ctx(1e-6));
        assert_eq!(mna.matrix()[(2, 0)], -1.0);
        assert_eq!(mna.matrix()[(2, 1)], 1.0);
        assert_eq!(mna.rhs()[2], 0.0);
    }
}
