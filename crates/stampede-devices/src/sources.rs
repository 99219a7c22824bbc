//! Independent sources and the voltage probe.

use serde::{Deserialize, Serialize};
use stampede_core::{
    Convergence, Device, DeviceFault, NodeId, PathRole, Pins, StepContext, Stamper,
};

use crate::error::finite;
use crate::waveforms::Waveform;

/// Two-terminal voltage source. Posts: 0 positive, 1 negative.
///
/// A DC source stamps its value once. Any other waveform stamps a zero
/// source and writes the value for the step's end time every iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoltageSource {
    pub waveform: Waveform,
    #[serde(default)]
    current: f64,
}

impl VoltageSource {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            current: 0.0,
        }
    }

    pub fn dc(volts: f64) -> Self {
        Self::new(Waveform::dc(volts))
    }

    /// Source value at `time`.
    pub fn voltage_at(&self, time: f64) -> f64 {
        self.waveform.value_at(time)
    }
}

impl Device for VoltageSource {
    fn name(&self) -> &str {
        "voltage source"
    }

    fn post_count(&self) -> usize {
        2
    }

    fn path_role(&self) -> PathRole {
        PathRole::VoltageSource
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn validate(&self) -> stampede_core::Result<()> {
        self.waveform.validate()?;
        Ok(())
    }

    fn reset(&mut self) {
        self.current = 0.0;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        let v = if self.waveform.is_constant() {
            self.waveform.value_at(0.0)
        } else {
            0.0
        };
        s.stamp_voltage_source(s.node(1), s.node(0), 0, v);
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        if !self.waveform.is_constant() {
            s.update_voltage_source(0, self.waveform.value_at(ctx.time));
        }
        Ok(Convergence::Converged)
    }

    fn set_source_current(&mut self, _local: usize, current: f64) {
        self.current = current;
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn post_current(&self, post: usize) -> f64 {
        match post {
            0 => self.current,
            1 => -self.current,
            _ => 0.0,
        }
    }

    /// Power absorbed; negative while the source delivers energy.
    fn power(&self, pins: &Pins) -> f64 {
        -pins.voltage_diff(0, 1) * self.current
    }

    fn ground_reference_post(&self) -> Option<usize> {
        Some(1)
    }
}

/// Single-post voltage source referenced to ground.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rail {
    pub waveform: Waveform,
    #[serde(default)]
    current: f64,
}

impl Rail {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            current: 0.0,
        }
    }

    pub fn dc(volts: f64) -> Self {
        Self::new(Waveform::dc(volts))
    }
}

impl Device for Rail {
    fn name(&self) -> &str {
        "rail"
    }

    fn post_count(&self) -> usize {
        1
    }

    fn path_role(&self) -> PathRole {
        PathRole::VoltageSource
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn validate(&self) -> stampede_core::Result<()> {
        self.waveform.validate()?;
        Ok(())
    }

    fn reset(&mut self) {
        self.current = 0.0;
    }

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        let v = if self.waveform.is_constant() {
            self.waveform.value_at(0.0)
        } else {
            0.0
        };
        s.stamp_voltage_source(NodeId::GROUND, s.node(0), 0, v);
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        if !self.waveform.is_constant() {
            s.update_voltage_source(0, self.waveform.value_at(ctx.time));
        }
        Ok(Convergence::Converged)
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

    fn power(&self, pins: &Pins) -> f64 {
        -pins.volt(0) * self.current
    }

    fn has_ground_connection(&self, _post: usize) -> bool {
        true
    }
}

/// Ideal current source, driving `current` from post 0 through the source
/// to post 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSource {
    pub current: f64,
}

impl Default for CurrentSource {
    fn default() -> Self {
        Self { current: 0.01 }
    }
}

impl CurrentSource {
    pub fn new(current: f64) -> Self {
        Self { current }
    }
}

impl Device for CurrentSource {
    fn name(&self) -> &str {
        "current source"
    }

    fn post_count(&self) -> usize {
        2
    }

    fn path_role(&self) -> PathRole {
        PathRole::CurrentSource
    }

    fn validate(&self) -> stampede_core::Result<()> {
        finite("current", self.current)?;
        Ok(())
    }

    fn reset(&mut self) {}

    fn stamp(&mut self, s: &mut Stamper<'_>, _ctx: &StepContext) {
        s.stamp_current_source(s.node(0), s.node(1), self.current);
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn power(&self, pins: &Pins) -> f64 {
        pins.voltage_diff(0, 1) * self.current
    }

    fn connection(&self, _a: usize, _b: usize) -> bool {
        false
    }
}

/// Voltmeter between two posts. Draws no current.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    #[serde(default)]
    reading: f64,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Voltage across the probe at the last committed step.
    pub fn reading(&self) -> f64 {
        self.reading
    }
}

impl Device for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    fn post_count(&self) -> usize {
        2
    }

    fn reset(&mut self) {
        self.reading = 0.0;
    }

    fn calculate_current(&mut self, pins: &Pins) {
        self.reading = pins.voltage_diff(0, 1);
    }

    fn power(&self, _pins: &Pins) -> f64 {
        0.0
    }

    fn connection(&self, _a: usize, _b: usize) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{IntegrationMethod, MnaSystem, Unknown, VsIndex};

    fn pins2() -> Pins {
        Pins::new(vec![NodeId::new(1), NodeId::new(2)], 0, 1)
    }

    #[test]
    fn test_dc_source_stamped_once() {
        let mut src = VoltageSource::dc(5.0);
        let pins = pins2();
        let mut mna = MnaSystem::new(2, 1);
        let ctx = StepContext::new(1e-6, IntegrationMethod::Trapezoidal);
        src.stamp(&mut Stamper::new(&mut mna, &pins), &ctx);
        let row = mna.row(Unknown::Source(VsIndex(0))).unwrap();
        assert_eq!(mna.rhs()[row], 5.0);
        // positive post carries +1 in the constraint row
        assert_eq!(mna.matrix()[(row, 0)], 1.0);
        assert_eq!(mna.matrix()[(row, 1)], -1.0);

        src.do_step(&mut Stamper::new(&mut mna, &pins), &ctx).unwrap();
        assert_eq!(mna.rhs()[row], 5.0);
    }

    #[test]
    fn test_ac_source_updates_each_iteration() {
        let mut src = VoltageSource::new(Waveform::ac(2.0, 1000.0));
        let pins = pins2();
        let mut mna = MnaSystem::new(2, 1);
        let ctx = StepContext {
            time: 0.25e-3,
            ..StepContext::new(1e-6, IntegrationMethod::Trapezoidal)
        };
        src.stamp(&mut Stamper::new(&mut mna, &pins), &ctx);
        assert_eq!(mna.rhs()[2], 0.0);
        src.do_step(&mut Stamper::new(&mut mna, &pins), &ctx).unwrap();
        assert!((mna.rhs()[2] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_current_source_direction() {
        let mut src = CurrentSource::new(1e-3);
        let pins = Pins::new(vec![NodeId::new(1), NodeId::new(2)], 0, 0);
        let mut mna = MnaSystem::new(2, 0);
        let ctx = StepContext::new(1e-6, IntegrationMethod::Trapezoidal);
        src.stamp(&mut Stamper::new(&mut mna, &pins), &ctx);
        assert_eq!(mna.rhs()[0], -1e-3);
        assert_eq!(mna.rhs()[1], 1e-3);
        assert_eq!(src.post_current(1), 1e-3);
    }

    #[test]
    fn test_rail_and_probe() {
        let rail = Rail::dc(12.0);
        assert!(rail.has_ground_connection(0));
        assert_eq!(rail.post_count(), 1);

        let mut probe = Probe::new();
        probe.calculate_current(&Pins::with_volts(&[3.0, 1.0]));
        assert_eq!(probe.reading(), 2.0);
        assert!(!probe.connection(0, 1));
    }

    #[test]
    fn test_invalid_waveform_rejected() {
        let src = VoltageSource::new(Waveform::square(0.0, 5.0, 100.0, 1.5));
        assert!(src.validate().is_err());
        assert!(CurrentSource::new(f64::NAN).validate().is_err());
    }
}
