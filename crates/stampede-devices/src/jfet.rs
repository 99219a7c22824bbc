//! Junction FET: the MOSFET channel equations with a negative threshold,
//! plus a gate-source junction diode.
//!
//! Posts: 0 gate, 1 source, 2 drain.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, Pins, StepContext, Stamper};

use crate::bjt::Polarity;
use crate::diode::{Junction, LEAKAGE};
use crate::error::{finite, positive};
use crate::mosfet::{Channel, Mode, DRAIN, GATE, SOURCE};

/// Forward drop of the gate junction (V).
pub const GATE_FORWARD_DROP: f64 = 0.5;

/// Gate-source voltage beyond which the gate junction counts as forward
/// biased (V).
pub const GATE_FAULT_VOLTAGE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jfet {
    /// `Npn` is N-channel, `Pnp` is P-channel.
    pub polarity: Polarity,
    /// Pinch-off voltage (V).
    pub threshold: f64,
    pub beta: f64,
    #[serde(default)]
    channel: Channel,
    #[serde(default)]
    last_gate_voltage: f64,
}

impl Jfet {
    pub fn new(polarity: Polarity) -> Self {
        Self {
            polarity,
            threshold: -4.0,
            beta: 0.00125,
            channel: Channel::default(),
            last_gate_voltage: 0.0,
        }
    }

    pub fn n_channel() -> Self {
        Self::new(Polarity::Npn)
    }

    pub fn p_channel() -> Self {
        Self::new(Polarity::Pnp)
    }

    pub fn mode(&self) -> Mode {
        self.channel.mode()
    }

    fn gate_junction() -> Junction {
        Junction::new(LEAKAGE, GATE_FORWARD_DROP, 0.0)
    }
}

impl Device for Jfet {
    fn name(&self) -> &str {
        match self.polarity {
            Polarity::Npn => "n-jfet",
            Polarity::Pnp => "p-jfet",
        }
    }

    fn post_count(&self) -> usize {
        3
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn validate(&self) -> stampede_core::Result<()> {
        finite("threshold", self.threshold)?;
        positive("beta", self.beta)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.channel = Channel::default();
        self.last_gate_voltage = 0.0;
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        let step = self
            .channel
            .step(s, self.polarity, self.threshold, self.beta);
        let (anode, cathode) = match self.polarity {
            Polarity::Npn => (GATE, SOURCE),
            Polarity::Pnp => (SOURCE, GATE),
        };
        let gate = Self::gate_junction().step(s, anode, cathode, &mut self.last_gate_voltage);
        let verdict = step.convergence.and(gate);
        if verdict.is_converged() && step.vgs > GATE_FAULT_VOLTAGE {
            return Err(DeviceFault::new(format!(
                "JFET gate junction forward biased at {:.3} V",
                step.vgs
            )));
        }
        Ok(verdict)
    }

    fn current(&self) -> f64 {
        self.channel.ids()
    }

    fn post_current(&self, post: usize) -> f64 {
        self.channel.post_current(post)
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        pins.voltage_diff(DRAIN, SOURCE)
    }

    fn connection(&self, a: usize, b: usize) -> bool {
        a != GATE && b != GATE
    }
}
