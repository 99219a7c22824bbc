//! MOSFET model (square law, three regions).
//!
//! Posts: 0 gate, 1 source, 2 drain. The source/drain roles swap when the
//! nominal drain sits at the lower potential (for N-channel), so the model
//! is symmetric.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, Device, DeviceFault, Pins, StepContext, Stamper, Unknown};

use crate::bjt::Polarity;
use crate::error::{finite, positive};

pub(crate) const GATE: usize = 0;
pub(crate) const SOURCE: usize = 1;
pub(crate) const DRAIN: usize = 2;

/// Per-iteration clamp on source and drain voltage moves (V).
const STEP_CLAMP: f64 = 0.5;
const VOLTAGE_TOLERANCE: f64 = 0.01;
/// Leakage conductance used in cutoff and as the saturation output
/// conductance.
const GDS_MIN: f64 = 1e-8;

/// Operating region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Cutoff,
    Linear,
    Saturation,
}

/// Channel equations shared by the MOSFET and JFET.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Channel {
    lastv1: f64,
    lastv2: f64,
    ids: f64,
    gm: f64,
    gds: f64,
    mode: Mode,
}

/// Outcome of one channel iteration.
pub(crate) struct ChannelStep {
    pub convergence: Convergence,
    /// Polarity-adjusted gate-source voltage at the clamped iterate.
    pub vgs: f64,
}

impl Channel {
    pub(crate) fn step(
        &mut self,
        s: &mut Stamper<'_>,
        polarity: Polarity,
        threshold: f64,
        beta: f64,
    ) -> ChannelStep {
        let pnp = polarity.sign();
        let mut vs = [s.volt(GATE), s.volt(SOURCE), s.volt(DRAIN)];
        vs[SOURCE] = vs[SOURCE].clamp(self.lastv1 - STEP_CLAMP, self.lastv1 + STEP_CLAMP);
        vs[DRAIN] = vs[DRAIN].clamp(self.lastv2 - STEP_CLAMP, self.lastv2 + STEP_CLAMP);

        let (source, drain) = if pnp * vs[SOURCE] > pnp * vs[DRAIN] {
            (DRAIN, SOURCE)
        } else {
            (SOURCE, DRAIN)
        };
        let realvgs = vs[GATE] - vs[source];
        let realvds = vs[drain] - vs[source];
        let moved = (self.lastv1 - vs[SOURCE]).abs() > VOLTAGE_TOLERANCE
            || (self.lastv2 - vs[DRAIN]).abs() > VOLTAGE_TOLERANCE;
        self.lastv1 = vs[SOURCE];
        self.lastv2 = vs[DRAIN];

        let vgs = realvgs * pnp;
        let vds = realvds * pnp;
        let (ids, gm, gds, mode) = if vgs < threshold {
            // zero would make the matrix singular
            (vds * GDS_MIN, 0.0, GDS_MIN, Mode::Cutoff)
        } else if vds < vgs - threshold {
            (
                beta * ((vgs - threshold) * vds - vds * vds * 0.5),
                beta * vds,
                beta * (vgs - vds - threshold),
                Mode::Linear,
            )
        } else {
            let over = vgs - threshold;
            (
                0.5 * beta * over * over + (vds - over) * GDS_MIN,
                beta * over,
                GDS_MIN,
                Mode::Saturation,
            )
        };

        let rs = -pnp * ids + gds * realvds + gm * realvgs;
        let d = Unknown::Node(s.node(drain));
        let src = Unknown::Node(s.node(source));
        let g = Unknown::Node(s.node(GATE));
        s.stamp_matrix(d, d, gds);
        s.stamp_matrix(d, src, -gds - gm);
        s.stamp_matrix(d, g, gm);
        s.stamp_matrix(src, d, -gds);
        s.stamp_matrix(src, src, gds + gm);
        s.stamp_matrix(src, g, -gm);
        s.stamp_right_side(d, rs);
        s.stamp_right_side(src, -rs);

        // report as current from post 2 to post 1
        let swapped = source == DRAIN;
        self.ids = if swapped == (polarity == Polarity::Npn) {
            -ids
        } else {
            ids
        };
        self.gm = gm;
        self.gds = gds;
        self.mode = mode;

        ChannelStep {
            convergence: Convergence::when(!moved),
            vgs,
        }
    }

    pub(crate) fn ids(&self) -> f64 {
        self.ids
    }

    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn transconductance(&self) -> f64 {
        self.gm
    }

    pub(crate) fn post_current(&self, post: usize) -> f64 {
        match post {
            SOURCE => self.ids,
            DRAIN => -self.ids,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mosfet {
    /// `Npn` is N-channel, `Pnp` is P-channel.
    pub polarity: Polarity,
    /// Threshold voltage (V).
    pub threshold: f64,
    /// Transconductance parameter (A/V^2).
    pub beta: f64,
    #[serde(default)]
    channel: Channel,
}

impl Mosfet {
    pub fn new(polarity: Polarity) -> Self {
        Self {
            polarity,
            threshold: 1.5,
            beta: 0.02,
            channel: Channel::default(),
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

    pub fn transconductance(&self) -> f64 {
        self.channel.transconductance()
    }
}

impl Device for Mosfet {
    fn name(&self) -> &str {
        match self.polarity {
            Polarity::Npn => "n-mosfet",
            Polarity::Pnp => "p-mosfet",
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
    }

    fn do_step(
        &mut self,
        s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> Result<Convergence, DeviceFault> {
        let step = self
            .channel
            .step(s, self.polarity, self.threshold, self.beta);
        Ok(step.convergence)
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

    fn power(&self, pins: &Pins) -> f64 {
        pins.voltage_diff(DRAIN, SOURCE) * self.channel.ids()
    }

    fn connection(&self, a: usize, b: usize) -> bool {
        a != GATE && b != GATE
    }
}
