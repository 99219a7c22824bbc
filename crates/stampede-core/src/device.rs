//! The device stamping contract.
//!
//! A device never holds a reference to solver state. The solver keeps a
//! [`Pins`] record next to every device and hands both into each call,
//! either directly or wrapped in a [`Stamper`].

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use crate::mna::{Stamper, VsIndex};
use crate::node::NodeId;

/// Companion-model integration rule for energy-storage devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// Trapezoidal rule (second order).
    #[default]
    Trapezoidal,
    /// Backward Euler (first order, heavily damped).
    BackwardEuler,
}

/// Where the solver is within the current time step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    /// Simulated time the step solves for, the end of the step (s).
    pub time: f64,
    /// Time step (s).
    pub dt: f64,
    /// Newton iteration within the step, starting at 0.
    pub iteration: usize,
    /// Number of steps committed since the last reset.
    pub step: u64,
    pub integration: IntegrationMethod,
}

impl StepContext {
    pub fn new(dt: f64, integration: IntegrationMethod) -> Self {
        Self {
            time: 0.0,
            dt,
            iteration: 0,
            step: 0,
            integration,
        }
    }

    pub fn is_trapezoidal(&self) -> bool {
        self.integration == IntegrationMethod::Trapezoidal
    }
}

/// A device's verdict on the present Newton iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    Converged,
    NotConverged,
}

impl Convergence {
    /// `Converged` when `ok` holds.
    pub fn when(ok: bool) -> Self {
        if ok {
            Convergence::Converged
        } else {
            Convergence::NotConverged
        }
    }

    pub fn is_converged(self) -> bool {
        self == Convergence::Converged
    }

    /// Combine two verdicts; any `NotConverged` wins.
    pub fn and(self, other: Convergence) -> Self {
        Convergence::when(self.is_converged() && other.is_converged())
    }
}

/// How a device counts when the analysis looks for loops and open paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathRole {
    /// Zero-resistance conductor (wires, closed switch contacts).
    Wire,
    /// Ideal voltage source, two-terminal or against ground.
    VoltageSource,
    CurrentSource,
    Capacitor,
    Inductor,
    #[default]
    Other,
}

/// A violated physical assumption inside a device model.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct DeviceFault {
    pub message: String,
}

impl DeviceFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The solver's per-device view: global nodes, terminal voltages and the
/// device's block of voltage-source unknowns.
///
/// Indices `0..post_count` are posts, the rest are internal nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pins {
    nodes: Vec<NodeId>,
    volts: Vec<f64>,
    vs_base: usize,
    vs_count: usize,
}

impl Pins {
    pub fn new(nodes: Vec<NodeId>, vs_base: usize, vs_count: usize) -> Self {
        let volts = vec![0.0; nodes.len()];
        Self {
            nodes,
            volts,
            vs_base,
            vs_count,
        }
    }

    /// Build pins with given voltages and no solver attachment, for
    /// evaluating a device outside a circuit.
    pub fn with_volts(volts: &[f64]) -> Self {
        Self {
            nodes: (1..=volts.len() as u32).map(NodeId::new).collect(),
            volts: volts.to_vec(),
            vs_base: 0,
            vs_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn volts(&self) -> &[f64] {
        &self.volts
    }

    pub fn node(&self, i: usize) -> NodeId {
        self.nodes[i]
    }

    pub fn volt(&self, i: usize) -> f64 {
        self.volts[i]
    }

    pub fn set_volt(&mut self, i: usize, v: f64) {
        self.volts[i] = v;
    }

    /// `V(a) - V(b)`.
    pub fn voltage_diff(&self, a: usize, b: usize) -> f64 {
        self.volts[a] - self.volts[b]
    }

    /// Global index of local voltage source `j`.
    pub fn source(&self, j: usize) -> VsIndex {
        debug_assert!(j < self.vs_count, "source {j} out of {}", self.vs_count);
        VsIndex(self.vs_base + j)
    }

    pub fn source_count(&self) -> usize {
        self.vs_count
    }

    /// Copy the internal-node voltages of the same device from an earlier
    /// analysis. Posts are seeded by net, so only indices from `posts` on
    /// are taken, and only when the node layout still matches.
    pub fn carry_internal_volts_from(&mut self, other: &Pins, posts: usize) {
        if other.len() != self.len() {
            return;
        }
        for i in posts..self.len() {
            self.volts[i] = other.volts[i];
        }
    }

    pub fn reset(&mut self) {
        self.volts.fill(0.0);
    }
}

/// Behaviour every circuit part provides to the solver.
///
/// Call order for one analysis: `stamp` once into the base system. For each
/// time step: `start_iteration`, then `do_step` every Newton iteration
/// followed by `set_source_current` for each declared source, then
/// `calculate_current` once the step has converged.
pub trait Device: Debug {
    /// Kind name used in diagnostics.
    fn name(&self) -> &str;

    /// Number of external connection points.
    fn post_count(&self) -> usize;

    /// Number of hidden nodes the device owns.
    fn internal_node_count(&self) -> usize {
        0
    }

    /// Number of voltage-source current unknowns the device adds.
    fn voltage_source_count(&self) -> usize {
        0
    }

    /// True if the matrix must be refactored every iteration.
    fn is_nonlinear(&self) -> bool {
        false
    }

    /// Reject out-of-range parameters before the device joins a circuit.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Zero all time-dependent state.
    fn reset(&mut self);

    /// Linear contributions, issued once per analysis.
    fn stamp(&mut self, _s: &mut Stamper<'_>, _ctx: &StepContext) {}

    /// Once per time step, from the previous step's state.
    fn start_iteration(&mut self, _pins: &Pins, _ctx: &StepContext) {}

    /// Once per Newton iteration. Re-linearizes around the present voltages
    /// and returns this device's own verdict.
    fn do_step(
        &mut self,
        _s: &mut Stamper<'_>,
        _ctx: &StepContext,
    ) -> std::result::Result<Convergence, DeviceFault> {
        Ok(Convergence::Converged)
    }

    /// Solved current through local voltage source `local`.
    fn set_source_current(&mut self, _local: usize, _current: f64) {}

    /// Compute the terminal current from converged voltages.
    fn calculate_current(&mut self, _pins: &Pins) {}

    /// Latest device current (A).
    fn current(&self) -> f64 {
        0.0
    }

    /// Current flowing out of the device into the node at `post`.
    fn post_current(&self, post: usize) -> f64 {
        match post {
            0 => -self.current(),
            1 => self.current(),
            _ => 0.0,
        }
    }

    fn voltage_diff(&self, pins: &Pins) -> f64 {
        if pins.len() >= 2 {
            pins.voltage_diff(0, 1)
        } else {
            pins.volts().first().copied().unwrap_or(0.0)
        }
    }

    fn power(&self, pins: &Pins) -> f64 {
        self.voltage_diff(pins) * self.current()
    }

    /// True if current can flow between posts `a` and `b`.
    fn connection(&self, _a: usize, _b: usize) -> bool {
        true
    }

    /// True if `post` is driven against ground inside the device.
    fn has_ground_connection(&self, _post: usize) -> bool {
        false
    }

    /// Post that may stand in for ground when no post is wired to it.
    fn ground_reference_post(&self) -> Option<usize> {
        None
    }

    fn path_role(&self) -> PathRole {
        PathRole::Other
    }

    /// Link id shared by switches that toggle together.
    fn switch_link(&self) -> Option<u32> {
        None
    }

    /// Flip a switch. Returns false for devices that are not switches.
    fn toggle(&mut self) -> bool {
        false
    }
}
