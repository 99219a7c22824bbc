//! Simulation time and per-step bookkeeping.

use serde::{Deserialize, Serialize};
use stampede_core::{Device, IntegrationMethod, Pins, StepContext};

/// Simulated time and the number of committed steps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Clock {
    time: f64,
    steps: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the last committed step (s).
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Context for the next step. `time` is the step's end, which is what
    /// the step solves for.
    pub fn next_context(&self, dt: f64, integration: IntegrationMethod) -> StepContext {
        StepContext {
            time: self.time + dt,
            step: self.steps,
            ..StepContext::new(dt, integration)
        }
    }

    /// Commit a step of `dt`.
    pub fn advance(&mut self, dt: f64) {
        self.steps += 1;
        self.time += dt;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Outcome of one committed step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Time after the step (s).
    pub time: f64,
    /// Newton iterations the step took.
    pub iterations: usize,
}

/// Totals over a run of steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub steps: usize,
    pub total_iterations: usize,
    pub max_iterations: usize,
}

impl RunReport {
    pub fn record(&mut self, step: &StepReport) {
        self.steps += 1;
        self.total_iterations += step.iterations;
        self.max_iterations = self.max_iterations.max(step.iterations);
    }
}

/// Device and pin state captured before a step, restored if it fails.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot<D> {
    devices: Vec<D>,
    pins: Vec<Pins>,
}

impl<D: Clone> Snapshot<D> {
    pub(crate) fn take(devices: &[D], pins: &[Pins]) -> Self {
        Self {
            devices: devices.to_vec(),
            pins: pins.to_vec(),
        }
    }

    pub(crate) fn restore(self, devices: &mut Vec<D>, pins: &mut Vec<Pins>) {
        *devices = self.devices;
        *pins = self.pins;
    }
}

/// Let every device compute its per-step companion values.
pub(crate) fn begin_step<D: Device>(devices: &mut [D], pins: &[Pins], ctx: &StepContext) {
    for (device, p) in devices.iter_mut().zip(pins) {
        device.start_iteration(p, ctx);
    }
}

/// Compute terminal currents from the converged voltages.
pub(crate) fn commit_step<D: Device>(devices: &mut [D], pins: &[Pins]) {
    for (device, p) in devices.iter_mut().zip(pins) {
        device.calculate_current(p);
    }
}
