//! Newton-Raphson iteration over a device list.
//!
//! Each iteration restores the base (linear) stamps, lets every device
//! re-linearize around the present voltages, and solves. A step converges
//! once every device reports a settled verdict on an iteration after the
//! first. Purely linear systems reuse one factorization and are done after
//! a single solve unless a digital device is still settling.

use log::trace;
use nalgebra::DVector;
use stampede_core::{Convergence, Device, MnaSystem, Pins, StepContext, Stamper, Unknown};

use crate::linear::{Factorization, Singular};

/// Why a step could not be completed.
#[derive(Debug, Clone, PartialEq)]
pub enum StepFailure {
    /// The iteration bound ran out.
    NonConvergence { iterations: usize },
    Singular(Singular),
    /// A device reported an unphysical state. `index` is its position in
    /// the device list.
    Fault { index: usize, message: String },
}

impl From<Singular> for StepFailure {
    fn from(s: Singular) -> Self {
        StepFailure::Singular(s)
    }
}

/// The assembled system for one analysis.
#[derive(Debug, Clone)]
pub struct NewtonSystem {
    base: MnaSystem,
    work: MnaSystem,
    nonlinear: bool,
    cached: Option<Factorization>,
    solution: DVector<f64>,
}

impl NewtonSystem {
    /// Wrap a base system. Linear systems are factored here, once.
    pub fn new(base: MnaSystem, nonlinear: bool) -> Result<Self, Singular> {
        let cached = if nonlinear || base.size() == 0 {
            None
        } else {
            Some(Factorization::new(base.matrix())?)
        };
        let solution = DVector::zeros(base.size());
        Ok(Self {
            work: base.clone(),
            base,
            nonlinear,
            cached,
            solution,
        })
    }

    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear
    }

    pub fn base(&self) -> &MnaSystem {
        &self.base
    }

    /// Latest solution vector: node voltages, then source currents.
    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }

    /// Value of an unknown in the latest solution. Ground reads 0.
    pub fn value(&self, unknown: Unknown) -> f64 {
        self.base
            .row(unknown)
            .and_then(|r| self.solution.get(r).copied())
            .unwrap_or(0.0)
    }

    /// Seed the solution from carried-over pin voltages.
    pub fn seed_from(&mut self, pins: &[Pins]) {
        for p in pins {
            for (node, v) in p.nodes().iter().zip(p.volts()) {
                if let Some(r) = node.index() {
                    self.solution[r] = *v;
                }
            }
        }
    }

    pub fn clear_solution(&mut self) {
        self.solution.fill(0.0);
    }

    /// Run Newton iterations for one time step. Returns the number of
    /// iterations used.
    ///
    /// On failure device and pin state is left mid-iteration; the caller
    /// restores its snapshot.
    pub fn iterate<D: Device>(
        &mut self,
        devices: &mut [D],
        pins: &mut [Pins],
        ctx: &mut StepContext,
        max_iterations: usize,
    ) -> Result<usize, StepFailure> {
        for iter in 0..max_iterations {
            ctx.iteration = iter;
            self.work.restore_from(&self.base, self.nonlinear);

            let mut verdict = Convergence::Converged;
            for (index, (device, p)) in devices.iter_mut().zip(pins.iter()).enumerate() {
                let v = device
                    .do_step(&mut Stamper::new(&mut self.work, p), ctx)
                    .map_err(|f| StepFailure::Fault {
                        index,
                        message: f.message,
                    })?;
                if let Some(message) = self.work.take_invalid() {
                    return Err(StepFailure::Fault { index, message });
                }
                verdict = verdict.and(v);
            }
            trace!("t={:e} iteration {iter}: {verdict:?}", ctx.time);

            if verdict.is_converged() && iter > 0 {
                return Ok(iter + 1);
            }

            self.solve()?;
            self.distribute(devices, pins);

            if !self.nonlinear && verdict.is_converged() {
                return Ok(iter + 1);
            }
        }
        Err(StepFailure::NonConvergence {
            iterations: max_iterations,
        })
    }

    fn solve(&mut self) -> Result<(), Singular> {
        if self.work.size() == 0 {
            return Ok(());
        }
        self.solution = match &self.cached {
            Some(lu) if !self.nonlinear => lu.solve(self.work.rhs())?,
            _ => Factorization::new(self.work.matrix())?.solve(self.work.rhs())?,
        };
        Ok(())
    }

    /// Push node voltages into every device's pins and source currents into
    /// the devices that own them.
    fn distribute<D: Device>(&self, devices: &mut [D], pins: &mut [Pins]) {
        for (device, p) in devices.iter_mut().zip(pins.iter_mut()) {
            for k in 0..p.len() {
                let v = self.value(Unknown::Node(p.node(k)));
                p.set_volt(k, v);
            }
            for j in 0..p.source_count() {
                device.set_source_current(j, self.value(Unknown::Source(p.source(j))));
            }
        }
    }
}
