//! A circuit that owns its devices and steps them through time.
//!
//! Devices are kept in insertion order, which is also the order they are
//! numbered, stamped and iterated in, so a circuit built the same way
//! always produces the same trajectory. Any edit marks the circuit for
//! re-analysis; device state survives it, and node voltages are carried
//! over for nodes whose numbering did not change.

use std::fmt;

use log::{debug, error, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use stampede_core::{
    Device, MnaSystem, Net, Node, NodeId, NodeRegistry, Pins, Stamper, Topology, Unknown,
};

use crate::config::{FloatingNodePolicy, SimConfig};
use crate::error::{Error, Result};
use crate::linear::Singular;
use crate::newton::{NewtonSystem, StepFailure};
use crate::transient::{begin_step, commit_step, Clock, RunReport, Snapshot, StepReport};

/// Stable handle to a device. Ids are never reused within a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(u32);

impl DeviceId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only view of one device after the last committed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    /// Voltage at each post, then at each internal node.
    pub voltages: Vec<f64>,
    pub current: f64,
    pub power: f64,
}

#[derive(Debug, Clone)]
struct Analysis {
    ids: Vec<DeviceId>,
    topology: Topology,
    pins: Vec<Pins>,
    system: NewtonSystem,
}

impl Analysis {
    fn pins_of(&self, id: DeviceId) -> Option<&Pins> {
        self.ids.binary_search(&id).ok().map(|k| &self.pins[k])
    }
}

#[derive(Debug, Clone)]
pub struct Circuit<D> {
    config: SimConfig,
    ids: Vec<DeviceId>,
    devices: Vec<D>,
    wiring: Vec<Vec<Net>>,
    next_id: u32,
    analysis: Option<Analysis>,
    dirty: bool,
    clock: Clock,
    halted: Option<Error>,
}

impl<D> Default for Circuit<D> {
    fn default() -> Self {
        Self {
            config: SimConfig::default(),
            ids: Vec::new(),
            devices: Vec::new(),
            wiring: Vec::new(),
            next_id: 0,
            analysis: None,
            dirty: true,
            clock: Clock::new(),
            halted: None,
        }
    }
}

impl<D: Device + Clone> Circuit<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SimConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SimConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.invalidate();
        Ok(())
    }

    /// Add a device wired to `nets`, one per post.
    pub fn add<N>(&mut self, device: impl Into<D>, nets: impl IntoIterator<Item = N>) -> Result<DeviceId>
    where
        N: Into<Net>,
    {
        let device = device.into();
        let nets: Vec<Net> = nets.into_iter().map(Into::into).collect();
        device.validate()?;
        check_wiring(self.devices.len(), &device, &nets)?;

        let id = DeviceId(self.next_id);
        self.next_id += 1;
        self.ids.push(id);
        self.devices.push(device);
        self.wiring.push(nets);
        self.invalidate();
        Ok(id)
    }

    pub fn remove(&mut self, id: DeviceId) -> Result<D> {
        let i = self.index(id)?;
        self.ids.remove(i);
        self.wiring.remove(i);
        self.invalidate();
        Ok(self.devices.remove(i))
    }

    /// Connect an existing device to different nets.
    pub fn rewire<N>(&mut self, id: DeviceId, nets: impl IntoIterator<Item = N>) -> Result<()>
    where
        N: Into<Net>,
    {
        let i = self.index(id)?;
        let nets: Vec<Net> = nets.into_iter().map(Into::into).collect();
        check_wiring(i, &self.devices[i], &nets)?;
        self.wiring[i] = nets;
        self.invalidate();
        Ok(())
    }

    pub fn device(&self, id: DeviceId) -> Result<&D> {
        let i = self.index(id)?;
        Ok(&self.devices[i])
    }

    /// Mutable access to a device. The circuit re-analyzes before the next
    /// step, since parameters or post counts may change.
    pub fn device_mut(&mut self, id: DeviceId) -> Result<&mut D> {
        let i = self.index(id)?;
        self.invalidate();
        Ok(&mut self.devices[i])
    }

    /// Flip a switch and every other switch sharing its link id. Returns
    /// false if the device is not a switch.
    pub fn toggle_switch(&mut self, id: DeviceId) -> Result<bool> {
        let i = self.index(id)?;
        if !self.devices[i].toggle() {
            return Ok(false);
        }
        if let Some(link) = self.devices[i].switch_link() {
            for (k, device) in self.devices.iter_mut().enumerate() {
                if k != i && device.switch_link() == Some(link) {
                    device.toggle();
                }
            }
        }
        self.invalidate();
        Ok(true)
    }

    /// Devices with their ids and wiring, in insertion order.
    pub fn parts(&self) -> impl Iterator<Item = (DeviceId, &D, &[Net])> {
        self.ids
            .iter()
            .zip(&self.devices)
            .zip(&self.wiring)
            .map(|((id, d), nets)| (*id, d, nets.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Time of the last committed step (s).
    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    /// Number of committed steps since the last reset.
    pub fn steps(&self) -> u64 {
        self.clock.steps()
    }

    /// True after a fatal error, until the topology changes.
    pub fn halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<&Error> {
        self.halted.as_ref()
    }

    /// The numbered circuit from the latest analysis.
    pub fn topology(&self) -> Option<&Topology> {
        self.analysis.as_ref().map(|a| &a.topology)
    }

    /// Voltage of `net` at the last committed step.
    pub fn node_voltage(&self, net: impl Into<Net>) -> Result<f64> {
        let net = net.into();
        let analysis = self
            .analysis
            .as_ref()
            .ok_or_else(|| stampede_core::Error::UnknownNet(net.to_string()))?;
        let node = analysis.topology.node_of(&net)?;
        Ok(analysis.system.value(Unknown::Node(node)))
    }

    /// Latest solution vector, if the circuit has been analyzed.
    pub fn solution(&self) -> Option<&DVector<f64>> {
        self.analysis.as_ref().map(|a| a.system.solution())
    }

    pub fn snapshot(&self, id: DeviceId) -> Result<DeviceSnapshot> {
        let i = self.index(id)?;
        Ok(self.snapshot_at(i))
    }

    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        (0..self.devices.len()).map(|i| self.snapshot_at(i)).collect()
    }

    fn snapshot_at(&self, i: usize) -> DeviceSnapshot {
        let id = self.ids[i];
        let device = &self.devices[i];
        let pins = self.analysis.as_ref().and_then(|a| a.pins_of(id));
        let (voltages, power) = match pins {
            Some(p) => (p.volts().to_vec(), device.power(p)),
            None => (vec![0.0; device.post_count()], 0.0),
        };
        DeviceSnapshot {
            id,
            name: device.name().to_string(),
            voltages,
            current: device.current(),
            power,
        }
    }

    /// Zero all device state and simulated time. The next step starts from
    /// a fresh analysis, so re-running reproduces the same trajectory.
    pub fn reset(&mut self) {
        for device in &mut self.devices {
            device.reset();
        }
        self.analysis = None;
        self.dirty = true;
        self.clock.reset();
        self.halted = None;
    }

    /// Number the circuit, stamp the linear part and check connectivity.
    /// Runs automatically before the first step after an edit.
    pub fn analyze(&mut self) -> Result<()> {
        let mut topology = NodeRegistry::number(
            self.devices
                .iter()
                .map(|d| d as &dyn Device)
                .zip(self.wiring.iter().map(Vec::as_slice)),
        )?;
        let mut pins = topology.take_pins();
        if let Some(old) = &self.analysis {
            for ((p, id), nets) in pins.iter_mut().zip(&self.ids).zip(&self.wiring) {
                for (post, net) in nets.iter().enumerate() {
                    if let Ok(node) = old.topology.node_of(net) {
                        p.set_volt(post, old.system.value(Unknown::Node(node)));
                    }
                }
                if let Some(prev) = old.pins_of(*id) {
                    p.carry_internal_volts_from(prev, nets.len());
                }
            }
        }

        let ctx = self
            .clock
            .next_context(self.config.time_step, self.config.integration);
        let mut base = MnaSystem::new(topology.num_nodes(), topology.num_vsources());
        for (i, (device, p)) in self.devices.iter_mut().zip(&pins).enumerate() {
            device.stamp(&mut Stamper::new(&mut base, p), &ctx);
            if let Some(message) = base.take_invalid() {
                return Err(Error::DeviceFault {
                    device: self.ids[i],
                    name: device.name().to_string(),
                    message,
                });
            }
        }
        topology.mark_constrained(&base);

        let floating = topology.floating_nodes(self.devices.iter().map(|d| d as &dyn Device), &pins);
        if let Some(&first) = floating.first() {
            match self.config.floating_nodes {
                FloatingNodePolicy::Reject => {
                    return Err(stampede_core::Error::FloatingNode {
                        node: first,
                        net: node_label(&topology, first),
                    }
                    .into());
                }
                FloatingNodePolicy::Tie { resistance } => {
                    for node in floating {
                        warn!(
                            "tying floating node {} to ground through {resistance:e} ohm",
                            node_label(&topology, node)
                        );
                        base.stamp_resistor(node, NodeId::GROUND, resistance);
                    }
                }
            }
        }

        let view: Vec<&dyn Device> = self.devices.iter().map(|d| d as &dyn Device).collect();
        let idle = topology.check_paths(&view, &pins).map_err(|e| {
            if let stampede_core::Error::BadPath { index, .. } = &e {
                debug!("{e} (device {})", self.ids[*index]);
            }
            e
        })?;
        for i in idle {
            self.devices[i].reset();
        }

        let nonlinear = self.devices.iter().any(|d| d.is_nonlinear());
        let mut system = NewtonSystem::new(base, nonlinear)
            .map_err(|s| singular_error(s, &topology, &pins, &self.ids, &self.devices))?;
        system.seed_from(&pins);

        debug!(
            "analyzed {} devices: {} nodes, {} voltage sources, {}",
            self.devices.len(),
            topology.num_nodes(),
            topology.num_vsources(),
            if nonlinear { "nonlinear" } else { "linear" }
        );
        self.analysis = Some(Analysis {
            ids: self.ids.clone(),
            topology,
            pins,
            system,
        });
        self.dirty = false;
        self.halted = None;
        Ok(())
    }

    /// Advance one time step.
    ///
    /// A step that runs out of Newton iterations is rolled back and
    /// reported as [`Error::NonConvergence`]; the circuit can keep going.
    /// Any other failure halts the circuit until its topology changes.
    pub fn step(&mut self) -> Result<StepReport> {
        if let Some(reason) = &self.halted {
            return Err(Error::Halted(reason.to_string()));
        }
        if self.dirty || self.analysis.is_none() {
            if let Err(e) = self.analyze() {
                return Err(self.halt(e));
            }
        }
        let dt = self.config.time_step;
        let max_iterations = self.config.max_iterations;
        let mut ctx = self.clock.next_context(dt, self.config.integration);

        let Some(analysis) = self.analysis.as_mut() else {
            return Err(Error::Halted("circuit has not been analyzed".to_string()));
        };
        let snapshot = Snapshot::take(&self.devices, &analysis.pins);
        begin_step(&mut self.devices, &analysis.pins, &ctx);

        let failure = match analysis.system.iterate(
            &mut self.devices,
            &mut analysis.pins,
            &mut ctx,
            max_iterations,
        ) {
            Ok(iterations) => {
                commit_step(&mut self.devices, &analysis.pins);
                self.clock.advance(dt);
                if iterations > self.config.slow_convergence_log {
                    debug!(
                        "step {} at t={:e} took {iterations} iterations",
                        self.clock.steps(),
                        self.clock.time()
                    );
                }
                return Ok(StepReport {
                    time: self.clock.time(),
                    iterations,
                });
            }
            Err(failure) => failure,
        };

        snapshot.restore(&mut self.devices, &mut analysis.pins);
        analysis.system.seed_from(&analysis.pins);
        let err = match failure {
            StepFailure::NonConvergence { iterations } => Error::NonConvergence {
                time: ctx.time,
                iterations,
            },
            StepFailure::Singular(s) => singular_error(
                s,
                &analysis.topology,
                &analysis.pins,
                &self.ids,
                &self.devices,
            ),
            StepFailure::Fault { index, message } => Error::DeviceFault {
                device: self.ids[index],
                name: self.devices[index].name().to_string(),
                message,
            },
        };
        if err.is_recoverable() {
            warn!("step at t={:e} rolled back: {err}", ctx.time);
            Err(err)
        } else {
            Err(self.halt(err))
        }
    }

    /// Take `steps` steps, stopping at the first error.
    pub fn run(&mut self, steps: usize) -> Result<RunReport> {
        let mut report = RunReport::default();
        for _ in 0..steps {
            report.record(&self.step()?);
        }
        Ok(report)
    }

    /// Step until simulated time reaches `t_end` (s).
    pub fn run_until(&mut self, t_end: f64) -> Result<RunReport> {
        let mut report = RunReport::default();
        let half_step = self.config.time_step / 2.0;
        while self.time() + half_step < t_end {
            report.record(&self.step()?);
        }
        Ok(report)
    }

    fn index(&self, id: DeviceId) -> Result<usize> {
        self.ids
            .binary_search(&id)
            .map_err(|_| Error::UnknownDevice(id))
    }

    fn invalidate(&mut self) {
        self.dirty = true;
        self.halted = None;
    }

    fn halt(&mut self, err: Error) -> Error {
        error!("circuit halted: {err}");
        self.halted = Some(err.clone());
        err
    }
}

fn check_wiring<D: Device>(index: usize, device: &D, nets: &[Net]) -> Result<()> {
    if nets.len() != device.post_count() {
        return Err(stampede_core::Error::MalformedDevice {
            index,
            device: device.name().to_string(),
            reason: format!(
                "expected {} nets, got {}",
                device.post_count(),
                nets.len()
            ),
        }
        .into());
    }
    Ok(())
}

fn node_label(topology: &Topology, node: NodeId) -> String {
    topology
        .node(node)
        .map(Node::label)
        .unwrap_or_else(|| node.to_string())
}

/// Name the unknown behind a singular row: the node's net, or the device
/// owning the voltage source.
fn singular_error<D: Device>(
    s: Singular,
    topology: &Topology,
    pins: &[Pins],
    ids: &[DeviceId],
    devices: &[D],
) -> Error {
    let num_nodes = topology.num_nodes();
    let unknown = if s.row < num_nodes {
        format!("node {}", node_label(topology, NodeId::new(s.row as u32 + 1)))
    } else {
        let vs = s.row - num_nodes;
        pins.iter()
            .zip(ids.iter().zip(devices))
            .find(|(p, _)| (0..p.source_count()).any(|j| p.source(j).0 == vs))
            .map(|(_, (id, d))| format!("voltage source of {} {id}", d.name()))
            .unwrap_or_else(|| format!("voltage source {vs}"))
    };
    Error::SingularMatrix {
        row: s.row,
        unknown,
    }
}
