//! Loop and open-path checks over a numbered circuit.
//!
//! A path search walks from one post of a device to its other post through
//! the rest of the circuit, using only the devices a search admits. Posts
//! driven against ground inside a device count as a step through ground.

use std::fmt;

use crate::device::{Device, PathRole, Pins};
use crate::error::{Error, Result};
use crate::node::NodeId;
use crate::registry::Topology;

/// Series inductors must already carry the same current to share a path.
const INDUCTOR_CURRENT_TOLERANCE: f64 = 1e-10;

/// A wiring mistake the solver cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathProblem {
    /// Voltage sources and wires form a loop.
    VoltageLoop,
    /// A capacitor closes a loop of capacitors, sources and wires.
    CapacitorLoop,
    /// A current source has nowhere to send its current.
    NoCurrentPath,
}

impl fmt::Display for PathProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathProblem::VoltageLoop => write!(f, "voltage source loop with no resistance"),
            PathProblem::CapacitorLoop => write!(f, "capacitor loop with no resistance"),
            PathProblem::NoCurrentPath => write!(f, "no path for current source"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Search {
    /// Anything but current sources.
    Inductive,
    Voltage,
    Short,
    CapacitorVoltage,
}

impl Search {
    fn admits(self, role: PathRole) -> bool {
        match self {
            Search::Inductive => role != PathRole::CurrentSource,
            Search::Voltage => matches!(role, PathRole::Wire | PathRole::VoltageSource),
            Search::Short => role == PathRole::Wire,
            Search::CapacitorVoltage => matches!(
                role,
                PathRole::Wire | PathRole::Capacitor | PathRole::VoltageSource
            ),
        }
    }
}

struct PathFinder<'a> {
    devices: &'a [&'a dyn Device],
    pins: &'a [Pins],
    nodes: usize,
}

impl PathFinder<'_> {
    /// True if `from` reaches `to` without passing through device `skip`.
    fn connected(&self, search: Search, skip: usize, from: NodeId, to: NodeId) -> bool {
        let first_current = self.devices[skip].current();
        let mut seen = vec![false; self.nodes];
        let mut pending = Vec::new();
        visit(&mut seen, &mut pending, from);

        while let Some(n) = pending.pop() {
            if n == to {
                return true;
            }
            for (i, (device, p)) in self.devices.iter().zip(self.pins).enumerate() {
                let role = device.path_role();
                if i == skip || !search.admits(role) {
                    continue;
                }
                let posts = device.post_count().min(p.len());
                if n.is_ground() {
                    for j in 0..posts {
                        if device.has_ground_connection(j) {
                            visit(&mut seen, &mut pending, p.node(j));
                        }
                    }
                }
                let Some(j) = (0..posts).find(|&j| p.node(j) == n) else {
                    continue;
                };
                if device.has_ground_connection(j) {
                    visit(&mut seen, &mut pending, NodeId::GROUND);
                }
                if search == Search::Inductive && role == PathRole::Inductor {
                    let c = if j == 0 {
                        -device.current()
                    } else {
                        device.current()
                    };
                    if (c - first_current).abs() > INDUCTOR_CURRENT_TOLERANCE {
                        continue;
                    }
                }
                for k in 0..posts {
                    if k != j && device.connection(j, k) {
                        visit(&mut seen, &mut pending, p.node(k));
                    }
                }
            }
        }
        false
    }
}

fn visit(seen: &mut [bool], pending: &mut Vec<NodeId>, n: NodeId) {
    if let Some(flag) = seen.get_mut(n.as_u32() as usize) {
        if !*flag {
            *flag = true;
            pending.push(n);
        }
    }
}

impl Topology {
    /// Reject voltage-source loops, capacitor loops with no resistance and
    /// current sources with no return path.
    ///
    /// On success returns the indices of devices whose state should be
    /// cleared: inductors with no current path and shorted capacitors.
    pub fn check_paths(&self, devices: &[&dyn Device], pins: &[Pins]) -> Result<Vec<usize>> {
        let finder = PathFinder {
            devices,
            pins,
            nodes: self.nodes().len(),
        };
        let mut idle = Vec::new();
        for (index, (device, p)) in devices.iter().zip(pins).enumerate() {
            if device.post_count() < 2 || p.len() < 2 {
                continue;
            }
            let (a, b) = (p.node(0), p.node(1));
            let fault = |problem| Error::BadPath {
                index,
                device: device.name().to_string(),
                problem,
            };
            match device.path_role() {
                PathRole::Inductor => {
                    if !finder.connected(Search::Inductive, index, a, b) {
                        log::debug!("{} #{index} has no current path", device.name());
                        idle.push(index);
                    }
                }
                PathRole::CurrentSource => {
                    if !finder.connected(Search::Inductive, index, a, b) {
                        return Err(fault(PathProblem::NoCurrentPath));
                    }
                }
                PathRole::VoltageSource if device.post_count() == 2 => {
                    if finder.connected(Search::Voltage, index, a, b) {
                        return Err(fault(PathProblem::VoltageLoop));
                    }
                }
                PathRole::Capacitor => {
                    if finder.connected(Search::Short, index, a, b) {
                        log::debug!("{} #{index} is shorted", device.name());
                        idle.push(index);
                    } else if finder.connected(Search::CapacitorVoltage, index, a, b) {
                        return Err(fault(PathProblem::CapacitorLoop));
                    }
                }
                _ => {}
            }
        }
        Ok(idle)
    }
}
