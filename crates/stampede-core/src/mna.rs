//! Modified Nodal Analysis (MNA) matrix structures.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::device::Pins;
use crate::node::NodeId;

/// Global index of a voltage-source current unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VsIndex(pub usize);

/// One unknown of the MNA system: a node voltage or a source current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unknown {
    Node(NodeId),
    Source(VsIndex),
}

impl fmt::Display for Unknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unknown::Node(n) => write!(f, "node {n}"),
            Unknown::Source(vs) => write!(f, "voltage source #{}", vs.0),
        }
    }
}

/// MNA system: Ax = b
/// Where A is the conductance/coefficient matrix,
/// x is the solution vector (node voltages + voltage source currents),
/// and b is the RHS vector (current injections + source values).
///
/// Every stamp is additive, and any row or column belonging to ground is
/// dropped. A non-finite stamp is not applied; the first one is recorded
/// until [`MnaSystem::take_invalid`] collects it.
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// The coefficient matrix (G matrix extended with B, C, D blocks).
    pub matrix: DMatrix<f64>,
    /// The right-hand side vector.
    pub rhs: DVector<f64>,
    /// Number of nodes (excluding ground).
    pub num_nodes: usize,
    /// Number of voltage sources.
    pub num_vsources: usize,
    constrained: Vec<bool>,
    invalid: Option<String>,
}

impl MnaSystem {
    /// Create a new MNA system with the given dimensions.
    ///
    /// # Arguments
    /// * `num_nodes` - Number of nodes excluding ground
    /// * `num_vsources` - Number of voltage sources (adds current variables)
    pub fn new(num_nodes: usize, num_vsources: usize) -> Self {
        let size = num_nodes + num_vsources;
        Self {
            matrix: DMatrix::zeros(size, size),
            rhs: DVector::zeros(size),
            num_nodes,
            num_vsources,
            constrained: vec![false; num_nodes],
            invalid: None,
        }
    }

    /// Get the total size of the system (nodes + current variables).
    pub fn size(&self) -> usize {
        self.num_nodes + self.num_vsources
    }

    /// Clear the matrix and RHS to zeros.
    pub fn clear(&mut self) {
        self.matrix.fill(0.0);
        self.rhs.fill(0.0);
        self.invalid = None;
    }

    /// Overwrite this system with `base`. The matrix is copied only when
    /// `with_matrix` is set.
    pub fn restore_from(&mut self, base: &MnaSystem, with_matrix: bool) {
        self.invalid = None;
        self.rhs.copy_from(&base.rhs);
        if with_matrix {
            self.matrix.copy_from(&base.matrix);
        }
    }

    /// Row (and column) of an unknown, `None` for ground.
    pub fn row(&self, unknown: Unknown) -> Option<usize> {
        match unknown {
            Unknown::Node(n) => n.index(),
            Unknown::Source(vs) => Some(self.num_nodes + vs.0),
        }
    }

    /// The unknown occupying a matrix row.
    pub fn unknown_at(&self, row: usize) -> Unknown {
        if row < self.num_nodes {
            Unknown::Node(NodeId::new(row as u32 + 1))
        } else {
            Unknown::Source(VsIndex(row - self.num_nodes))
        }
    }

    /// Stamp value `x` at (row, col): a voltage change of dv on `col`
    /// increases the current out of `row` by x*dv.
    pub fn stamp_matrix(&mut self, row: Unknown, col: Unknown, x: f64) {
        if !x.is_finite() {
            self.reject(format_args!("matrix entry {x} at ({row}, {col})"));
            return;
        }
        if let (Some(i), Some(j)) = (self.row(row), self.row(col)) {
            self.matrix[(i, j)] += x;
        }
    }

    /// Stamp `x` on the right side of `row`: an independent current flowing
    /// into that node.
    pub fn stamp_right_side(&mut self, row: Unknown, x: f64) {
        if !x.is_finite() {
            self.reject(format_args!("right side {x} at {row}"));
            return;
        }
        if let Some(i) = self.row(row) {
            self.rhs[i] += x;
        }
    }

    /// Stamp a conductance between two nodes.
    ///
    /// For a conductance G between nodes i and j:
    /// - A[i,i] += G
    /// - A[j,j] += G
    /// - A[i,j] -= G
    /// - A[j,i] -= G
    pub fn stamp_conductance(&mut self, n1: NodeId, n2: NodeId, g: f64) {
        if !g.is_finite() {
            self.reject(format_args!("conductance {g} between {n1} and {n2}"));
            return;
        }
        if let Some(i) = n1.index() {
            self.matrix[(i, i)] += g;
        }
        if let Some(j) = n2.index() {
            self.matrix[(j, j)] += g;
        }
        if let (Some(i), Some(j)) = (n1.index(), n2.index()) {
            self.matrix[(i, j)] -= g;
            self.matrix[(j, i)] -= g;
        }
    }

    /// Stamp a resistor of `r` ohms between two nodes.
    pub fn stamp_resistor(&mut self, n1: NodeId, n2: NodeId, r: f64) {
        let g = 1.0 / r;
        if !g.is_finite() {
            self.reject(format_args!("resistance {r} between {n1} and {n2}"));
            return;
        }
        self.stamp_conductance(n1, n2, g);
    }

    /// Stamp voltage source `vs` from `n1` to `n2` with value `v`.
    ///
    /// Enforces `V(n2) - V(n1) = v`. The source current unknown is the
    /// current flowing from `n1` through the source into `n2`.
    pub fn stamp_voltage_source(&mut self, n1: NodeId, n2: NodeId, vs: VsIndex, v: f64) {
        let src = Unknown::Source(vs);
        self.stamp_matrix(src, Unknown::Node(n1), -1.0);
        self.stamp_matrix(src, Unknown::Node(n2), 1.0);
        self.stamp_right_side(src, v);
        self.stamp_matrix(Unknown::Node(n1), src, 1.0);
        self.stamp_matrix(Unknown::Node(n2), src, -1.0);
        self.mark_constrained(n1);
        self.mark_constrained(n2);
    }

    /// Add `v` to the value of a source stamped earlier with value 0.
    pub fn update_voltage_source(&mut self, vs: VsIndex, v: f64) {
        self.stamp_right_side(Unknown::Source(vs), v);
    }

    /// Stamp a current source of `i` amps flowing from `n1` through the
    /// source into `n2`.
    pub fn stamp_current_source(&mut self, n1: NodeId, n2: NodeId, i: f64) {
        self.stamp_right_side(Unknown::Node(n1), -i);
        self.stamp_right_side(Unknown::Node(n2), i);
    }

    /// Stamp a voltage-controlled current source: the current from `n1` to
    /// `n2` is `g * (V(cn1) - V(cn2))`.
    pub fn stamp_vccs(&mut self, n1: NodeId, n2: NodeId, cn1: NodeId, cn2: NodeId, g: f64) {
        let (n1, n2, cn1, cn2) = (
            Unknown::Node(n1),
            Unknown::Node(n2),
            Unknown::Node(cn1),
            Unknown::Node(cn2),
        );
        self.stamp_matrix(n1, cn1, g);
        self.stamp_matrix(n2, cn2, g);
        self.stamp_matrix(n1, cn2, -g);
        self.stamp_matrix(n2, cn1, -g);
    }

    fn reject(&mut self, what: fmt::Arguments<'_>) {
        log::warn!("rejected non-finite stamp: {what}");
        if self.invalid.is_none() {
            self.invalid = Some(format!("non-finite stamp: {what}"));
        }
    }

    /// The first rejected stamp since the last call, clear or restore.
    pub fn take_invalid(&mut self) -> Option<String> {
        self.invalid.take()
    }

    fn mark_constrained(&mut self, n: NodeId) {
        if let Some(i) = n.index() {
            self.constrained[i] = true;
        }
    }

    /// True if a voltage source has been stamped against `n`.
    pub fn is_constrained(&self, n: NodeId) -> bool {
        n.index().is_some_and(|i| self.constrained[i])
    }

    /// True if every matrix and RHS entry is finite.
    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|x| x.is_finite()) && self.rhs.iter().all(|x| x.is_finite())
    }

    /// Get a reference to the coefficient matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Get a reference to the RHS vector.
    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }
}

/// Stamping handle passed into a single device call.
///
/// Pairs the shared system with the calling device's [`Pins`], so a device
/// can look up its own nodes, terminal voltages and voltage sources without
/// holding any solver state itself.
pub struct Stamper<'a> {
    mna: &'a mut MnaSystem,
    pins: &'a Pins,
}

impl<'a> Stamper<'a> {
    pub fn new(mna: &'a mut MnaSystem, pins: &'a Pins) -> Self {
        Self { mna, pins }
    }

    pub fn pins(&self) -> &Pins {
        self.pins
    }

    /// Global node of local post or internal node `i`.
    pub fn node(&self, i: usize) -> NodeId {
        self.pins.node(i)
    }

    /// Present voltage guess of local post or internal node `i`.
    pub fn volt(&self, i: usize) -> f64 {
        self.pins.volt(i)
    }

    /// Global index of this device's local voltage source `j`.
    pub fn source(&self, j: usize) -> VsIndex {
        self.pins.source(j)
    }

    pub fn stamp_matrix(&mut self, row: Unknown, col: Unknown, x: f64) {
        self.mna.stamp_matrix(row, col, x);
    }

    pub fn stamp_right_side(&mut self, row: Unknown, x: f64) {
        self.mna.stamp_right_side(row, x);
    }

    pub fn stamp_conductance(&mut self, n1: NodeId, n2: NodeId, g: f64) {
        self.mna.stamp_conductance(n1, n2, g);
    }

    pub fn stamp_resistor(&mut self, n1: NodeId, n2: NodeId, r: f64) {
        self.mna.stamp_resistor(n1, n2, r);
    }

    /// Stamp local voltage source `j`, enforcing `V(n2) - V(n1) = v`.
    pub fn stamp_voltage_source(&mut self, n1: NodeId, n2: NodeId, j: usize, v: f64) {
        let vs = self.pins.source(j);
        self.mna.stamp_voltage_source(n1, n2, vs, v);
    }

    pub fn update_voltage_source(&mut self, j: usize, v: f64) {
        let vs = self.pins.source(j);
        self.mna.update_voltage_source(vs, v);
    }

    pub fn stamp_current_source(&mut self, n1: NodeId, n2: NodeId, i: f64) {
        self.mna.stamp_current_source(n1, n2, i);
    }

    pub fn stamp_vccs(&mut self, n1: NodeId, n2: NodeId, cn1: NodeId, cn2: NodeId, g: f64) {
        self.mna.stamp_vccs(n1, n2, cn1, cn2, g);
    }
}
