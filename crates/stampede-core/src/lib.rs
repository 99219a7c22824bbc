//! Core circuit representation and MNA matrix structures for Stampede.
//!
//! This crate provides the pieces every other layer builds on: node and net
//! identifiers, the node registry that numbers a wired device list, the
//! Modified Nodal Analysis (MNA) assembler devices stamp into, and the
//! [`Device`] contract itself.

pub mod device;
pub mod error;
pub mod mna;
pub mod net;
pub mod node;
pub mod paths;
pub mod registry;
pub mod units;

pub use device::{
    Convergence, Device, DeviceFault, IntegrationMethod, PathRole, Pins, StepContext,
};
pub use error::{Error, Result};
pub use mna::{MnaSystem, Stamper, Unknown, VsIndex};
pub use net::Net;
pub use node::{Node, NodeId};
pub use paths::PathProblem;
pub use registry::{NodeRegistry, Topology};
