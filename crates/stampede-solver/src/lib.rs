//! Time-stepped circuit solving for Stampede.
//!
//! This crate provides:
//! - Dense LU solves with singular-row reporting
//! - A Newton-Raphson driver that aggregates per-device verdicts
//! - [`Circuit`], which owns a device list, re-analyzes it after edits and
//!   steps it through time with rollback on failure

pub mod circuit;
pub mod config;
pub mod error;
pub mod linear;
pub mod newton;
pub mod transient;

pub use circuit::{Circuit, DeviceId, DeviceSnapshot};
pub use config::{FloatingNodePolicy, SimConfig};
pub use error::{Error, Result};
pub use linear::{solve_dense, Factorization, Singular};
pub use newton::{NewtonSystem, StepFailure};
pub use transient::{Clock, RunReport, StepReport};
