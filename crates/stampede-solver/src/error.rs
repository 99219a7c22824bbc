//! Error types for stampede-solver.

use thiserror::Error;

use crate::circuit::DeviceId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Topology(#[from] stampede_core::Error),

    #[error("singular matrix at row {row} ({unknown})")]
    SingularMatrix { row: usize, unknown: String },

    #[error("no convergence at t = {time:e} s after {iterations} iterations")]
    NonConvergence { time: f64, iterations: usize },

    #[error("device {device} ({name}) failed: {message}")]
    DeviceFault {
        device: DeviceId,
        name: String,
        message: String,
    },

    #[error("circuit halted: {0}")]
    Halted(String),

    #[error("no device with id {0}")]
    UnknownDevice(DeviceId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True if the circuit can keep stepping after this error.
    ///
    /// Only a step that ran out of iterations is recoverable: its state was
    /// rolled back and nothing about the circuit is broken.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NonConvergence { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
