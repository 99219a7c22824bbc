//! Error types for stampede-core.

use thiserror::Error;

use crate::node::NodeId;
use crate::paths::PathProblem;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("malformed device #{index} ({device}): {reason}")]
    MalformedDevice {
        index: usize,
        device: String,
        reason: String,
    },

    #[error("invalid device parameter: {0}")]
    InvalidParameter(String),

    #[error("node {node} (net {net}) has no path to ground")]
    FloatingNode { node: NodeId, net: String },

    #[error("unknown net: {0}")]
    UnknownNet(String),

    #[error("{problem}: device #{index} ({device})")]
    BadPath {
        index: usize,
        device: String,
        problem: PathProblem,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
