//! Error types for stampede-devices.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid device parameter: {0}")]
    InvalidParameter(String),

    #[error("device {name} has invalid value: {value}")]
    InvalidValue { name: String, value: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for stampede_core::Error {
    fn from(e: Error) -> Self {
        stampede_core::Error::InvalidParameter(e.to_string())
    }
}

/// Reject a value that is not finite or not strictly positive.
pub(crate) fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidValue {
            name: name.to_string(),
            value,
        })
    }
}

/// Reject a value that is not finite.
pub(crate) fn finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidValue {
            name: name.to_string(),
            value,
        })
    }
}
