//! Simulation settings.

use serde::{Deserialize, Serialize};
use stampede_core::IntegrationMethod;

use crate::error::{Error, Result};

/// What to do with nodes that have no conductive path to ground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FloatingNodePolicy {
    /// Refuse to analyze the circuit.
    #[default]
    Reject,
    /// Tie each floating node to ground through `resistance` ohms.
    Tie { resistance: f64 },
}

impl FloatingNodePolicy {
    pub const DEFAULT_TIE_RESISTANCE: f64 = 1e8;

    pub fn tie() -> Self {
        FloatingNodePolicy::Tie {
            resistance: Self::DEFAULT_TIE_RESISTANCE,
        }
    }
}

/// Parameters for a time-stepped simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Step size (s).
    pub time_step: f64,
    /// Newton iterations allowed per step before it is abandoned.
    pub max_iterations: usize,
    /// Companion model for capacitors and inductors.
    pub integration: IntegrationMethod,
    pub floating_nodes: FloatingNodePolicy,
    /// Steps needing more iterations than this are logged at debug level.
    pub slow_convergence_log: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            time_step: 5e-6,
            max_iterations: 5000,
            integration: IntegrationMethod::Trapezoidal,
            floating_nodes: FloatingNodePolicy::Reject,
            slow_convergence_log: 5,
        }
    }
}

impl SimConfig {
    pub fn with_time_step(mut self, dt: f64) -> Self {
        self.time_step = dt;
        self
    }

    pub fn with_integration(mut self, integration: IntegrationMethod) -> Self {
        self.integration = integration;
        self
    }

    pub fn with_floating_nodes(mut self, policy: FloatingNodePolicy) -> Self {
        self.floating_nodes = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "time step must be positive, got {}",
                self.time_step
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if let FloatingNodePolicy::Tie { resistance } = self.floating_nodes {
            if !(resistance.is_finite() && resistance > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "tie resistance must be positive, got {resistance}"
                )));
            }
        }
        Ok(())
    }
}
