//! # Stampede
//!
//! A time-stepped circuit simulator. Every part stamps its behaviour into a
//! Modified Nodal Analysis matrix that is solved once per Newton iteration,
//! with companion models for capacitors and inductors and digital parts
//! settling inside the same loop.
//!
//! ## Quick Start
//!
//! ```rust
//! use stampede::prelude::*;
//!
//! let mut circuit = Circuit::new();
//! circuit.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
//! circuit.add(Resistor::new(1000.0), ["in", "out"]).unwrap();
//! circuit.add(Capacitor::new(1e-6), ["out", "gnd"]).unwrap();
//!
//! circuit.run_until(1e-3).unwrap();
//! let v = circuit.node_voltage("out").unwrap();
//! assert!((v - 3.16).abs() < 0.02);
//! ```
//!
//! ## Editing a running circuit
//!
//! ```rust
//! use stampede::prelude::*;
//!
//! let mut circuit = Circuit::new();
//! circuit.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
//! let sw = circuit.add(Switch::new(false), ["in", "out"]).unwrap();
//! circuit.add(Resistor::new(100.0), ["out", "gnd"]).unwrap();
//!
//! circuit.step().unwrap();
//! assert_eq!(circuit.node_voltage("out").unwrap(), 0.0);
//!
//! circuit.toggle_switch(sw).unwrap();
//! circuit.step().unwrap();
//! assert!((circuit.node_voltage("out").unwrap() - 5.0).abs() < 1e-9);
//! ```

pub use stampede_core as core;
pub use stampede_devices as devices;
pub use stampede_solver as solver;

// ============================================================================
// Convenient re-exports from stampede_core
// ============================================================================

pub use stampede_core::{
    Convergence,
    Device,
    DeviceFault,
    // Errors
    Error as CoreError,
    IntegrationMethod,
    // Stamping
    MnaSystem,
    Net,
    Node,
    NodeId,
    NodeRegistry,
    Pins,
    StepContext,
    Stamper,
    Topology,
    Unknown,
    VsIndex,
};

// ============================================================================
// Convenient re-exports from stampede_devices
// ============================================================================

pub use stampede_devices::{
    AnalogSwitch,
    Capacitor,
    // Digital
    Chip,
    ChipKind,
    CurrentSource,
    // Semiconductors
    Diode,
    DiodeKind,
    // Errors
    Error as DeviceError,
    Gate,
    GateKind,
    Inductor,
    Jfet,
    LogicInput,
    LogicOutput,
    Mosfet,
    OpAmp,
    // The closed part set
    Part,
    Polarity,
    Potentiometer,
    Probe,
    Rail,
    // Passive elements
    Resistor,
    Spdt,
    // Switches
    Switch,
    Timer555,
    Transformer,
    Transistor,
    Vco,
    // Sources
    VoltageSource,
    Waveform,
    Wire,
};

// ============================================================================
// Convenient re-exports from stampede_solver
// ============================================================================

pub use stampede_solver::{
    DeviceId,
    DeviceSnapshot,
    // Errors
    Error as SolverError,
    FloatingNodePolicy,
    RunReport,
    SimConfig,
    StepReport,
};

/// A circuit over the full part set.
pub type Circuit = stampede_solver::Circuit<Part>;

/// Re-export of nalgebra's dynamic vector type.
pub use nalgebra::DVector;

/// Prelude module containing commonly used types and traits.
///
/// ```rust
/// use stampede::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Circuit, DeviceId, DeviceSnapshot, Net, NodeId, Part};

    pub use crate::{FloatingNodePolicy, IntegrationMethod, RunReport, SimConfig, StepReport};

    pub use crate::Device;

    pub use crate::{
        Capacitor, Chip, ChipKind, CurrentSource, Diode, Gate, GateKind, Inductor, LogicInput,
        LogicOutput, Mosfet, OpAmp, Rail, Resistor, Switch, Timer555, Transistor, VoltageSource,
        Waveform, Wire,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _: NodeId = NodeId::GROUND;
        let r = Resistor::new(1000.0);
        assert_eq!(r.resistance, 1000.0);
        let c = Circuit::new();
        assert!(c.is_empty());
    }

    #[test]
    fn test_circuit_round_trips_parts() {
        let mut c = Circuit::new();
        c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
        c.add(Resistor::new(1000.0), ["in", "gnd"]).unwrap();

        let parts: Vec<Part> = c.parts().map(|(_, p, _)| p.clone()).collect();
        let json = serde_json::to_string(&parts).unwrap();
        let back: Vec<Part> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, parts);
    }

    #[test]
    fn test_solver_errors_reach_the_top() {
        let mut c = Circuit::new();
        c.add(Resistor::new(1000.0), ["a", "b"]).unwrap();
        c.add(Resistor::new(1000.0), ["c", "gnd"]).unwrap();
        assert!(matches!(
            c.step(),
            Err(SolverError::Topology(CoreError::FloatingNode { .. }))
        ));
    }
}
