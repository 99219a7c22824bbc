//! Device models and MNA stamps for Stampede.
//!
//! This crate provides device models for:
//! - Passive elements: wire, R, potentiometer, C, L, transformer
//! - Semiconductors: diode/LED/zener, BJT, MOSFET, JFET
//! - Op-amp, 555 timer and VCO
//! - Logic gates, logic inputs/outputs and digital chips
//! - Switches, independent sources with time-varying waveforms, probes
//!
//! Every model implements [`stampede_core::Device`]. [`Part`] gathers them
//! into one serializable enum.

pub mod bjt;
pub mod chips;
pub mod diode;
pub mod error;
pub mod gates;
pub mod jfet;
pub mod logic;
pub mod mosfet;
pub mod opamp;
pub mod part;
pub mod passive;
pub mod rng;
pub mod sources;
pub mod switches;
pub mod timer;
pub mod transformer;
pub mod vco;
pub mod waveforms;

pub use bjt::{Polarity, Transistor};
pub use chips::{Chip, ChipKind};
pub use diode::{Diode, DiodeKind};
pub use error::{Error, Result};
pub use gates::{Gate, GateKind, LogicInput, LogicOutput};
pub use jfet::Jfet;
pub use mosfet::Mosfet;
pub use opamp::OpAmp;
pub use part::Part;
pub use passive::{Capacitor, Inductor, Potentiometer, Resistor, Wire};
pub use sources::{CurrentSource, Probe, Rail, VoltageSource};
pub use switches::{AnalogSwitch, Spdt, Switch};
pub use timer::Timer555;
pub use transformer::Transformer;
pub use vco::Vco;
pub use waveforms::Waveform;
