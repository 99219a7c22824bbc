//! Built-in demo circuits.

use clap::ValueEnum;
use stampede::solver::Result;
use stampede::{
    Capacitor, Chip, Circuit, Diode, Gate, GateKind, Inductor, LogicOutput, OpAmp, Rail,
    Resistor, Timer555, Transistor, VoltageSource, Waveform,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    Divider,
    Rc,
    Rl,
    Diode,
    Bjt,
    AndGate,
    FlipFlop,
    #[value(name = "astable-555")]
    Astable555,
    Opamp,
}

impl Demo {
    pub fn description(self) -> &'static str {
        match self {
            Demo::Divider => "5 V across two 100 ohm resistors",
            Demo::Rc => "1k / 1 uF charging from 5 V",
            Demo::Rl => "10 ohm / 10 mH current rise from 1 V",
            Demo::Diode => "forward-biased diode behind 1k",
            Demo::Bjt => "common-emitter NPN stage",
            Demo::AndGate => "AND gate fed by 1 kHz and 500 Hz square waves",
            Demo::FlipFlop => "D flip-flop dividing a 1 kHz clock by two",
            Demo::Astable555 => "555 timer in astable mode, about 690 Hz",
            Demo::Opamp => "inverting amplifier on a 1 kHz sine, gain -2",
        }
    }

    /// Nets printed when no probe is given.
    pub fn probes(self) -> &'static [&'static str] {
        match self {
            Demo::Divider => &["in", "mid"],
            Demo::Rc => &["in", "out"],
            Demo::Rl => &["in", "mid"],
            Demo::Diode => &["in", "a"],
            Demo::Bjt => &["b", "c"],
            Demo::AndGate => &["a", "b", "out"],
            Demo::FlipFlop => &["clk", "q"],
            Demo::Astable555 => &["th", "out"],
            Demo::Opamp => &["in", "out"],
        }
    }

    /// Simulated time a run covers by default (s).
    pub fn duration(self) -> f64 {
        match self {
            Demo::Divider | Demo::Diode | Demo::Bjt => 1e-4,
            Demo::Rc | Demo::Rl => 5e-3,
            Demo::AndGate | Demo::FlipFlop | Demo::Opamp => 4e-3,
            Demo::Astable555 => 1e-2,
        }
    }

    /// Add the demo's parts to `c`.
    pub fn build(self, c: &mut Circuit) -> Result<()> {
        match self {
            Demo::Divider => {
                c.add(VoltageSource::dc(5.0), ["in", "gnd"])?;
                c.add(Resistor::new(100.0), ["in", "mid"])?;
                c.add(Resistor::new(100.0), ["mid", "gnd"])?;
            }
            Demo::Rc => {
                c.add(VoltageSource::dc(5.0), ["in", "gnd"])?;
                c.add(Resistor::new(1000.0), ["in", "out"])?;
                c.add(Capacitor::new(1e-6), ["out", "gnd"])?;
            }
            Demo::Rl => {
                c.add(VoltageSource::dc(1.0), ["in", "gnd"])?;
                c.add(Resistor::new(10.0), ["in", "mid"])?;
                c.add(Inductor::new(10e-3), ["mid", "gnd"])?;
            }
            Demo::Diode => {
                c.add(VoltageSource::dc(5.0), ["in", "gnd"])?;
                c.add(Resistor::new(1000.0), ["in", "a"])?;
                c.add(Diode::new(), ["a", "gnd"])?;
            }
            Demo::Bjt => {
                c.add(VoltageSource::dc(5.0), ["vcc", "gnd"])?;
                c.add(Resistor::new(470_000.0), ["vcc", "b"])?;
                c.add(Resistor::new(1000.0), ["vcc", "c"])?;
                c.add(Transistor::npn(), ["b", "c", "gnd"])?;
            }
            Demo::AndGate => {
                c.add(Rail::new(Waveform::square(0.0, 5.0, 1e3, 0.5)), ["a"])?;
                c.add(Rail::new(Waveform::square(0.0, 5.0, 500.0, 0.5)), ["b"])?;
                let gate = Gate::new(GateKind::And, 2).map_err(stampede::CoreError::from)?;
                c.add(gate, ["a", "b", "out"])?;
                c.add(LogicOutput::new(), ["out"])?;
            }
            Demo::FlipFlop => {
                c.add(Rail::new(Waveform::square(0.0, 5.0, 1e3, 0.5)), ["clk"])?;
                // D follows Q', so every rising edge toggles Q
                c.add(Chip::d_flip_flop(), ["qn", "q", "qn", "clk"])?;
                c.add(LogicOutput::new(), ["q"])?;
            }
            Demo::Astable555 => {
                c.add(VoltageSource::dc(9.0), ["vcc", "gnd"])?;
                c.add(Resistor::new(1000.0), ["vcc", "dis"])?;
                c.add(Resistor::new(10_000.0), ["dis", "th"])?;
                c.add(Capacitor::new(1e-7), ["th", "gnd"])?;
                c.add(Timer555::new(), ["dis", "th", "th", "vcc", "ctl", "out"])?;
                c.add(Resistor::new(10_000.0), ["out", "gnd"])?;
            }
            Demo::Opamp => {
                c.add(VoltageSource::new(Waveform::ac(1.0, 1e3)), ["in", "gnd"])?;
                c.add(Resistor::new(1000.0), ["in", "m"])?;
                c.add(Resistor::new(2000.0), ["m", "out"])?;
                c.add(OpAmp::new(), ["m", "gnd", "out"])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_demo_runs() {
        for demo in Demo::value_variants() {
            let mut c = Circuit::new();
            demo.build(&mut c).unwrap();
            c.run(20).unwrap_or_else(|e| panic!("{demo:?}: {e}"));
            for net in demo.probes() {
                assert!(c.node_voltage(*net).is_ok(), "{demo:?} probe {net}");
            }
        }
    }

    #[test]
    fn test_flip_flop_divides_clock() {
        let mut c = Circuit::new();
        Demo::FlipFlop.build(&mut c).unwrap();
        let mut edges = 0;
        let mut last = false;
        for _ in 0..1000 {
            c.step().unwrap();
            let q = c.node_voltage("q").unwrap() > 2.5;
            if q && !last {
                edges += 1;
            }
            last = q;
        }
        // 5 ms of a 1 kHz clock: Q rises on every other clock edge
        assert!((2..=3).contains(&edges), "{edges} rising edges on Q");
    }

    #[test]
    fn test_demo_names() {
        let names: Vec<String> = Demo::value_variants()
            .iter()
            .filter_map(|d| d.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert!(names.contains(&"and-gate".to_string()));
        assert!(names.contains(&"astable-555".to_string()));
        assert_eq!(names.len(), 9);
    }
}
