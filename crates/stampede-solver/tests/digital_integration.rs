//! Gates and clocked chips settling inside the Newton loop.

use stampede_devices::logic::DIGITAL_SETTLE_ITERATIONS;
use stampede_devices::{
    Chip, Gate, GateKind, LogicInput, LogicOutput, Part, Rail, Resistor, Waveform,
};
use stampede_solver::{Circuit, DeviceId};

fn high(c: &Circuit<Part>, net: &str) -> bool {
    c.node_voltage(net).unwrap() > 2.5
}

fn chip(c: &Circuit<Part>, id: DeviceId) -> &Chip {
    match c.device(id).unwrap() {
        Part::Chip(chip) => chip,
        other => panic!("expected a chip, got {other:?}"),
    }
}

#[test]
fn test_and_gate_follows_inputs() {
    let mut c = Circuit::<Part>::new();
    c.add(LogicInput::new(true), ["a"]).unwrap();
    let b = c.add(LogicInput::new(true), ["b"]).unwrap();
    c.add(Gate::new(GateKind::And, 2).unwrap(), ["a", "b", "out"])
        .unwrap();
    let probe = c.add(LogicOutput::new(), ["out"]).unwrap();

    c.step().unwrap();
    assert!((c.node_voltage("out").unwrap() - 5.0).abs() < 1e-12);
    assert!(matches!(c.device(probe).unwrap(), Part::LogicOutput(p) if p.is_high()));

    assert!(c.toggle_switch(b).unwrap());
    c.step().unwrap();
    assert_eq!(c.node_voltage("out").unwrap(), 0.0);
    assert!(matches!(c.device(probe).unwrap(), Part::LogicOutput(p) if !p.is_high()));
}

#[test]
fn test_gate_chain_settles_within_one_step() {
    let mut c = Circuit::<Part>::new();
    c.add(LogicInput::new(false), ["in"]).unwrap();
    let nets = ["in", "n1", "n2", "n3", "n4"];
    for pair in nets.windows(2) {
        c.add(Gate::inverter(), [pair[0], pair[1]]).unwrap();
    }
    c.add(Resistor::new(10_000.0), ["n4", "gnd"]).unwrap();

    c.step().unwrap();
    assert!(high(&c, "n1"));
    assert!(!high(&c, "n2"));
    assert!(high(&c, "n3"));
    assert!(!high(&c, "n4"));
}

#[test]
fn test_ring_oscillator_does_not_stall() {
    let mut c = Circuit::<Part>::new();
    c.add(Gate::inverter(), ["a", "b"]).unwrap();
    c.add(Gate::inverter(), ["b", "c"]).unwrap();
    c.add(Gate::inverter(), ["c", "a"]).unwrap();

    let report = c.run(50).unwrap();
    assert_eq!(report.steps, 50);
    assert!(report.max_iterations <= DIGITAL_SETTLE_ITERATIONS + 1);
}

#[test]
fn test_d_flip_flop_latches_on_rising_edge() {
    let mut c = Circuit::<Part>::new();
    let d = c.add(LogicInput::new(true), ["d"]).unwrap();
    let clk = c.add(LogicInput::new(false), ["clk"]).unwrap();
    c.add(Chip::d_flip_flop(), ["d", "q", "qn", "clk"]).unwrap();

    c.run(3).unwrap();
    assert!(!high(&c, "q"));
    assert!(high(&c, "qn"));

    // rising edge takes D
    c.toggle_switch(clk).unwrap();
    c.run(2).unwrap();
    assert!(high(&c, "q"));
    assert!(!high(&c, "qn"));

    // D alone changes nothing
    c.toggle_switch(d).unwrap();
    c.run(2).unwrap();
    assert!(high(&c, "q"));

    // falling edge changes nothing
    c.toggle_switch(clk).unwrap();
    c.run(2).unwrap();
    assert!(high(&c, "q"));

    c.toggle_switch(clk).unwrap();
    c.run(2).unwrap();
    assert!(!high(&c, "q"));
    assert!(high(&c, "qn"));
}

#[test]
fn test_counter_counts_clock_edges() {
    let mut c = Circuit::<Part>::new();
    let clk = c.add(LogicInput::new(false), ["clk"]).unwrap();
    let reset = c.add(LogicInput::new(false), ["rst"]).unwrap();
    let counter = c
        .add(Chip::counter(4).unwrap(), ["clk", "rst", "q3", "q2", "q1", "q0"])
        .unwrap();

    for _ in 0..5 {
        c.toggle_switch(clk).unwrap();
        c.step().unwrap();
        c.toggle_switch(clk).unwrap();
        c.step().unwrap();
    }
    assert_eq!(chip(&c, counter).count(), 5);
    // 0101, most significant bit first
    assert!(!high(&c, "q3"));
    assert!(high(&c, "q2"));
    assert!(!high(&c, "q1"));
    assert!(high(&c, "q0"));

    c.toggle_switch(reset).unwrap();
    c.step().unwrap();
    assert_eq!(chip(&c, counter).count(), 0);
    assert!(!high(&c, "q0"));
}

#[test]
fn test_counter_driven_by_square_wave() {
    let mut c = Circuit::<Part>::new();
    c.add(Rail::new(Waveform::square(0.0, 5.0, 1e3, 0.5)), ["clk"])
        .unwrap();
    c.add(LogicInput::new(false), ["rst"]).unwrap();
    let counter = c
        .add(Chip::counter(4).unwrap(), ["clk", "rst", "q3", "q2", "q1", "q0"])
        .unwrap();

    // high from t = 0, so edges at 0, 1, ..., 10 ms
    c.run_until(10.25e-3).unwrap();
    assert_eq!(chip(&c, counter).count(), 11);
    assert!(high(&c, "q3"));
    assert!(!high(&c, "q2"));
    assert!(high(&c, "q1"));
    assert!(high(&c, "q0"));
}

#[test]
fn test_full_adder_truth_table() {
    let mut c = Circuit::<Part>::new();
    let a = c.add(LogicInput::new(false), ["a"]).unwrap();
    let b = c.add(LogicInput::new(false), ["b"]).unwrap();
    let cin = c.add(LogicInput::new(false), ["cin"]).unwrap();
    c.add(Chip::full_adder(), ["a", "b", "cin", "s", "cout"])
        .unwrap();

    let mut state = [false; 3];
    for n in 0u8..8 {
        let want = [n & 1 == 1, n & 2 == 2, n & 4 == 4];
        for (k, id) in [a, b, cin].into_iter().enumerate() {
            if state[k] != want[k] {
                c.toggle_switch(id).unwrap();
                state[k] = want[k];
            }
        }
        c.step().unwrap();
        let sum = want.iter().filter(|x| **x).count();
        assert_eq!(high(&c, "s"), sum % 2 == 1, "inputs {want:?}");
        assert_eq!(high(&c, "cout"), sum >= 2, "inputs {want:?}");
    }
}
