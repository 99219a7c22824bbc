//! Linear circuits stepped through time: DC operating points, RC and RL
//! transients, editing, rollback and halting.

use stampede_core::{Device, IntegrationMethod, PathProblem};
use stampede_devices::{
    Capacitor, CurrentSource, Diode, Inductor, LogicInput, Part, Resistor, Switch, VoltageSource,
    Wire,
};
use stampede_solver::{Circuit, Error, FloatingNodePolicy, SimConfig};

fn circuit() -> Circuit<Part> {
    Circuit::new()
}

fn current_of(c: &Circuit<Part>, id: stampede_solver::DeviceId) -> f64 {
    c.device(id).unwrap().current()
}

fn bad_path(err: &Error) -> Option<(usize, &str, PathProblem)> {
    match err {
        Error::Topology(stampede_core::Error::BadPath {
            index,
            device,
            problem,
        }) => Some((*index, device.as_str(), *problem)),
        _ => None,
    }
}

#[test]
fn test_voltage_divider() {
    let mut c = circuit();
    let src = c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    let top = c.add(Resistor::new(100.0), ["in", "mid"]).unwrap();
    c.add(Resistor::new(100.0), ["mid", "gnd"]).unwrap();

    let report = c.step().unwrap();
    assert_eq!(report.iterations, 1);
    assert!((c.node_voltage("in").unwrap() - 5.0).abs() < 1e-12);
    assert!((c.node_voltage("mid").unwrap() - 2.5).abs() < 1e-12);
    assert!((current_of(&c, top) - 25e-3).abs() < 1e-12);
    assert!((current_of(&c, src) - 25e-3).abs() < 1e-12);
}

#[test]
fn test_resistor_across_source_draws_v_over_r() {
    for r in [1.0, 470.0, 1e6] {
        let mut c = circuit();
        c.add(VoltageSource::dc(5.0), ["a", "gnd"]).unwrap();
        let id = c.add(Resistor::new(r), ["a", "gnd"]).unwrap();
        c.step().unwrap();
        let expected = 5.0 / r;
        assert!(
            (current_of(&c, id) - expected).abs() <= 1e-9 * expected,
            "R = {r}"
        );
    }
}

#[test]
fn test_series_ladder_of_any_length() {
    for n in [1usize, 4, 16, 64] {
        let mut c = circuit();
        c.add(VoltageSource::dc(10.0), ["n0", "gnd"]).unwrap();
        let mut ids = Vec::new();
        for k in 0..n {
            let to = if k + 1 == n {
                "gnd".to_string()
            } else {
                format!("n{}", k + 1)
            };
            ids.push(c.add(Resistor::new(100.0), [format!("n{k}"), to]).unwrap());
        }
        c.step().unwrap();
        let expected = 10.0 / (100.0 * n as f64);
        for id in ids {
            assert!((current_of(&c, id) - expected).abs() < 1e-12, "n = {n}");
        }
    }
}

#[test]
fn test_sourceless_network_sits_at_zero() {
    let mut c = circuit();
    c.add(Resistor::new(10.0), ["a", "b"]).unwrap();
    c.add(Resistor::new(20.0), ["b", "gnd"]).unwrap();
    c.add(Resistor::new(30.0), ["a", "gnd"]).unwrap();
    let report = c.step().unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(c.node_voltage("a").unwrap(), 0.0);
    assert_eq!(c.node_voltage("b").unwrap(), 0.0);
}

#[test]
fn test_rc_charging_curve() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    c.add(Resistor::new(1000.0), ["in", "out"]).unwrap();
    c.add(Capacitor::new(1e-6), ["out", "gnd"]).unwrap();

    // one time constant at the default 5 us step
    let report = c.run_until(1e-3).unwrap();
    assert_eq!(report.steps, 200);
    assert!((c.time() - 1e-3).abs() < 1e-12);

    let expected = 5.0 * (1.0 - (-1.0f64).exp());
    let v = c.node_voltage("out").unwrap();
    assert!((v - expected).abs() < 0.02, "v(out) = {v}");
}

#[test]
fn test_constant_current_ramps_capacitor() {
    for method in [IntegrationMethod::Trapezoidal, IntegrationMethod::BackwardEuler] {
        let config = SimConfig::default().with_integration(method);
        let mut c = Circuit::<Part>::with_config(config).unwrap();
        c.add(CurrentSource::new(1e-3), ["gnd", "top"]).unwrap();
        c.add(Capacitor::new(1e-6), ["top", "gnd"]).unwrap();

        c.step().unwrap();
        let mut last = c.node_voltage("top").unwrap();
        for _ in 0..10 {
            c.step().unwrap();
            let v = c.node_voltage("top").unwrap();
            // I dt / C
            assert!((v - last - 5e-3).abs() < 1e-9, "{method:?}");
            last = v;
        }
    }
}

#[test]
fn test_rl_current_rise() {
    let mut c = circuit();
    c.add(VoltageSource::dc(1.0), ["in", "gnd"]).unwrap();
    c.add(Resistor::new(10.0), ["in", "mid"]).unwrap();
    let l = c.add(Inductor::new(10e-3), ["mid", "gnd"]).unwrap();

    c.run_until(1e-3).unwrap();
    let expected = 0.1 * (1.0 - (-1.0f64).exp());
    let i = current_of(&c, l);
    assert!((i - expected).abs() < 5e-4, "i(L) = {i}");
}

#[test]
fn test_reset_reproduces_trajectory() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    c.add(Resistor::new(1000.0), ["in", "out"]).unwrap();
    c.add(Capacitor::new(1e-6), ["out", "gnd"]).unwrap();
    c.add(Diode::new(), ["out", "gnd"]).unwrap();

    let trace = |c: &mut Circuit<Part>| -> Vec<f64> {
        (0..100)
            .map(|_| {
                c.step().unwrap();
                c.node_voltage("out").unwrap()
            })
            .collect()
    };
    let first = trace(&mut c);
    c.reset();
    assert_eq!(c.time(), 0.0);
    assert_eq!(c.steps(), 0);
    let second = trace(&mut c);
    assert_eq!(first, second);
}

#[test]
fn test_non_convergence_rolls_back() {
    let config = SimConfig {
        max_iterations: 1,
        ..SimConfig::default()
    };
    let mut c = Circuit::<Part>::with_config(config).unwrap();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    c.add(Resistor::new(1000.0), ["in", "a"]).unwrap();
    c.add(Diode::new(), ["a", "gnd"]).unwrap();

    let err = c.step().unwrap_err();
    assert!(matches!(err, Error::NonConvergence { iterations: 1, .. }));
    assert!(err.is_recoverable());
    assert!(!c.halted());
    assert_eq!(c.steps(), 0);
    assert_eq!(c.time(), 0.0);
    assert_eq!(c.node_voltage("a").unwrap(), 0.0);

    c.set_config(SimConfig::default()).unwrap();
    c.step().unwrap();
    assert_eq!(c.steps(), 1);
    assert!(c.node_voltage("a").unwrap() > 0.4);
}

#[test]
fn test_floating_node_policy() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    c.add(Resistor::new(1000.0), ["in", "gnd"]).unwrap();
    c.add(Capacitor::new(1e-6), ["x", "y"]).unwrap();

    let err = c.step().unwrap_err();
    assert!(matches!(
        err,
        Error::Topology(stampede_core::Error::FloatingNode { .. })
    ));
    assert!(c.halted());
    assert!(matches!(c.step().unwrap_err(), Error::Halted(_)));

    c.set_config(SimConfig::default().with_floating_nodes(FloatingNodePolicy::tie()))
        .unwrap();
    assert!(!c.halted());
    c.step().unwrap();
    assert_eq!(c.node_voltage("x").unwrap(), 0.0);
    assert!((c.node_voltage("in").unwrap() - 5.0).abs() < 1e-12);
}

#[test]
fn test_parallel_sources_are_a_loop() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["a", "gnd"]).unwrap();
    let extra = c.add(VoltageSource::dc(3.0), ["a", "gnd"]).unwrap();
    c.add(Resistor::new(100.0), ["a", "gnd"]).unwrap();

    let err = c.step().unwrap_err();
    assert_eq!(
        bad_path(&err),
        Some((0, "voltage source", PathProblem::VoltageLoop)),
        "{err}"
    );
    assert!(c.halted());
    assert!(matches!(c.step().unwrap_err(), Error::Halted(_)));

    c.remove(extra).unwrap();
    c.step().unwrap();
    assert!((c.node_voltage("a").unwrap() - 5.0).abs() < 1e-12);
}

#[test]
fn test_wire_across_source_is_a_loop() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    c.add(Resistor::new(100.0), ["in", "gnd"]).unwrap();
    let short = c.add(Wire::new(), ["in", "gnd"]).unwrap();

    let err = c.step().unwrap_err();
    assert_eq!(
        bad_path(&err),
        Some((0, "voltage source", PathProblem::VoltageLoop))
    );

    c.remove(short).unwrap();
    c.step().unwrap();
}

#[test]
fn test_capacitor_across_source_rejected() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    let cap = c.add(Capacitor::new(1e-6), ["in", "gnd"]).unwrap();

    let err = c.step().unwrap_err();
    assert_eq!(
        bad_path(&err),
        Some((1, "capacitor", PathProblem::CapacitorLoop)),
        "{err}"
    );
    assert!(c.halted());

    // a series resistor breaks the loop
    c.rewire(cap, ["in", "out"]).unwrap();
    c.add(Resistor::new(1000.0), ["out", "gnd"]).unwrap();
    c.step().unwrap();
    assert!((current_of(&c, cap).abs() - 5e-3).abs() < 1e-4);
}

#[test]
fn test_shorted_capacitor_is_discharged() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    c.add(Resistor::new(1000.0), ["in", "out"]).unwrap();
    let cap = c.add(Capacitor::new(1e-6), ["out", "gnd"]).unwrap();
    let sw = c.add(Switch::new(false), ["out", "gnd"]).unwrap();
    c.run(100).unwrap();
    assert!(c.node_voltage("out").unwrap() > 1.0);

    c.toggle_switch(sw).unwrap();
    c.step().unwrap();
    assert!(c.node_voltage("out").unwrap().abs() < 1e-9);
    assert!(current_of(&c, cap).abs() < 1e-9);
}

#[test]
fn test_current_source_without_return_path() {
    let config = SimConfig::default().with_floating_nodes(FloatingNodePolicy::tie());
    let mut c = Circuit::<Part>::with_config(config).unwrap();
    c.add(CurrentSource::new(1e-3), ["gnd", "top"]).unwrap();
    let sw = c.add(Switch::new(false), ["top", "load"]).unwrap();
    c.add(Resistor::new(1000.0), ["load", "gnd"]).unwrap();

    let err = c.step().unwrap_err();
    assert_eq!(
        bad_path(&err),
        Some((0, "current source", PathProblem::NoCurrentPath)),
        "{err}"
    );

    c.toggle_switch(sw).unwrap();
    c.step().unwrap();
    assert!((c.node_voltage("top").unwrap().abs() - 1.0).abs() < 1e-9);
}

#[test]
fn test_conflicting_drivers_are_singular() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["a", "gnd"]).unwrap();
    let input = c.add(LogicInput::new(false), ["a"]).unwrap();

    let err = c.step().unwrap_err();
    assert!(matches!(err, Error::SingularMatrix { .. }), "{err}");
    assert!(c.halted());

    c.remove(input).unwrap();
    c.add(Resistor::new(100.0), ["a", "gnd"]).unwrap();
    c.step().unwrap();
    assert!((c.node_voltage("a").unwrap() - 5.0).abs() < 1e-12);
}

#[test]
fn test_zero_resistance_edit_faults() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    let r = c.add(Resistor::new(1000.0), ["in", "gnd"]).unwrap();
    c.step().unwrap();

    if let Part::Resistor(res) = c.device_mut(r).unwrap() {
        res.resistance = 0.0;
    }
    let err = c.step().unwrap_err();
    match &err {
        Error::DeviceFault { device, name, .. } => {
            assert_eq!(*device, r);
            assert_eq!(name, "resistor");
        }
        other => panic!("expected a device fault, got {other}"),
    }
    assert!(c.halted());
}

#[test]
fn test_renumbering_keeps_voltages_by_net() {
    let mut c = circuit();
    let v1 = c.add(VoltageSource::dc(5.0), ["a", "gnd"]).unwrap();
    let r1 = c.add(Resistor::new(100.0), ["a", "gnd"]).unwrap();
    c.add(VoltageSource::dc(2.0), ["b", "gnd"]).unwrap();
    c.add(Resistor::new(100.0), ["b", "gnd"]).unwrap();
    c.step().unwrap();

    // "b" moves from node 2 to node 1
    c.remove(v1).unwrap();
    c.remove(r1).unwrap();
    c.analyze().unwrap();
    assert!((c.node_voltage("b").unwrap() - 2.0).abs() < 1e-12);
}

#[test]
fn test_bad_edits_rejected() {
    let mut c = circuit();
    assert!(c.add(Resistor::new(-1.0), ["a", "gnd"]).is_err());
    assert!(c.add(Resistor::new(1.0), ["a"]).is_err());
    assert!(c.is_empty());

    let id = c.add(Resistor::new(1.0), ["a", "gnd"]).unwrap();
    assert!(c.rewire(id, ["a", "b", "c"]).is_err());
    c.remove(id).unwrap();
    assert!(matches!(c.remove(id), Err(Error::UnknownDevice(_))));
}

#[test]
fn test_edit_keeps_time_and_voltages() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    c.add(Resistor::new(1000.0), ["in", "out"]).unwrap();
    c.add(Capacitor::new(1e-6), ["out", "gnd"]).unwrap();
    c.run(100).unwrap();
    let before = c.node_voltage("out").unwrap();

    // a load on another net does not disturb the capacitor's charge
    c.add(Resistor::new(1000.0), ["in", "gnd"]).unwrap();
    c.step().unwrap();
    assert_eq!(c.steps(), 101);
    let after = c.node_voltage("out").unwrap();
    assert!(after > before);
    assert!(after - before < 0.05);
}

#[test]
fn test_switch_toggles_and_links() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    let s1 = c.add(Switch::new(false).with_link(1), ["in", "a"]).unwrap();
    c.add(Resistor::new(1000.0), ["a", "gnd"]).unwrap();
    c.add(Switch::new(false).with_link(1), ["in", "b"]).unwrap();
    c.add(Resistor::new(1000.0), ["b", "gnd"]).unwrap();

    c.step().unwrap();
    assert_eq!(c.node_voltage("a").unwrap(), 0.0);
    assert_eq!(c.node_voltage("b").unwrap(), 0.0);

    assert!(c.toggle_switch(s1).unwrap());
    c.step().unwrap();
    assert!((c.node_voltage("a").unwrap() - 5.0).abs() < 1e-12);
    assert!((c.node_voltage("b").unwrap() - 5.0).abs() < 1e-12);

    let r = c.parts().nth(2).map(|(id, _, _)| id).unwrap();
    assert!(!c.toggle_switch(r).unwrap());
}

#[test]
fn test_snapshot_reports_voltages_and_power() {
    let mut c = circuit();
    c.add(VoltageSource::dc(5.0), ["in", "gnd"]).unwrap();
    let r = c.add(Resistor::new(1000.0), ["in", "gnd"]).unwrap();
    c.step().unwrap();

    let snap = c.snapshot(r).unwrap();
    assert_eq!(snap.name, "resistor");
    assert!((snap.voltages[0] - 5.0).abs() < 1e-12);
    assert!((snap.current - 5e-3).abs() < 1e-12);
    assert!((snap.power - 25e-3).abs() < 1e-12);
    assert_eq!(c.snapshots().len(), 2);
}
