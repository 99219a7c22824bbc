//! Benchmarks for the dense solve and for whole transient steps.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{DMatrix, DVector};
use stampede_devices::{Capacitor, Diode, Part, Resistor, VoltageSource};
use stampede_solver::linear::{solve_dense, Factorization};
use stampede_solver::Circuit;

fn diagonally_dominant(size: usize) -> DMatrix<f64> {
    DMatrix::from_fn(size, size, |i, j| {
        if i == j {
            (size as f64) + 1.0
        } else {
            1.0 / ((i as f64 - j as f64).abs() + 1.0)
        }
    })
}

fn bench_solve_dense(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_dense");

    for size in [10, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, &size| {
            let a = diagonally_dominant(size);
            let rhs = DVector::from_fn(size, |i, _| (i + 1) as f64);
            bencher.iter(|| solve_dense(black_box(&a), black_box(&rhs)).unwrap());
        });
    }

    group.finish();
}

fn bench_cached_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_solve");

    for size in [10, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, &size| {
            let lu = Factorization::new(&diagonally_dominant(size)).unwrap();
            let rhs = DVector::from_fn(size, |i, _| (i + 1) as f64);
            bencher.iter(|| lu.solve(black_box(&rhs)).unwrap());
        });
    }

    group.finish();
}

/// An RC ladder driven from one source, optionally clamped by diodes.
fn ladder(sections: usize, diodes: bool) -> Circuit<Part> {
    let mut c = Circuit::new();
    c.add(VoltageSource::dc(5.0), ["n0", "gnd"]).unwrap();
    for k in 0..sections {
        let (a, b) = (format!("n{k}"), format!("n{}", k + 1));
        c.add(Resistor::new(1000.0), [a, b.clone()]).unwrap();
        c.add(Capacitor::new(1e-7), [b.clone(), "gnd".to_string()]).unwrap();
        if diodes {
            c.add(Diode::new(), [b, "gnd".to_string()]).unwrap();
        }
    }
    c
}

fn bench_transient_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("transient_step");

    for sections in [10, 40] {
        group.bench_with_input(BenchmarkId::new("rc", sections), &sections, |bencher, &n| {
            let mut circuit = ladder(n, false);
            circuit.step().unwrap();
            bencher.iter(|| circuit.step().unwrap());
        });
        group.bench_with_input(
            BenchmarkId::new("rc_diode", sections),
            &sections,
            |bencher, &n| {
                let mut circuit = ladder(n, true);
                circuit.step().unwrap();
                bencher.iter(|| circuit.step().unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_solve_dense,
    bench_cached_solve,
    bench_transient_step
);
criterion_main!(benches);
