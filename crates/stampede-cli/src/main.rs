//! Stampede command-line interface.

mod demos;

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info};
use serde::Serialize;
use stampede::core::units::{format_units, format_value, parse_value};
use stampede::{Circuit, DeviceId, DeviceSnapshot, Net, Part, SimConfig};

use crate::demos::Demo;

#[derive(Parser)]
#[command(name = "stampede")]
#[command(about = "Time-stepped analog and digital circuit simulator", long_about = None)]
#[command(version)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate a built-in demo circuit
    Run(RunArgs),
    /// List the built-in demo circuits
    List,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Demo circuit to simulate
    #[arg(value_enum)]
    demo: Demo,

    /// Time step, e.g. 5u or 1e-6 (overrides the config file)
    #[arg(long, value_parser = parse_engineering)]
    dt: Option<f64>,

    /// Number of steps to take
    #[arg(long, conflicts_with = "until")]
    steps: Option<usize>,

    /// Simulated time to stop at, e.g. 10m
    #[arg(long, value_parser = parse_engineering)]
    until: Option<f64>,

    /// Net to print; repeat for several. Defaults to the demo's nets.
    #[arg(short, long = "probe", value_name = "NET")]
    probes: Vec<String>,

    /// Print every Nth step
    #[arg(long, value_name = "N")]
    every: Option<usize>,

    /// JSON file with simulation settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the final state of every part as JSON
    #[arg(long)]
    dump_state: bool,
}

fn parse_engineering(s: &str) -> std::result::Result<f64, String> {
    parse_value(s).ok_or_else(|| format!("not a number: {s}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Command::Run(args) => run(&args),
        Command::List => {
            for demo in Demo::value_variants() {
                if let Some(name) = demo.to_possible_value() {
                    println!("{:<14} {}", name.get_name(), demo.description());
                }
            }
            Ok(())
        }
    }
}

fn load_config(args: &RunArgs) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(dt) = args.dt {
        config = config.with_time_step(dt);
    }
    Ok(config)
}

fn run(args: &RunArgs) -> Result<()> {
    let config = load_config(args)?;
    let mut circuit = Circuit::with_config(config).context("Invalid simulation settings")?;
    args.demo
        .build(&mut circuit)
        .with_context(|| format!("Failed to build demo {:?}", args.demo))?;
    circuit
        .analyze()
        .context("Circuit could not be analyzed")?;

    let probes: Vec<String> = if args.probes.is_empty() {
        args.demo.probes().iter().map(|s| s.to_string()).collect()
    } else {
        args.probes.clone()
    };
    for net in &probes {
        circuit
            .node_voltage(net.as_str())
            .with_context(|| format!("Unknown probe net: {net}"))?;
    }

    let dt = circuit.config().time_step;
    let steps = match (args.steps, args.until) {
        (Some(n), _) => n,
        (None, Some(t)) => (t / dt).round() as usize,
        (None, None) => (args.demo.duration() / dt).round() as usize,
    };
    if steps == 0 {
        bail!("Nothing to simulate: the run is shorter than one step");
    }
    let every = args.every.unwrap_or_else(|| (steps / 20).max(1));

    if let Some(topology) = circuit.topology() {
        info!(
            "{}: {} parts, {} nodes, {} voltage sources",
            args.demo.description(),
            circuit.len(),
            topology.num_nodes(),
            topology.num_vsources()
        );
    }

    print_header(&probes);
    let mut total_iterations = 0;
    let mut max_iterations = 0;
    for k in 1..=steps {
        let report = circuit
            .step()
            .with_context(|| format!("Step {k} failed at t = {}s", format_value(circuit.time())))?;
        total_iterations += report.iterations;
        max_iterations = max_iterations.max(report.iterations);
        if k % every == 0 || k == steps {
            print_row(&circuit, &probes)?;
        }
    }
    debug!("{steps} steps, {total_iterations} Newton iterations");

    println!();
    println!("Steps: {steps}");
    println!("Simulated time: {}", format_units(circuit.time(), "s"));
    println!(
        "Newton iterations: {} total, {:.2} per step, {} max",
        total_iterations,
        total_iterations as f64 / steps as f64,
        max_iterations
    );

    if args.dump_state {
        let state = dump_state(&circuit);
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    Ok(())
}

fn print_header(probes: &[String]) {
    print!("{:>12}", "time");
    for net in probes {
        print!(" {:>12}", format!("V({net})"));
    }
    println!();
}

fn print_row(circuit: &Circuit, probes: &[String]) -> Result<()> {
    print!("{:>12}", format_units(circuit.time(), "s"));
    for net in probes {
        let v = circuit.node_voltage(net.as_str())?;
        print!(" {:>12}", format_units(v, "V"));
    }
    println!();
    Ok(())
}

#[derive(Serialize)]
struct PartState<'a> {
    id: DeviceId,
    nets: &'a [Net],
    part: &'a Part,
    snapshot: DeviceSnapshot,
}

fn dump_state(circuit: &Circuit) -> Vec<PartState<'_>> {
    circuit
        .parts()
        .filter_map(|(id, part, nets)| {
            let snapshot = circuit.snapshot(id).ok()?;
            Some(PartState {
                id,
                nets,
                part,
                snapshot,
            })
        })
        .collect()
}
