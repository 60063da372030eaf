//! wavesim - demo driver for the simulation kernel.
//!
//! Builds a force-driven mass anchored through a spring, simulates it and
//! writes the logged time series for the mass node as CSV to stdout.
//!
//! # Usage
//!
//! ```bash
//! wavesim --stop-time 2.0 --timestep 1e-4 --threads 4 > out.csv
//! ```

use clap::Parser;
use wavesim_core::error::Result;
use wavesim_core::network::mechanic;
use wavesim_core::{ComponentFactory, ComponentSystem, ParallelAlgorithm};

/// Spring-mass demo for the wavesim kernel
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Simulation stop time in seconds
    #[arg(long, default_value_t = 1.0)]
    stop_time: f64,

    /// Timestep in seconds
    #[arg(long, default_value_t = 1e-3)]
    timestep: f64,

    /// Number of threads (1 runs the sequential scheduler)
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Number of log samples to keep
    #[arg(long, default_value_t = 2048)]
    samples: usize,

    /// Multithreaded algorithm: "barrier" or "taskpool"
    #[arg(long, default_value = "barrier")]
    algorithm: String,

    /// Drive force in newtons
    #[arg(long, default_value_t = 100.0)]
    force: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let algorithm = match args.algorithm.as_str() {
        "taskpool" => ParallelAlgorithm::TaskPool,
        _ => ParallelAlgorithm::Barrier,
    };

    let factory = ComponentFactory::with_builtin_library();
    let mut system = ComponentSystem::with_default_hub("demo");

    system.add_component(factory.create("SignalStep")?, "drive")?;
    system.add_component(factory.create("ForceSource")?, "force")?;
    system.add_component(factory.create("TranslationalMass")?, "mass")?;
    system.add_component(factory.create("TranslationalSpring")?, "spring")?;
    system.add_component(factory.create("ForceSource")?, "anchor")?;

    system.connect(("drive", "out"), ("force", "in"))?;
    system.connect(("force", "P1"), ("mass", "P1"))?;
    system.connect(("mass", "P2"), ("spring", "P1"))?;
    system.connect(("spring", "P2"), ("anchor", "P1"))?;

    system.set_parameter_value("drive", "y0", 0.0)?;
    system.set_parameter_value("drive", "y1", args.force)?;
    system.set_parameter_value("drive", "t_step", 0.0)?;
    system.set_parameter_value("mass", "m", 10.0)?;
    system.set_parameter_value("mass", "b", 50.0)?;
    system.set_parameter_value("spring", "k", 1000.0)?;

    system.set_desired_timestep(args.timestep);
    system.set_number_of_log_samples(args.samples);

    if !system.initialize(0.0, args.stop_time) {
        for message in system.hub().drain() {
            eprintln!("{message}");
        }
        std::process::exit(1);
    }

    if args.threads > 1 {
        system.simulate_multithreaded(args.stop_time, args.threads, algorithm);
    } else {
        system.simulate(args.stop_time);
    }
    system.finalize();

    let node = system.port_node(("mass", "P2"))?;
    println!("time,velocity,force,position");
    for (row, t) in system.logged_time().iter().enumerate() {
        let v = node.logged_value(row, mechanic::VELOCITY).unwrap_or(f64::NAN);
        let f = node.logged_value(row, mechanic::FORCE).unwrap_or(f64::NAN);
        let x = node.logged_value(row, mechanic::POSITION).unwrap_or(f64::NAN);
        println!("{t},{v},{f},{x}");
    }
    Ok(())
}
