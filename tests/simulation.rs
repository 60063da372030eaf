//! End-to-end simulation tests through the public API.

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use wavesim_core::component::{Component, ComponentBase, CqsType};
use wavesim_core::diagnostics::MessageHub;
use wavesim_core::error::Result;
use wavesim_core::network::{hydraulic, mechanic, NodeDataRef};
use wavesim_core::{ComponentFactory, ComponentSystem, ParallelAlgorithm};

fn factory() -> ComponentFactory {
    ComponentFactory::with_builtin_library()
}

/// A force source driving a damped mass anchored by a zero source.
fn damped_mass_rig(force: f64, damping: f64) -> ComponentSystem {
    let f = factory();
    let mut system = ComponentSystem::new("rig", MessageHub::new());
    system.add_component(f.create("ForceSource").unwrap(), "drive").unwrap();
    system.add_component(f.create("TranslationalMass").unwrap(), "mass").unwrap();
    system.add_component(f.create("ForceSource").unwrap(), "anchor").unwrap();
    system.connect(("drive", "P1"), ("mass", "P1")).unwrap();
    system.connect(("mass", "P2"), ("anchor", "P1")).unwrap();
    system.set_parameter_value("drive", "f", force).unwrap();
    system.set_parameter_value("mass", "b", damping).unwrap();
    system
}

/// A chain of masses and springs between a driving source and an anchor.
fn mass_spring_chain(n_masses: usize) -> ComponentSystem {
    let f = factory();
    let mut system = ComponentSystem::new("chain", MessageHub::new());
    system.add_component(f.create("ForceSource").unwrap(), "drive").unwrap();
    system.set_parameter_value("drive", "f", 20.0).unwrap();
    for i in 0..n_masses {
        let mass = format!("mass{i}");
        system.add_component(f.create("TranslationalMass").unwrap(), &mass).unwrap();
        system.set_parameter_value(&mass, "b", 5.0).unwrap();
        if i == 0 {
            system.connect(("drive", "P1"), (mass.as_str(), "P1")).unwrap();
        } else {
            let spring = format!("spring{i}");
            system.add_component(f.create("TranslationalSpring").unwrap(), &spring).unwrap();
            system.set_parameter_value(&spring, "k", 500.0).unwrap();
            let prev = format!("mass{}", i - 1);
            system.connect((prev.as_str(), "P2"), (spring.as_str(), "P1")).unwrap();
            system.connect((spring.as_str(), "P2"), (mass.as_str(), "P1")).unwrap();
        }
    }
    system.add_component(f.create("ForceSource").unwrap(), "anchor").unwrap();
    let last = format!("mass{}", n_masses - 1);
    system.connect((last.as_str(), "P2"), ("anchor", "P1")).unwrap();
    system
}

#[test]
fn test_unforced_mass_stays_in_equilibrium() {
    // Two sources bracketing one mass, zero forcing everywhere
    let mut system = damped_mass_rig(0.0, 0.0);
    system.set_desired_timestep(1e-3);
    assert!(system.initialize(0.0, 1.0));
    system.simulate(1.0);
    system.finalize();

    let node = system.port_node(("mass", "P2")).unwrap();
    assert!(node.value(mechanic::VELOCITY).abs() < 1e-9);
}

#[test]
fn test_damped_mass_reaches_terminal_velocity() {
    let mut system = damped_mass_rig(10.0, 100.0);
    system.set_desired_timestep(1e-3);
    assert!(system.initialize(0.0, 1.0));
    system.simulate(1.0);
    system.finalize();

    // Steady state: v = F / b
    let node = system.port_node(("mass", "P2")).unwrap();
    assert_relative_eq!(node.value(mechanic::VELOCITY), 0.1, epsilon = 1e-9);
}

#[test]
fn test_orifice_flow_between_pressure_sources() {
    let f = factory();
    let mut system = ComponentSystem::new("hyd", MessageHub::new());
    system.add_component(f.create("PressureSource").unwrap(), "high").unwrap();
    system.add_component(f.create("LaminarOrifice").unwrap(), "orifice").unwrap();
    system.add_component(f.create("PressureSource").unwrap(), "low").unwrap();
    system.connect(("high", "P1"), ("orifice", "P1")).unwrap();
    system.connect(("orifice", "P2"), ("low", "P1")).unwrap();
    system.set_parameter_value("high", "p", 2e5).unwrap();
    system.set_parameter_value("low", "p", 1e5).unwrap();
    system.set_parameter_value("orifice", "Kc", 1e-9).unwrap();

    system.set_desired_timestep(1e-3);
    assert!(system.initialize(0.0, 0.01));
    system.simulate(0.01);
    system.finalize();

    // Zero source impedance: q = Kc * (p_high - p_low)
    let node = system.port_node(("orifice", "P2")).unwrap();
    assert_relative_eq!(node.value(hydraulic::FLOW), 1e-4, epsilon = 1e-12);
    assert_relative_eq!(node.value(hydraulic::PRESSURE), 1e5);
}

/// Q-type probe that stamps the step count into its node each step.
struct StepStamp {
    base: ComponentBase,
    count: f64,
    out: Option<NodeDataRef>,
}

impl StepStamp {
    fn boxed() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("StepStamp", CqsType::Q),
            count: 0.0,
            out: None,
        })
    }
}

impl Component for StepStamp {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }
    fn configure(&mut self) -> Result<()> {
        self.base.add_port("P1", "mechanic", true)?;
        Ok(())
    }
    fn initialize(&mut self, _start: f64, _stop: f64) -> Result<()> {
        self.count = 0.0;
        let port = self.base.port("P1").expect("declared in configure");
        self.out = Some(port.node_data_ref(mechanic::VELOCITY)?);
        Ok(())
    }
    fn simulate_one_timestep(&mut self, _time: f64) {
        self.count += 1.0;
        if let Some(out) = &self.out {
            out.set(self.count);
        }
    }
}

/// C-type probe that records the stamp it observes each step.
struct StampObserver {
    base: ComponentBase,
    seen: Arc<Mutex<Vec<f64>>>,
    input: Option<NodeDataRef>,
}

impl StampObserver {
    fn boxed(seen: Arc<Mutex<Vec<f64>>>) -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("StampObserver", CqsType::C),
            seen,
            input: None,
        })
    }
}

impl Component for StampObserver {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }
    fn configure(&mut self) -> Result<()> {
        self.base.add_port("P1", "mechanic", true)?;
        Ok(())
    }
    fn initialize(&mut self, _start: f64, _stop: f64) -> Result<()> {
        let port = self.base.port("P1").expect("declared in configure");
        self.input = Some(port.node_data_ref(mechanic::VELOCITY)?);
        Ok(())
    }
    fn simulate_one_timestep(&mut self, _time: f64) {
        if let Some(input) = &self.input {
            self.seen.lock().unwrap().push(input.get());
        }
    }
}

#[test]
fn test_c_phase_observes_previous_step_q_writes() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut system = ComponentSystem::new("probe", MessageHub::new());
    system
        .add_component(StampObserver::boxed(seen.clone()), "observer")
        .unwrap();
    system.add_component(StepStamp::boxed(), "stamp").unwrap();
    system.connect(("observer", "P1"), ("stamp", "P1")).unwrap();

    system.set_desired_timestep(1e-3);
    assert!(system.initialize(0.0, 5e-3));
    system.simulate(5e-3);
    system.finalize();

    // The observer runs in the C phase, so at step n it must see the
    // stamp written in step n - 1, never the same-step value.
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_parallel_schedulers_match_sequential() {
    let run = |threads: usize, algorithm: ParallelAlgorithm| {
        let mut system = mass_spring_chain(8);
        system.set_desired_timestep(1e-3);
        assert!(system.initialize(0.0, 0.5));
        if threads > 1 {
            system.simulate_multithreaded(0.5, threads, algorithm);
        } else {
            system.simulate(0.5);
        }
        system.finalize();
        let series: Vec<Vec<u64>> = (0..8)
            .map(|i| {
                let name = format!("mass{i}");
                let node = system.port_node((name.as_str(), "P2")).unwrap();
                node.logged_series(mechanic::VELOCITY)
                    .into_iter()
                    .map(f64::to_bits)
                    .collect()
            })
            .collect();
        (series, system.logged_time().to_vec())
    };

    let (seq, seq_time) = run(1, ParallelAlgorithm::Barrier);
    let (barrier, barrier_time) = run(4, ParallelAlgorithm::Barrier);
    let (pool, pool_time) = run(3, ParallelAlgorithm::TaskPool);

    // Phase freezing makes the step math independent of which thread runs
    // a component, so the results must agree bit for bit.
    assert_eq!(seq, barrier);
    assert_eq!(seq, pool);
    assert_eq!(seq_time, barrier_time);
    assert_eq!(seq_time, pool_time);
}

#[test]
fn test_barrier_completes_across_thread_counts() {
    for threads in 1..=8 {
        let mut system = mass_spring_chain(4);
        system.set_desired_timestep(1e-3);
        assert!(system.initialize(0.0, 0.2));
        system.simulate_multithreaded(0.2, threads, ParallelAlgorithm::Barrier);
        system.finalize();
        assert_relative_eq!(system.time(), 0.2, epsilon = 1e-12);
    }
}

#[test]
fn test_task_pool_completes_across_thread_counts() {
    for threads in 2..=5 {
        let mut system = mass_spring_chain(4);
        system.set_desired_timestep(1e-3);
        assert!(system.initialize(0.0, 0.2));
        system.simulate_multithreaded(0.2, threads, ParallelAlgorithm::TaskPool);
        system.finalize();
        assert_relative_eq!(system.time(), 0.2, epsilon = 1e-12);
    }
}

#[test]
fn test_signal_chain_drives_force_source() {
    let f = factory();
    let mut system = ComponentSystem::new("sig", MessageHub::new());
    system.add_component(f.create("SignalStep").unwrap(), "step").unwrap();
    system.add_component(f.create("SignalGain").unwrap(), "gain").unwrap();
    system.add_component(f.create("ForceSource").unwrap(), "drive").unwrap();
    system.add_component(f.create("TranslationalMass").unwrap(), "mass").unwrap();
    system.add_component(f.create("ForceSource").unwrap(), "anchor").unwrap();

    system.connect(("step", "out"), ("gain", "in")).unwrap();
    system.connect(("gain", "out"), ("drive", "in")).unwrap();
    system.connect(("drive", "P1"), ("mass", "P1")).unwrap();
    system.connect(("mass", "P2"), ("anchor", "P1")).unwrap();

    system.set_parameter_value("step", "y1", 5.0).unwrap();
    system.set_parameter_value("step", "t_step", 0.0).unwrap();
    system.set_parameter_value("gain", "k", 2.0).unwrap();
    system.set_parameter_value("mass", "m", 2.0).unwrap();

    system.set_desired_timestep(1e-3);
    assert!(system.initialize(0.0, 1.0));
    system.simulate(1.0);
    system.finalize();

    // Constant 10 N on a free 2 kg mass for one second
    let node = system.port_node(("mass", "P2")).unwrap();
    assert_relative_eq!(node.value(mechanic::VELOCITY), 5.0, epsilon = 1e-6);
}

#[test]
fn test_subsystem_embeds_as_component() {
    let f = factory();
    let mut inner = ComponentSystem::new("inner", MessageHub::new());
    inner.add_component(f.create("ForceSource").unwrap(), "drive").unwrap();
    inner.add_component(f.create("TranslationalMass").unwrap(), "mass").unwrap();
    inner.add_component(f.create("ForceSource").unwrap(), "anchor").unwrap();
    inner.connect(("drive", "P1"), ("mass", "P1")).unwrap();
    inner.connect(("mass", "P2"), ("anchor", "P1")).unwrap();
    inner.set_parameter_value("drive", "f", 10.0).unwrap();
    inner.set_parameter_value("mass", "b", 100.0).unwrap();
    inner.set_desired_timestep(1e-3);

    let mut outer = ComponentSystem::new("outer", MessageHub::new());
    outer.add_component(Box::new(inner), "child").unwrap();
    outer.set_desired_timestep(1e-3);
    assert!(outer.initialize(0.0, 1.0));
    outer.simulate(1.0);
    outer.finalize();

    assert_relative_eq!(outer.time(), 1.0, epsilon = 1e-12);
}
