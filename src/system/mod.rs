//! The component system: container, connection engine and sequential
//! scheduler.
//!
//! A [`ComponentSystem`] owns its child components and the nodes formed by
//! their connections. It maintains one execution list per CQS class,
//! rebuilt whenever the topology changes, and drives the strict
//! Signal → C → Q → Log order every step. It also exposes the simulation
//! driver API: `initialize`/`simulate`/`finalize` plus timestep and log
//! sample control.
//!
//! A `ComponentSystem` is itself a [`Component`], so a system can be
//! embedded in another system as a subsystem running one nested sequential
//! step per outer step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::component::{Component, ComponentBase, CqsType, LifecycleState};
use crate::diagnostics::MessageHub;
use crate::error::{Result, WavesimError};
use crate::network::{AnyPort, Node, Port};
use crate::scheduler::{self, ParallelAlgorithm};

/// Default number of log samples per run.
pub const DEFAULT_LOG_SAMPLES: usize = 2048;

/// Identifies one connectable port: component name, port name.
pub type PortRef<'a> = (&'a str, &'a str);

/// Ordered container of components and the nodes they share.
pub struct ComponentSystem {
    base: ComponentBase,
    components: Vec<Box<dyn Component>>,
    /// Execution lists per CQS class (indices into `components`),
    /// rebuilt on topology change. Insertion order within a class is
    /// stable but carries no other meaning.
    signal_list: Vec<usize>,
    c_list: Vec<usize>,
    q_list: Vec<usize>,
    /// Unique nodes reachable from any port, collected at initialize
    nodes: Vec<Arc<Node>>,
    time: f64,
    stop_time: f64,
    step_counter: usize,
    log_interval: usize,
    desired_log_samples: usize,
    time_log: Vec<f64>,
    abort_flag: Arc<AtomicBool>,
}

impl ComponentSystem {
    /// Create a system reporting to the given diagnostics hub.
    pub fn new(name: impl Into<String>, hub: Arc<MessageHub>) -> Self {
        let mut base = ComponentBase::new("ComponentSystem", CqsType::Signal);
        base.set_name(name);
        base.set_hub(hub);
        Self {
            base,
            components: Vec::new(),
            signal_list: Vec::new(),
            c_list: Vec::new(),
            q_list: Vec::new(),
            nodes: Vec::new(),
            time: 0.0,
            stop_time: 0.0,
            step_counter: 0,
            log_interval: 1,
            desired_log_samples: DEFAULT_LOG_SAMPLES,
            time_log: Vec::new(),
            abort_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a system reporting to the process-wide default hub.
    pub fn with_default_hub(name: impl Into<String>) -> Self {
        Self::new(name, crate::diagnostics::default_hub())
    }

    /// Diagnostics hub this system reports to.
    pub fn hub(&self) -> &Arc<MessageHub> {
        self.base.hub()
    }

    // ============ Topology ============

    /// Add a component under a unique instance name.
    ///
    /// The component is configured here (Created → Configured) and adopts
    /// this system's diagnostics hub and timestep.
    pub fn add_component(
        &mut self,
        mut component: Box<dyn Component>,
        name: &str,
    ) -> Result<()> {
        if self.components.iter().any(|c| c.name() == name) {
            return Err(WavesimError::DuplicateComponent {
                name: name.to_string(),
            });
        }
        let base = component.base_mut();
        base.set_name(name);
        base.set_hub(self.base.hub().clone());
        base.set_timestep(self.base.timestep());
        component.configure()?;
        component.base_mut().set_state(LifecycleState::Configured);
        self.components.push(component);
        self.rebuild_execution_lists();
        Ok(())
    }

    /// Remove a component by name, detaching all its ports first.
    pub fn remove_component(&mut self, name: &str) -> Result<Box<dyn Component>> {
        let idx = self.component_index(name)?;
        {
            let ports = self.components[idx].base_mut().ports_mut();
            for slot in ports.iter_mut() {
                match slot {
                    AnyPort::Single(p) => p.detach()?,
                    AnyPort::Multi(m) => {
                        while !m.is_empty() {
                            m.remove_subport(0)?;
                        }
                    }
                }
            }
        }
        let component = self.components.remove(idx);
        self.rebuild_execution_lists();
        Ok(component)
    }

    /// Look up a component by name.
    pub fn component(&self, name: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .find(|c| c.name() == name)
            .map(AsRef::as_ref)
    }

    /// Mutable component lookup.
    pub fn component_mut(&mut self, name: &str) -> Option<&mut Box<dyn Component>> {
        self.components.iter_mut().find(|c| c.name() == name)
    }

    /// Number of child components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Set a parameter on a named component.
    pub fn set_parameter_value(&mut self, component: &str, param: &str, value: f64) -> Result<()> {
        let idx = self.component_index(component)?;
        self.components[idx].base_mut().set_parameter_value(param, value)
    }

    fn component_index(&self, name: &str) -> Result<usize> {
        self.components
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| WavesimError::ComponentNotFound {
                name: name.to_string(),
            })
    }

    fn rebuild_execution_lists(&mut self) {
        self.signal_list.clear();
        self.c_list.clear();
        self.q_list.clear();
        for (idx, component) in self.components.iter().enumerate() {
            // Partition by CQS tag, never by concrete type
            match component.cqs_type() {
                CqsType::Signal => self.signal_list.push(idx),
                CqsType::C => self.c_list.push(idx),
                CqsType::Q => self.q_list.push(idx),
            }
        }
    }

    // ============ Connections ============

    /// Connect two ports, merging their nodes into one.
    ///
    /// When one side belongs to a C-type component and the other to a
    /// Q-type, the C side's node survives (source components seed the
    /// coupling start values); otherwise the first side's node survives.
    /// Zero-valued slots of the survivor are back-filled from the discarded
    /// node. Connecting to a multiport adds a fresh sub-port for this peer;
    /// the node-type check runs first, so a failed connect adds nothing.
    pub fn connect(&mut self, a: PortRef<'_>, b: PortRef<'_>) -> Result<()> {
        let ia = self.component_index(a.0)?;
        let ib = self.component_index(b.0)?;

        let type_a = self.port_type(ia, a.1)?;
        let type_b = self.port_type(ib, b.1)?;
        if type_a != type_b {
            return Err(WavesimError::IncompatibleNodeTypes {
                port_a: format!("{}.{}", a.0, a.1),
                type_a: type_a.to_string(),
                port_b: format!("{}.{}", b.0, b.1),
                type_b: type_b.to_string(),
            });
        }

        let sub_a = self.ensure_subport(ia, a.1)?;
        let sub_b = self.ensure_subport(ib, b.1)?;

        let node_a = Arc::clone(self.port_entry(ia, a.1, sub_a)?.node());
        let node_b = Arc::clone(self.port_entry(ib, b.1, sub_b)?.node());

        let cqs_a = self.components[ia].cqs_type();
        let cqs_b = self.components[ib].cqs_type();
        let (survivor, discarded) = if cqs_b == CqsType::C && cqs_a == CqsType::Q {
            (node_b, node_a)
        } else {
            (node_a, node_b)
        };

        survivor.merge_start_values(&discarded);

        // Rebind every port in the system bound to the discarded node.
        // Chained connections mean it may be more than just `b`.
        for component in &mut self.components {
            for slot in component.base_mut().ports_mut() {
                match slot {
                    AnyPort::Single(p) => {
                        if Arc::ptr_eq(p.node(), &discarded) {
                            p.rebind(Arc::clone(&survivor));
                        }
                    }
                    AnyPort::Multi(m) => {
                        for i in 0..m.len() {
                            let sub = m.subport_mut(i);
                            if Arc::ptr_eq(sub.node(), &discarded) {
                                sub.rebind(Arc::clone(&survivor));
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Disconnect a port, reverting it to a fresh private node seeded from
    /// the current values.
    pub fn disconnect(&mut self, port: PortRef<'_>) -> Result<()> {
        let idx = self.component_index(port.0)?;
        self.port_entry_mut(idx, port.1, None)?.detach()
    }

    /// Resolve the node a port is currently bound to.
    pub fn port_node(&self, port: PortRef<'_>) -> Result<Arc<Node>> {
        let idx = self.component_index(port.0)?;
        Ok(Arc::clone(self.port_entry(idx, port.1, None)?.node()))
    }

    /// Node type of the named port or multiport.
    fn port_type(&self, comp_idx: usize, port_name: &str) -> Result<&'static str> {
        let base = self.components[comp_idx].base();
        if let Some(port) = base.port(port_name) {
            Ok(port.node_type())
        } else if let Some(multiport) = base.multiport(port_name) {
            Ok(multiport.node_type())
        } else {
            Err(WavesimError::PortNotFound {
                component: base.name().to_string(),
                port: port_name.to_string(),
            })
        }
    }

    /// If the named port is a multiport, add a sub-port and return its
    /// index; single ports connect directly.
    fn ensure_subport(&mut self, comp_idx: usize, port_name: &str) -> Result<Option<usize>> {
        let base = self.components[comp_idx].base_mut();
        if let Some(multiport) = base.multiport_mut(port_name) {
            Ok(Some(multiport.add_subport()?))
        } else {
            Ok(None)
        }
    }

    fn port_entry(&self, comp_idx: usize, port_name: &str, sub: Option<usize>) -> Result<&Port> {
        let base = self.components[comp_idx].base();
        let component = base.name().to_string();
        match sub {
            None => base.port(port_name).ok_or(WavesimError::PortNotFound {
                component,
                port: port_name.to_string(),
            }),
            Some(i) => base
                .multiport(port_name)
                .map(|m| m.subport(i))
                .ok_or(WavesimError::PortNotFound {
                    component,
                    port: port_name.to_string(),
                }),
        }
    }

    fn port_entry_mut(
        &mut self,
        comp_idx: usize,
        port_name: &str,
        sub: Option<usize>,
    ) -> Result<&mut Port> {
        let base = self.components[comp_idx].base_mut();
        let component = base.name().to_string();
        match sub {
            None => base.port_mut(port_name).ok_or(WavesimError::PortNotFound {
                component,
                port: port_name.to_string(),
            }),
            Some(i) => base
                .multiport_mut(port_name)
                .map(|m| m.subport_mut(i))
                .ok_or(WavesimError::PortNotFound {
                    component,
                    port: port_name.to_string(),
                }),
        }
    }

    // ============ Validation ============

    /// Collect every model problem that would make a run invalid.
    pub fn validate(&self) -> Vec<WavesimError> {
        let mut failures = Vec::new();
        if self.base.timestep() <= 0.0 {
            failures.push(WavesimError::invalid_param(format!(
                "timestep must be positive, got {}",
                self.base.timestep()
            )));
        }
        for component in &self.components {
            for slot in component.base().ports() {
                if slot.is_required() && !slot.is_connected() {
                    failures.push(WavesimError::missing_connection(
                        component.name(),
                        slot.name(),
                    ));
                }
            }
        }
        failures
    }

    /// Validate the model, reporting every failure (not just the first)
    /// through the diagnostics channel. Returns false if the model must not
    /// be simulated.
    pub fn check_model_before_simulation(&self) -> bool {
        let failures = self.validate();
        if failures.is_empty() {
            return true;
        }
        for failure in &failures {
            self.base.hub().error("Validation", failure.to_string());
        }
        self.base.hub().error(
            "Validation",
            format!(
                "model '{}' failed validation with {} error(s)",
                self.base.name(),
                failures.len()
            ),
        );
        false
    }

    // ============ Driver API ============

    /// Desired simulation timestep.
    pub fn set_desired_timestep(&mut self, dt: f64) {
        self.base.set_timestep(dt);
        for component in &mut self.components {
            component.base_mut().set_timestep(dt);
        }
    }

    /// Current simulation timestep.
    pub fn timestep(&self) -> f64 {
        self.base.timestep()
    }

    /// Request a number of log samples for the next run.
    pub fn set_number_of_log_samples(&mut self, samples: usize) {
        self.desired_log_samples = samples.max(1);
    }

    /// Requested log samples per run.
    pub fn number_of_log_samples(&self) -> usize {
        self.desired_log_samples
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The logged time vector for the current run.
    pub fn logged_time(&self) -> &[f64] {
        &self.time_log
    }

    /// Unique nodes reachable from any port (valid after initialize).
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Request a cooperative stop. Workers check the flag between steps;
    /// the remainder of the run is skipped but finalize still runs.
    pub fn stop_simulation(&self) {
        self.abort_flag.store(true, Ordering::Release);
    }

    /// Whether the current run was aborted.
    pub fn was_aborted(&self) -> bool {
        self.abort_flag.load(Ordering::Acquire)
    }

    /// Validate the model and initialize every component for a run from
    /// `start_time` to `stop_time`.
    ///
    /// Returns false when the model failed validation or any component
    /// failed to initialize; the diagnostics channel carries one aggregated
    /// report listing every failure, and the caller must not simulate.
    pub fn initialize(&mut self, start_time: f64, stop_time: f64) -> bool {
        if !self.check_model_before_simulation() {
            return false;
        }
        if stop_time < start_time {
            self.base.hub().error(
                "Validation",
                format!("stop time {stop_time} precedes start time {start_time}"),
            );
            return false;
        }

        self.time = start_time;
        self.stop_time = stop_time;
        self.step_counter = 0;
        self.abort_flag.store(false, Ordering::Release);
        self.rebuild_execution_lists();
        self.collect_nodes();

        // Size the log once; the log phase never allocates
        let dt = self.base.timestep();
        let total_steps = ((stop_time - start_time) / dt).round() as usize;
        self.log_interval = (total_steps / self.desired_log_samples).max(1);
        let rows = total_steps / self.log_interval + 2;
        for node in &self.nodes {
            node.set_log_enabled(true);
            node.allocate_log_space(rows);
        }
        self.time_log.clear();
        self.time_log.reserve(rows);

        let mut failed = 0usize;
        for component in &mut self.components {
            match component.initialize(start_time, stop_time) {
                Ok(()) => component.base_mut().set_state(LifecycleState::Initialized),
                Err(err) => {
                    failed += 1;
                    self.base.hub().error(
                        "Initialize",
                        format!("component '{}': {}", component.name(), err),
                    );
                }
            }
        }
        if failed > 0 {
            self.base.hub().error(
                "Initialize",
                format!(
                    "{} component(s) failed to initialize in system '{}'",
                    failed,
                    self.base.name()
                ),
            );
            return false;
        }

        // Row zero: the initial state at start time
        self.log_all_nodes();
        self.time_log.push(self.time);
        true
    }

    fn collect_nodes(&mut self) {
        let mut found: Vec<Arc<Node>> = Vec::new();
        for component in &self.components {
            for slot in component.base().ports() {
                match slot {
                    AnyPort::Single(p) => found.push(Arc::clone(p.node())),
                    AnyPort::Multi(m) => {
                        found.extend(m.subports().map(|sub| Arc::clone(sub.node())));
                    }
                }
            }
        }
        self.nodes.clear();
        for node in found {
            self.push_unique_node(node);
        }
    }

    fn push_unique_node(&mut self, node: Arc<Node>) {
        if !self.nodes.iter().any(|n| Arc::ptr_eq(n, &node)) {
            self.nodes.push(node);
        }
    }

    fn log_all_nodes(&self) {
        for node in &self.nodes {
            node.log_data();
        }
    }

    /// Run one full step: advance time, Signal list, C list, Q list, then
    /// log if the step hits the log stride.
    pub(crate) fn step_once(&mut self) {
        self.time += self.base.timestep();
        let time = self.time;

        // The lists are clones so the component vector can be borrowed
        // mutably; rebuilds only happen on topology change, never mid-run.
        let signal = self.signal_list.clone();
        let c = self.c_list.clone();
        let q = self.q_list.clone();

        for &i in &signal {
            self.components[i].simulate_one_timestep(time);
        }
        for &i in &c {
            self.components[i].simulate_one_timestep(time);
        }
        for &i in &q {
            self.components[i].simulate_one_timestep(time);
        }

        self.step_counter += 1;
        if self.step_counter % self.log_interval == 0 {
            self.log_all_nodes();
        }
    }

    pub(crate) fn record_step_time(&mut self) {
        if self.step_counter % self.log_interval == 0 {
            self.time_log.push(self.time);
        }
    }

    /// Simulate sequentially until `stop_time`.
    pub fn simulate(&mut self, stop_time: f64) {
        let dt = self.base.timestep();
        for component in &mut self.components {
            component.base_mut().set_state(LifecycleState::Stepping);
        }
        while self.time + dt * 0.5 < stop_time {
            if self.abort_flag.load(Ordering::Acquire) {
                self.base.hub().info(
                    "Abort",
                    format!("simulation stopped at t = {:.6}", self.time),
                );
                break;
            }
            self.step_once();
            self.record_step_time();
        }
    }

    /// Simulate until `stop_time` with `n_threads` workers.
    ///
    /// Falls back to the sequential path for one thread or trivially small
    /// systems. Both algorithms preserve the Signal → C → Q → Log order.
    pub fn simulate_multithreaded(
        &mut self,
        stop_time: f64,
        n_threads: usize,
        algorithm: ParallelAlgorithm,
    ) {
        if n_threads <= 1 || self.components.len() < 2 {
            self.simulate(stop_time);
            return;
        }
        for component in &mut self.components {
            component.base_mut().set_state(LifecycleState::Stepping);
        }
        match algorithm {
            ParallelAlgorithm::Barrier => scheduler::simulate_barrier(self, stop_time, n_threads),
            ParallelAlgorithm::TaskPool => {
                scheduler::simulate_task_pool(self, stop_time, n_threads)
            }
        }
    }

    /// Finalize every component. Always safe to call, also after an abort.
    pub fn finalize(&mut self) {
        for component in &mut self.components {
            component.finalize();
            component.base_mut().set_state(LifecycleState::Finalized);
        }
    }

    // ============ Scheduler access ============

    pub(crate) fn execution_lists(&self) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        (
            self.signal_list.clone(),
            self.c_list.clone(),
            self.q_list.clone(),
        )
    }

    pub(crate) fn components_mut(&mut self) -> &mut [Box<dyn Component>] {
        &mut self.components
    }

    pub(crate) fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort_flag)
    }

    pub(crate) fn log_interval(&self) -> usize {
        self.log_interval
    }

    pub(crate) fn step_counter(&self) -> usize {
        self.step_counter
    }

    /// Commit the bookkeeping for `steps_run` steps executed by a parallel
    /// scheduler: time, step counter and the logged time vector.
    pub(crate) fn commit_parallel_steps(&mut self, steps_run: usize) {
        let dt = self.base.timestep();
        for _ in 0..steps_run {
            self.time += dt;
            self.step_counter += 1;
            if self.step_counter % self.log_interval == 0 {
                self.time_log.push(self.time);
            }
        }
    }
}

impl Component for ComponentSystem {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        Ok(())
    }

    fn initialize(&mut self, start_time: f64, stop_time: f64) -> Result<()> {
        if ComponentSystem::initialize(self, start_time, stop_time) {
            Ok(())
        } else {
            Err(WavesimError::ValidationFailed {
                count: self.validate().len(),
            })
        }
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        // One nested sequential step per outer step
        self.step_once();
        self.record_step_time();
    }

    fn finalize(&mut self) {
        ComponentSystem::finalize(self);
    }
}
