//! The schedulable unit: components, their lifecycle and their ports.
//!
//! A component is classified by its [`CqsType`] tag, which fixes both its
//! data-flow direction and its place in the step order:
//!
//! - **Signal** components run first and exchange plain signal values.
//! - **C** (causal source) components produce a wave-variable/impedance
//!   pair describing one side of a coupling.
//! - **Q** (causal load) components consume that pair and solve for the
//!   physically consistent flow and effort.
//!
//! Within one class the execution order carries no meaning: every component
//! reads only values frozen at the start of its class phase, which is what
//! makes same-class peers safe to run in parallel.

mod factory;

pub use factory::{ComponentFactory, CreatorFn};

use std::fmt;
use std::sync::Arc;

use crate::diagnostics::{default_hub, MessageHub};
use crate::error::{Result, WavesimError};
use crate::network::{AnyPort, MultiPort, Port};

/// CQS classification of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CqsType {
    /// Signal-flow component, runs first each step
    Signal,
    /// Causal source: writes wave variable and characteristic impedance
    C,
    /// Causal load: reads the coupling pair and solves for flow/effort
    Q,
}

impl fmt::Display for CqsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqsType::Signal => f.write_str("Signal"),
            CqsType::C => f.write_str("C"),
            CqsType::Q => f.write_str("Q"),
        }
    }
}

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Configured,
    Initialized,
    Stepping,
    Finalized,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Created => "Created",
            LifecycleState::Configured => "Configured",
            LifecycleState::Initialized => "Initialized",
            LifecycleState::Stepping => "Stepping",
            LifecycleState::Finalized => "Finalized",
        };
        f.write_str(s)
    }
}

/// A named numeric parameter with presentation metadata.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub description: String,
}

/// Shared bookkeeping embedded in every component.
///
/// Concrete components own a `ComponentBase` and expose it through
/// [`Component::base`]; the system drives lifecycle transitions and port
/// wiring through it.
#[derive(Debug)]
pub struct ComponentBase {
    name: String,
    type_name: String,
    cqs: CqsType,
    state: LifecycleState,
    timestep: f64,
    ports: Vec<AnyPort>,
    parameters: Vec<Parameter>,
    hub: Arc<MessageHub>,
}

impl ComponentBase {
    /// Create a base for a component of the given type and CQS class.
    ///
    /// Uses the process-wide diagnostics hub until the owning system
    /// injects its own.
    pub fn new(type_name: impl Into<String>, cqs: CqsType) -> Self {
        let type_name = type_name.into();
        Self {
            name: type_name.clone(),
            type_name,
            cqs,
            state: LifecycleState::Created,
            timestep: 1e-3,
            ports: Vec::new(),
            parameters: Vec::new(),
            hub: default_hub(),
        }
    }

    /// Instance name (unique within the owning system).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the instance name. Called by the owning system.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Component type name as registered with the factory.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// CQS classification.
    pub fn cqs_type(&self) -> CqsType {
        self.cqs
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Advance the lifecycle state. Called by the owning system.
    pub fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    /// Simulation timestep this component runs at.
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// Set the timestep. Called by the owning system before initialize.
    pub fn set_timestep(&mut self, dt: f64) {
        self.timestep = dt;
    }

    /// Diagnostics sink.
    pub fn hub(&self) -> &Arc<MessageHub> {
        &self.hub
    }

    /// Replace the diagnostics sink. Called by the owning system when the
    /// component is added.
    pub fn set_hub(&mut self, hub: Arc<MessageHub>) {
        self.hub = hub;
    }

    // ============ Ports ============

    /// Declare a single port. Re-declaring an existing name replaces the
    /// port, keeping `configure()` idempotent.
    pub fn add_port(&mut self, name: &str, node_type: &str, required: bool) -> Result<()> {
        let port = Port::new(name, node_type, required, self.hub.clone())?;
        if let Some(slot) = self.ports.iter_mut().find(|p| p.name() == name) {
            *slot = AnyPort::Single(port);
        } else {
            self.ports.push(AnyPort::Single(port));
        }
        Ok(())
    }

    /// Declare a multiport. Idempotent like [`add_port`](Self::add_port).
    pub fn add_multiport(&mut self, name: &str, node_type: &str, required: bool) -> Result<()> {
        let port = MultiPort::new(name, node_type, required, self.hub.clone())?;
        if let Some(slot) = self.ports.iter_mut().find(|p| p.name() == name) {
            *slot = AnyPort::Multi(port);
        } else {
            self.ports.push(AnyPort::Multi(port));
        }
        Ok(())
    }

    /// Look up a single port by name.
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find_map(|p| match p {
            AnyPort::Single(port) if port.name() == name => Some(port),
            _ => None,
        })
    }

    /// Mutable single-port lookup.
    pub fn port_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.ports.iter_mut().find_map(|p| match p {
            AnyPort::Single(port) if port.name() == name => Some(port),
            _ => None,
        })
    }

    /// Look up a multiport by name.
    pub fn multiport(&self, name: &str) -> Option<&MultiPort> {
        self.ports.iter().find_map(|p| match p {
            AnyPort::Multi(port) if port.name() == name => Some(port),
            _ => None,
        })
    }

    /// Mutable multiport lookup.
    pub fn multiport_mut(&mut self, name: &str) -> Option<&mut MultiPort> {
        self.ports.iter_mut().find_map(|p| match p {
            AnyPort::Multi(port) if port.name() == name => Some(port),
            _ => None,
        })
    }

    /// All port slots in declaration order.
    pub fn ports(&self) -> &[AnyPort] {
        &self.ports
    }

    /// Mutable access for the owning system's connection machinery.
    pub(crate) fn ports_mut(&mut self) -> &mut [AnyPort] {
        &mut self.ports
    }

    // ============ Parameters ============

    /// Register a parameter with its default value. Re-registering a name
    /// replaces the record (idempotent configure).
    pub fn register_parameter(
        &mut self,
        name: &str,
        value: f64,
        unit: &str,
        description: &str,
    ) {
        let record = Parameter {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            description: description.to_string(),
        };
        if let Some(existing) = self.parameters.iter_mut().find(|p| p.name == name) {
            *existing = record;
        } else {
            self.parameters.push(record);
        }
    }

    /// Set a parameter value by name.
    pub fn set_parameter_value(&mut self, name: &str, value: f64) -> Result<()> {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(p) => {
                p.value = value;
                Ok(())
            }
            None => Err(WavesimError::ParameterNotFound {
                component: self.name.clone(),
                param: name.to_string(),
            }),
        }
    }

    /// Read a parameter value by name.
    pub fn parameter_value(&self, name: &str) -> Result<f64> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value)
            .ok_or_else(|| WavesimError::ParameterNotFound {
                component: self.name.clone(),
                param: name.to_string(),
            })
    }

    /// All registered parameters.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
}

/// The schedulable unit of a simulation.
///
/// Lifecycle: Created → Configured → Initialized → Stepping* → Finalized.
/// `configure` declares ports and parameters and must be idempotent;
/// `initialize` captures node-data handles and seeds start values;
/// `simulate_one_timestep` runs once per global step in CQS order, reading
/// only at the top and writing only at the bottom; `finalize` releases
/// owned resources.
pub trait Component: Send {
    /// Shared bookkeeping.
    fn base(&self) -> &ComponentBase;

    /// Mutable shared bookkeeping.
    fn base_mut(&mut self) -> &mut ComponentBase;

    /// Declare ports and parameters. Re-entrant and idempotent.
    fn configure(&mut self) -> Result<()>;

    /// Capture node-data handles and seed consistent start values.
    fn initialize(&mut self, start_time: f64, stop_time: f64) -> Result<()>;

    /// Advance one timestep. `time` is the step's end time.
    fn simulate_one_timestep(&mut self, time: f64);

    /// Release owned (not borrowed) resources.
    fn finalize(&mut self) {}

    /// Instance name.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Type name as registered with the factory.
    fn type_name(&self) -> &str {
        self.base().type_name()
    }

    /// CQS classification.
    fn cqs_type(&self) -> CqsType {
        self.base().cqs_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        base: ComponentBase,
    }

    impl Component for Probe {
        fn base(&self) -> &ComponentBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }
        fn configure(&mut self) -> Result<()> {
            self.base.add_port("P1", "signal", false)?;
            self.base.register_parameter("k", 1.0, "-", "gain");
            Ok(())
        }
        fn initialize(&mut self, _start: f64, _stop: f64) -> Result<()> {
            Ok(())
        }
        fn simulate_one_timestep(&mut self, _time: f64) {}
    }

    #[test]
    fn test_configure_is_idempotent() {
        let mut c = Probe {
            base: ComponentBase::new("Probe", CqsType::Signal),
        };
        c.configure().unwrap();
        c.configure().unwrap();
        assert_eq!(c.base().ports().len(), 1);
        assert_eq!(c.base().parameters().len(), 1);
    }

    #[test]
    fn test_parameter_roundtrip() {
        let mut c = Probe {
            base: ComponentBase::new("Probe", CqsType::Signal),
        };
        c.configure().unwrap();
        assert_eq!(c.base().parameter_value("k").unwrap(), 1.0);
        c.base_mut().set_parameter_value("k", 2.5).unwrap();
        assert_eq!(c.base().parameter_value("k").unwrap(), 2.5);
        assert!(c.base_mut().set_parameter_value("missing", 0.0).is_err());
    }

    #[test]
    fn test_port_lookup_by_kind() {
        let mut base = ComponentBase::new("T", CqsType::Q);
        base.add_port("P1", "mechanic", true).unwrap();
        base.add_multiport("in", "signal", false).unwrap();
        assert!(base.port("P1").is_some());
        assert!(base.multiport("in").is_some());
        assert!(base.port("in").is_none());
        assert!(base.multiport("P1").is_none());
    }
}
