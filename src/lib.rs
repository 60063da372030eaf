//! A discrete fixed-timestep simulation kernel for multi-domain physical
//! networks.
//!
//! Models are graphs of [`Component`](component::Component)s joined through
//! shared [`Node`](network::Node)s. Components carry a CQS classification:
//! Signal components exchange plain values, C components emit a
//! wave-variable/impedance pair describing one side of a transmission line
//! coupling, and Q components consume that pair and solve for the
//! physically consistent flow and effort, by Newton iteration where the
//! dynamics demand it.
//!
//! Every step runs the classes in a strict order (Signal, then C, then Q,
//! then logging) and each class reads only values frozen when its phase
//! began. That one-step lag is what decouples neighboring components and
//! lets the [`scheduler`] module run a phase's components on several
//! threads without locking the node data.
//!
//! ```no_run
//! use wavesim_core::component::ComponentFactory;
//! use wavesim_core::system::ComponentSystem;
//!
//! # fn main() -> wavesim_core::error::Result<()> {
//! let factory = ComponentFactory::with_builtin_library();
//! let mut system = ComponentSystem::with_default_hub("rig");
//! system.add_component(factory.create("ForceSource")?, "f")?;
//! system.add_component(factory.create("TranslationalMass")?, "m")?;
//! system.add_component(factory.create("TranslationalSpring")?, "k")?;
//! system.add_component(factory.create("ForceSource")?, "anchor")?;
//! system.connect(("f", "P1"), ("m", "P1"))?;
//! system.connect(("m", "P2"), ("k", "P1"))?;
//! system.connect(("k", "P2"), ("anchor", "P1"))?;
//! system.set_parameter_value("f", "f", 10.0)?;
//!
//! system.set_desired_timestep(1e-3);
//! if system.initialize(0.0, 1.0) {
//!     system.simulate(1.0);
//! }
//! system.finalize();
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod components;
pub mod diagnostics;
pub mod error;
pub mod network;
pub mod scheduler;
pub mod solver;
pub mod system;

pub use component::{Component, ComponentBase, ComponentFactory, CqsType};
pub use error::{Result, WavesimError};
pub use network::{Node, NodeDataRef, Port};
pub use scheduler::ParallelAlgorithm;
pub use system::ComponentSystem;
