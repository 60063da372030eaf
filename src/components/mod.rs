//! Built-in component library.
//!
//! A small set of concrete components spanning the three CQS classes and
//! two physical domains plus the signal domain:
//!
//! - Signal: Constant, Step, Gain, Sum, Sink
//! - Mechanic: ForceSource (C), TranslationalSpring (C), TranslationalMass (Q)
//! - Hydraulic: PressureSource (C), Volume (C), LaminarOrifice (Q)
//!
//! External libraries register additional types through the
//! [`ComponentFactory`](crate::component::ComponentFactory) in the same way
//! [`register_builtin_components`] does.

mod hydraulic;
mod mechanic;
mod signal;

pub use hydraulic::{HydraulicVolume, LaminarOrifice, PressureSource};
pub use mechanic::{ForceSource, TranslationalMass, TranslationalSpring};
pub use signal::{SignalConstant, SignalGain, SignalSink, SignalStep, SignalSum};

use crate::component::ComponentFactory;
use crate::error::Result;

/// Register every built-in component type with the factory.
pub fn register_builtin_components(factory: &mut ComponentFactory) -> Result<()> {
    factory.register_creator("SignalConstant", SignalConstant::create)?;
    factory.register_creator("SignalStep", SignalStep::create)?;
    factory.register_creator("SignalGain", SignalGain::create)?;
    factory.register_creator("SignalSum", SignalSum::create)?;
    factory.register_creator("SignalSink", SignalSink::create)?;
    factory.register_creator("ForceSource", ForceSource::create)?;
    factory.register_creator("TranslationalSpring", TranslationalSpring::create)?;
    factory.register_creator("TranslationalMass", TranslationalMass::create)?;
    factory.register_creator("PressureSource", PressureSource::create)?;
    factory.register_creator("HydraulicVolume", HydraulicVolume::create)?;
    factory.register_creator("LaminarOrifice", LaminarOrifice::create)?;
    Ok(())
}
