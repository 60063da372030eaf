//! Core types for network representation.

use std::fmt;

/// A unique identifier for a port, assigned at port creation and stable for
/// the port's lifetime. Used by nodes as a non-owning back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub usize);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Category of a physical quantity stored in a node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// Plain state variable
    Default,
    /// Intensity (effort) variable: force, pressure, voltage
    Intensity,
    /// Flow variable: velocity, volume flow, current
    Flow,
    /// Wave variable or characteristic impedance of the TLM coupling
    TlmCoupling,
    /// Internal bookkeeping, hidden from export
    Hidden,
}

/// Static metadata for one slot of a node type.
#[derive(Debug, Clone, Copy)]
pub struct NodeDataDescription {
    /// Slot index within the node's data vector
    pub slot: usize,
    /// Quantity name, e.g. "Velocity"
    pub name: &'static str,
    /// Unit string, e.g. "m/s"
    pub unit: &'static str,
    /// Variable category
    pub kind: VariableKind,
}

/// Signal node: one dimensionless value.
pub mod signal {
    pub const VALUE: usize = 0;
}

/// Mechanic (translational) node slots.
pub mod mechanic {
    pub const VELOCITY: usize = 0;
    pub const FORCE: usize = 1;
    pub const POSITION: usize = 2;
    pub const WAVE: usize = 3;
    pub const IMPEDANCE: usize = 4;
}

/// Hydraulic node slots.
pub mod hydraulic {
    pub const FLOW: usize = 0;
    pub const PRESSURE: usize = 1;
    pub const WAVE: usize = 2;
    pub const IMPEDANCE: usize = 3;
}

/// Interned form of a node type name, or `None` if unknown.
pub fn canonical_type_name(type_name: &str) -> Option<&'static str> {
    match type_name {
        "signal" => Some("signal"),
        "mechanic" => Some("mechanic"),
        "hydraulic" => Some("hydraulic"),
        _ => None,
    }
}

/// Slot descriptions for a node type name.
///
/// Returns `None` for unknown type names; the caller turns that into a
/// configuration error.
pub fn node_data_descriptions(type_name: &str) -> Option<&'static [NodeDataDescription]> {
    use VariableKind::*;

    static SIGNAL: [NodeDataDescription; 1] = [NodeDataDescription {
        slot: signal::VALUE,
        name: "Value",
        unit: "-",
        kind: Default,
    }];

    static MECHANIC: [NodeDataDescription; 5] = [
        NodeDataDescription {
            slot: mechanic::VELOCITY,
            name: "Velocity",
            unit: "m/s",
            kind: Flow,
        },
        NodeDataDescription {
            slot: mechanic::FORCE,
            name: "Force",
            unit: "N",
            kind: Intensity,
        },
        NodeDataDescription {
            slot: mechanic::POSITION,
            name: "Position",
            unit: "m",
            kind: Default,
        },
        NodeDataDescription {
            slot: mechanic::WAVE,
            name: "WaveVariable",
            unit: "N",
            kind: TlmCoupling,
        },
        NodeDataDescription {
            slot: mechanic::IMPEDANCE,
            name: "CharImpedance",
            unit: "N s/m",
            kind: TlmCoupling,
        },
    ];

    static HYDRAULIC: [NodeDataDescription; 4] = [
        NodeDataDescription {
            slot: hydraulic::FLOW,
            name: "Flow",
            unit: "m^3/s",
            kind: Flow,
        },
        NodeDataDescription {
            slot: hydraulic::PRESSURE,
            name: "Pressure",
            unit: "Pa",
            kind: Intensity,
        },
        NodeDataDescription {
            slot: hydraulic::WAVE,
            name: "WaveVariable",
            unit: "Pa",
            kind: TlmCoupling,
        },
        NodeDataDescription {
            slot: hydraulic::IMPEDANCE,
            name: "CharImpedance",
            unit: "Pa s/m^3",
            kind: TlmCoupling,
        },
    ];

    match type_name {
        "signal" => Some(&SIGNAL),
        "mechanic" => Some(&MECHANIC),
        "hydraulic" => Some(&HYDRAULIC),
        _ => None,
    }
}
