//! Error types for the Wavesim simulation kernel.
//!
//! This module provides a unified error type [`WavesimError`] covering
//! configuration, validation and runtime failures. The taxonomy follows the
//! kernel's propagation policy:
//!
//! - Configuration errors are collected before the first step and abort the
//!   run with an aggregated report.
//! - Numerical problems during a step are *not* errors: they are reported
//!   through the diagnostics channel and handled locally by the component.
//! - Out-of-range slot access on the hot path never interrupts control flow;
//!   it returns a NaN sentinel plus a Fatal diagnostic.

use thiserror::Error;

/// Result type alias using [`WavesimError`].
pub type Result<T> = std::result::Result<T, WavesimError>;

/// Unified error type for all Wavesim operations.
#[derive(Error, Debug)]
pub enum WavesimError {
    // ============ Configuration Errors ============
    /// A connection-required port was left unconnected
    #[error("Port '{port}' on component '{component}' requires a connection")]
    MissingConnection { component: String, port: String },

    /// Parameter value outside its valid range
    #[error("Parameter '{param}' on component '{component}' is out of range: {message}")]
    ParameterOutOfRange {
        component: String,
        param: String,
        message: String,
    },

    /// Parameter name not registered on the component
    #[error("Component '{component}' has no parameter '{param}'")]
    ParameterNotFound { component: String, param: String },

    /// Port name not found on the component
    #[error("Component '{component}' has no port '{port}'")]
    PortNotFound { component: String, port: String },

    /// Component name not found in the system
    #[error("Component '{name}' not found in system")]
    ComponentNotFound { name: String },

    /// Duplicate component name within one system
    #[error("Duplicate component name '{name}'")]
    DuplicateComponent { name: String },

    /// A creator function was already registered for this type name
    #[error("Component type '{type_name}' is already registered")]
    DuplicateRegistration { type_name: String },

    /// No creator function registered for this type name
    #[error("Unknown component type '{type_name}'")]
    UnknownComponentType { type_name: String },

    /// Two ports with incompatible node types were connected
    #[error("Cannot connect port '{port_a}' ({type_a}) to port '{port_b}' ({type_b})")]
    IncompatibleNodeTypes {
        port_a: String,
        type_a: String,
        port_b: String,
        type_b: String,
    },

    /// Unknown node type name
    #[error("Unknown node type '{type_name}'")]
    UnknownNodeType { type_name: String },

    // ============ Lifecycle Errors ============
    /// Invalid simulation parameter (timestep, times, sample counts)
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    /// Model validation failed; the aggregated report lists every failure
    #[error("Model validation failed with {count} error(s)")]
    ValidationFailed { count: usize },

    // ============ Solver Errors ============
    /// Slot id outside the node's fixed layout (initialize-time capture only)
    #[error("Slot {slot} out of range for node type '{node_type}' (length {len})")]
    SlotOutOfRange {
        node_type: String,
        slot: usize,
        len: usize,
    },
}

impl WavesimError {
    /// Create a missing-connection error.
    pub fn missing_connection(component: impl Into<String>, port: impl Into<String>) -> Self {
        Self::MissingConnection {
            component: component.into(),
            port: port.into(),
        }
    }

    /// Create a parameter-out-of-range error.
    pub fn parameter_out_of_range(
        component: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ParameterOutOfRange {
            component: component.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-simulation-parameter error.
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }
}
