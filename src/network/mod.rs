//! Network data model: nodes, ports and their static type catalog.

mod node;
mod port;
mod types;

pub use node::{Node, NodeDataRef};
pub use port::{AnyPort, MultiPort, Port};
pub use types::{
    canonical_type_name, hydraulic, mechanic, node_data_descriptions, signal, NodeDataDescription,
    PortId, VariableKind,
};
