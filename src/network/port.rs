//! Ports: a component's typed binding to a node.
//!
//! Every [`Port`] is owned by exactly one component (or by a parent
//! [`MultiPort`] as a sub-port) and is bound to exactly one [`Node`] at all
//! times. Before connection that node is a private "start node" holding the
//! component's default values; connecting two ports merges their nodes into
//! one shared node.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::diagnostics::MessageHub;
use crate::error::{Result, WavesimError};

use super::node::{Node, NodeDataRef};
use super::types::PortId;

static NEXT_PORT_ID: AtomicUsize = AtomicUsize::new(0);

fn next_port_id() -> PortId {
    PortId(NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed))
}

/// A component's typed binding to one node.
#[derive(Debug)]
pub struct Port {
    name: String,
    id: PortId,
    node_type: &'static str,
    node: Arc<Node>,
    required: bool,
    hub: Arc<MessageHub>,
}

impl Port {
    /// Create a port bound to a fresh private start node.
    pub fn new(
        name: impl Into<String>,
        node_type: &str,
        required: bool,
        hub: Arc<MessageHub>,
    ) -> Result<Self> {
        let node = Node::new(node_type, hub.clone())?;
        let id = next_port_id();
        node.add_connected_port(id);
        Ok(Self {
            name: name.into(),
            id,
            node_type: node.type_name(),
            node,
            required,
            hub,
        })
    }

    /// Port name within its component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique port id.
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Node type this port binds to.
    pub fn node_type(&self) -> &'static str {
        self.node_type
    }

    /// Whether model validation fails if this port stays unconnected.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether this port shares its node with at least one peer.
    ///
    /// Derived from the node's port back-references, so it stays correct
    /// when a peer detaches and leaves this port alone on the node.
    pub fn is_connected(&self) -> bool {
        self.node.connected_port_count() > 1
    }

    /// The node this port is currently bound to.
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Whether this port and `other` resolve to the same node.
    pub fn shares_node_with(&self, other: &Port) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Unchecked slot read for the per-step hot loop.
    #[inline]
    pub fn read_node(&self, slot: usize) -> f64 {
        self.node.read(slot)
    }

    /// Unchecked slot write for the per-step hot loop.
    #[inline]
    pub fn write_node(&self, slot: usize, value: f64) {
        self.node.write(slot, value);
    }

    /// Bounds-checked slot read (configuration-time use). Returns the NaN
    /// sentinel on out-of-range access.
    pub fn read_node_safe(&self, slot: usize) -> f64 {
        self.node.value(slot)
    }

    /// Bounds-checked slot write (configuration-time use).
    pub fn write_node_safe(&self, slot: usize, value: f64) {
        self.node.set_value(slot, value);
    }

    /// Set a default value on the private start node before connection.
    pub fn set_start_value(&self, slot: usize, value: f64) {
        self.node.set_value(slot, value);
    }

    /// Capture a stable slot handle for use on every step.
    pub fn node_data_ref(&self, slot: usize) -> Result<NodeDataRef> {
        self.node.data_ref(slot)
    }

    /// Rebind this port to a different node, updating back-references.
    /// Used by the owning system when connections merge or break nodes.
    pub(crate) fn rebind(&mut self, node: Arc<Node>) {
        self.node.remove_connected_port(self.id);
        node.add_connected_port(self.id);
        self.node = node;
    }

    /// Detach from the shared node and revert to a fresh private node
    /// seeded from the current values.
    pub(crate) fn detach(&mut self) -> Result<()> {
        let values = self.node.snapshot();
        let fresh = Node::new(self.node_type, self.hub.clone())?;
        for (slot, v) in values.iter().enumerate() {
            fresh.set_value(slot, *v);
        }
        self.rebind(fresh);
        Ok(())
    }
}

/// A dynamic ordered set of sub-ports, one per connected peer.
///
/// Components that accept any number of connections (e.g. a signal sum)
/// declare a multiport; each incoming connection adds one sub-port.
#[derive(Debug)]
pub struct MultiPort {
    name: String,
    node_type: &'static str,
    required: bool,
    subports: Vec<Port>,
    hub: Arc<MessageHub>,
}

impl MultiPort {
    /// Create an empty multiport.
    pub fn new(
        name: impl Into<String>,
        node_type: &str,
        required: bool,
        hub: Arc<MessageHub>,
    ) -> Result<Self> {
        let node_type = super::types::canonical_type_name(node_type).ok_or_else(|| {
            WavesimError::UnknownNodeType {
                type_name: node_type.to_string(),
            }
        })?;
        Ok(Self {
            name: name.into(),
            node_type,
            required,
            subports: Vec::new(),
            hub,
        })
    }

    /// Multiport name within its component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node type of every sub-port.
    pub fn node_type(&self) -> &'static str {
        self.node_type
    }

    /// Whether at least one connection is required.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Number of sub-ports.
    pub fn len(&self) -> usize {
        self.subports.len()
    }

    /// Whether no peers are connected yet.
    pub fn is_empty(&self) -> bool {
        self.subports.is_empty()
    }

    /// Append a fresh sub-port for a new peer and return its index.
    pub fn add_subport(&mut self) -> Result<usize> {
        let idx = self.subports.len();
        let sub = Port::new(
            format!("{}#{}", self.name, idx),
            self.node_type,
            false,
            self.hub.clone(),
        )?;
        self.subports.push(sub);
        Ok(idx)
    }

    /// Remove a sub-port, detaching it from its node first.
    pub fn remove_subport(&mut self, index: usize) -> Result<()> {
        if index < self.subports.len() {
            self.subports[index].detach()?;
            self.subports.remove(index);
        }
        Ok(())
    }

    /// Indexed sub-port access. The index is caller-guaranteed valid; this
    /// is the unchecked fast path for the per-step loop.
    #[inline]
    pub fn subport(&self, index: usize) -> &Port {
        debug_assert!(index < self.subports.len());
        &self.subports[index]
    }

    /// Mutable sub-port access (setup-time use).
    pub(crate) fn subport_mut(&mut self, index: usize) -> &mut Port {
        &mut self.subports[index]
    }

    /// Iterate over sub-ports in connection order.
    pub fn subports(&self) -> impl Iterator<Item = &Port> {
        self.subports.iter()
    }
}

/// A component's port slot: either a single port or a multiport.
#[derive(Debug)]
pub enum AnyPort {
    Single(Port),
    Multi(MultiPort),
}

impl AnyPort {
    /// Port name within its component.
    pub fn name(&self) -> &str {
        match self {
            AnyPort::Single(p) => p.name(),
            AnyPort::Multi(m) => m.name(),
        }
    }

    /// Whether validation requires this port to be connected.
    pub fn is_required(&self) -> bool {
        match self {
            AnyPort::Single(p) => p.is_required(),
            AnyPort::Multi(m) => m.is_required(),
        }
    }

    /// Whether the port has the connections it needs to simulate.
    pub fn is_connected(&self) -> bool {
        match self {
            AnyPort::Single(p) => p.is_connected(),
            AnyPort::Multi(m) => !m.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::signal;

    fn hub() -> Arc<MessageHub> {
        MessageHub::new()
    }

    #[test]
    fn test_port_starts_with_private_node() {
        let port = Port::new("P1", "signal", true, hub()).unwrap();
        assert!(!port.is_connected());
        assert!(port.is_required());
        assert_eq!(port.node().connected_ports(), vec![port.id()]);
    }

    #[test]
    fn test_start_values_survive_until_rebind() {
        let port = Port::new("P1", "signal", false, hub()).unwrap();
        port.set_start_value(signal::VALUE, 42.0);
        assert_eq!(port.read_node_safe(signal::VALUE), 42.0);
    }

    #[test]
    fn test_rebind_moves_back_reference() {
        let h = hub();
        let mut a = Port::new("P1", "mechanic", false, h.clone()).unwrap();
        let b = Port::new("P1", "mechanic", false, h).unwrap();

        let old = Arc::clone(a.node());
        a.rebind(Arc::clone(b.node()));

        assert!(a.shares_node_with(&b));
        assert!(old.connected_ports().is_empty());
        let mut ids = b.node().connected_ports();
        ids.sort();
        let mut expect = vec![a.id(), b.id()];
        expect.sort();
        assert_eq!(ids, expect);
    }

    #[test]
    fn test_detach_keeps_values() {
        let h = hub();
        let mut a = Port::new("P1", "signal", false, h.clone()).unwrap();
        let b = Port::new("P1", "signal", false, h).unwrap();
        a.rebind(Arc::clone(b.node()));
        b.node().set_value(signal::VALUE, 7.0);

        a.detach().unwrap();
        assert!(!a.shares_node_with(&b));
        assert_eq!(a.read_node_safe(signal::VALUE), 7.0);
        // The shared node no longer references the detached port
        assert_eq!(b.node().connected_ports(), vec![b.id()]);
    }

    #[test]
    fn test_peer_detach_leaves_port_unconnected() {
        let h = hub();
        let mut a = Port::new("P1", "signal", false, h.clone()).unwrap();
        let b = Port::new("P1", "signal", false, h).unwrap();
        a.rebind(Arc::clone(b.node()));
        assert!(a.is_connected());
        assert!(b.is_connected());

        a.detach().unwrap();
        assert!(!a.is_connected());
        assert!(!b.is_connected());
    }

    #[test]
    fn test_multiport_grows_and_shrinks() {
        let mut mp = MultiPort::new("in", "signal", false, hub()).unwrap();
        assert!(mp.is_empty());
        let i0 = mp.add_subport().unwrap();
        let i1 = mp.add_subport().unwrap();
        assert_eq!((i0, i1), (0, 1));
        assert_eq!(mp.len(), 2);
        assert_eq!(mp.subport(0).name(), "in#0");

        mp.remove_subport(0).unwrap();
        assert_eq!(mp.len(), 1);
    }
}
