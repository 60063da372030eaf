//! Shared state record for one coupling point.
//!
//! A [`Node`] owns a fixed-length vector of physical quantities that every
//! connected component reads and writes during a step. The vector's layout
//! is fixed at construction and never resized, which is what allows
//! components to capture a [`NodeDataRef`] once during `initialize()` and
//! dereference it every step without further checks.
//!
//! # Sharing model
//!
//! Node data is deliberately unguarded: during a step many components read
//! it concurrently, and which component may write which slot is fixed by CQS
//! convention. The scheduler's class gates (Signal → C → Q → Log) serialize
//! writers, so no per-access lock is needed. `Node` is `Sync` on that
//! contract:
//!
//! - topology and log allocation mutate only before stepping begins, on a
//!   single thread;
//! - during a step, a slot has at most one writer, and readers of a slot
//!   written in the same step run in a later CQS class;
//! - a node's log row is written by exactly one worker per log step.

use std::cell::UnsafeCell;
use std::sync::{Arc, Mutex};

use crate::diagnostics::MessageHub;
use crate::error::{Result, WavesimError};

use super::types::{canonical_type_name, node_data_descriptions, NodeDataDescription, PortId};

/// Cold, lock-protected node metadata. Touched only while building or
/// tearing down the model.
#[derive(Debug, Default)]
struct NodeMeta {
    connected_ports: Vec<PortId>,
}

/// Per-run log storage. Rows are preallocated once before the run starts;
/// during the run the log phase only copies values, never allocates.
#[derive(Debug, Default)]
struct NodeLog {
    enabled: bool,
    /// Flat row-major buffer, `capacity_rows * width` values
    rows: Vec<f64>,
    capacity_rows: usize,
    next_row: usize,
}

/// Shared state record holding one coupling point's physical quantities.
pub struct Node {
    type_name: &'static str,
    descriptions: &'static [NodeDataDescription],
    data: Box<[UnsafeCell<f64>]>,
    log: UnsafeCell<NodeLog>,
    meta: Mutex<NodeMeta>,
    hub: Arc<MessageHub>,
}

// SAFETY: all `UnsafeCell` access is serialized by the scheduling contract
// described in the module docs; `Mutex` guards the rest.
unsafe impl Send for Node {}
unsafe impl Sync for Node {}

impl Node {
    /// Create a node of the given type with a zero-filled data vector.
    pub fn new(type_name: &str, hub: Arc<MessageHub>) -> Result<Arc<Self>> {
        let descriptions = node_data_descriptions(type_name).ok_or_else(|| {
            WavesimError::UnknownNodeType {
                type_name: type_name.to_string(),
            }
        })?;
        let data = (0..descriptions.len())
            .map(|_| UnsafeCell::new(0.0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let type_name = canonical_type_name(type_name).expect("catalog lookup already succeeded");
        Ok(Arc::new(Self {
            type_name,
            descriptions,
            data,
            log: UnsafeCell::new(NodeLog::default()),
            meta: Mutex::new(NodeMeta::default()),
            hub,
        }))
    }

    /// Node type name ("signal", "mechanic", ...).
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of data slots.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the node carries no data (never true for catalog types).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Slot descriptions for this node's type.
    pub fn descriptions(&self) -> &'static [NodeDataDescription] {
        self.descriptions
    }

    /// Unchecked slot read for the per-step hot loop.
    ///
    /// The slot index must have been validated when the caller captured it,
    /// normally through [`Node::data_ref`].
    #[inline]
    pub fn read(&self, slot: usize) -> f64 {
        debug_assert!(slot < self.data.len());
        // SAFETY: slot validity guaranteed by the caller; concurrent access
        // serialized by the CQS phase contract.
        unsafe { *self.data[slot].get() }
    }

    /// Unchecked slot write for the per-step hot loop.
    #[inline]
    pub fn write(&self, slot: usize, value: f64) {
        debug_assert!(slot < self.data.len());
        // SAFETY: see `read`.
        unsafe { *self.data[slot].get() = value }
    }

    /// Bounds-checked slot read.
    ///
    /// Out-of-range access is a programming error in a component library:
    /// it returns a NaN sentinel and emits a Fatal diagnostic instead of
    /// interrupting control flow.
    pub fn value(&self, slot: usize) -> f64 {
        if slot < self.data.len() {
            self.read(slot)
        } else {
            self.hub.fatal(
                "SlotOutOfRange",
                format!(
                    "read of slot {slot} on node type '{}' (length {})",
                    self.type_name,
                    self.data.len()
                ),
            );
            f64::NAN
        }
    }

    /// Bounds-checked slot write. Out-of-range writes are dropped with a
    /// Fatal diagnostic.
    pub fn set_value(&self, slot: usize, value: f64) {
        if slot < self.data.len() {
            self.write(slot, value);
        } else {
            self.hub.fatal(
                "SlotOutOfRange",
                format!(
                    "write of slot {slot} on node type '{}' (length {})",
                    self.type_name,
                    self.data.len()
                ),
            );
        }
    }

    /// Capture a stable handle to one slot.
    ///
    /// Components call this once during `initialize()` and use the returned
    /// handle on every step. Validity of the slot is proven here so the hot
    /// path stays unchecked.
    pub fn data_ref(self: &Arc<Self>, slot: usize) -> Result<NodeDataRef> {
        if slot < self.data.len() {
            Ok(NodeDataRef {
                node: Arc::clone(self),
                slot,
            })
        } else {
            Err(WavesimError::SlotOutOfRange {
                node_type: self.type_name.to_string(),
                slot,
                len: self.data.len(),
            })
        }
    }

    /// Register a connected port. Idempotent.
    pub fn add_connected_port(&self, id: PortId) {
        let mut meta = self.meta.lock().expect("node meta poisoned");
        if !meta.connected_ports.contains(&id) {
            meta.connected_ports.push(id);
        }
    }

    /// Deregister a connected port. Idempotent.
    pub fn remove_connected_port(&self, id: PortId) {
        let mut meta = self.meta.lock().expect("node meta poisoned");
        meta.connected_ports.retain(|p| *p != id);
    }

    /// Number of ports currently bound to this node.
    pub fn connected_port_count(&self) -> usize {
        self.meta
            .lock()
            .expect("node meta poisoned")
            .connected_ports
            .len()
    }

    /// Ids of all ports currently bound to this node.
    pub fn connected_ports(&self) -> Vec<PortId> {
        self.meta
            .lock()
            .expect("node meta poisoned")
            .connected_ports
            .clone()
    }

    /// Copy the full data vector out (setup-time use).
    pub fn snapshot(&self) -> Vec<f64> {
        (0..self.data.len()).map(|i| self.read(i)).collect()
    }

    /// Back-fill zero slots from another node's values. Used when two nodes
    /// merge at connection time so explicit start values set on either side
    /// survive.
    pub fn merge_start_values(&self, discarded: &Node) {
        let n = self.data.len().min(discarded.len());
        for slot in 0..n {
            if self.read(slot) == 0.0 {
                self.write(slot, discarded.read(slot));
            }
        }
    }

    // ============ Logging ============

    /// Enable or disable per-step logging for this node.
    pub fn set_log_enabled(&self, enabled: bool) {
        // SAFETY: log configuration happens before stepping, single-threaded.
        let log = unsafe { &mut *self.log.get() };
        log.enabled = enabled;
    }

    /// Whether logging is enabled.
    pub fn log_enabled(&self) -> bool {
        // SAFETY: read-only field toggled outside the stepping phase.
        unsafe { (*self.log.get()).enabled }
    }

    /// Preallocate log space for `rows` samples and reset the row cursor.
    /// Must be called before the run starts; the log phase never allocates.
    pub fn allocate_log_space(&self, rows: usize) {
        // SAFETY: called during initialize, single-threaded.
        let log = unsafe { &mut *self.log.get() };
        log.rows.clear();
        log.rows.resize(rows * self.data.len(), 0.0);
        log.capacity_rows = rows;
        log.next_row = 0;
    }

    /// Copy the current data vector into the next preallocated log row.
    ///
    /// Called from the log phase only; exactly one worker logs a given node
    /// per step. A full buffer drops the sample silently (the run outlived
    /// its sized log window).
    pub fn log_data(&self) {
        // SAFETY: single writer per node during the log phase.
        let log = unsafe { &mut *self.log.get() };
        if !log.enabled || log.next_row >= log.capacity_rows {
            return;
        }
        let width = self.data.len();
        let start = log.next_row * width;
        for slot in 0..width {
            log.rows[start + slot] = self.read(slot);
        }
        log.next_row += 1;
    }

    /// Number of rows logged so far.
    pub fn logged_rows(&self) -> usize {
        // SAFETY: read between runs or after a run completes.
        unsafe { (*self.log.get()).next_row }
    }

    /// Read one logged value. Returns `None` outside the logged range.
    pub fn logged_value(&self, row: usize, slot: usize) -> Option<f64> {
        // SAFETY: read-only access after the run.
        let log = unsafe { &*self.log.get() };
        if row < log.next_row && slot < self.data.len() {
            Some(log.rows[row * self.data.len() + slot])
        } else {
            None
        }
    }

    /// Extract the full time series for one slot.
    pub fn logged_series(&self, slot: usize) -> Vec<f64> {
        (0..self.logged_rows())
            .filter_map(|row| self.logged_value(row, slot))
            .collect()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("type_name", &self.type_name)
            .field("len", &self.data.len())
            .field("data", &self.snapshot())
            .finish()
    }
}

/// A stable handle to one slot of one node.
///
/// Captured once at initialize time, dereferenced every step. Replaces the
/// cached raw data pointer of older kernels: bounds are proven at capture,
/// the `Arc` keeps the node alive.
#[derive(Debug, Clone)]
pub struct NodeDataRef {
    node: Arc<Node>,
    slot: usize,
}

impl NodeDataRef {
    /// Read the slot value.
    #[inline]
    pub fn get(&self) -> f64 {
        self.node.read(self.slot)
    }

    /// Write the slot value.
    #[inline]
    pub fn set(&self, value: f64) {
        self.node.write(self.slot, value);
    }

    /// The node this handle points into.
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// The slot index.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::mechanic;

    fn hub() -> Arc<MessageHub> {
        MessageHub::new()
    }

    #[test]
    fn test_get_after_set_returns_value() {
        let node = Node::new("mechanic", hub()).unwrap();
        for slot in 0..node.len() {
            node.set_value(slot, slot as f64 + 0.5);
        }
        for slot in 0..node.len() {
            assert_eq!(node.value(slot), slot as f64 + 0.5);
        }
    }

    #[test]
    fn test_out_of_range_returns_sentinel() {
        let h = hub();
        let node = Node::new("signal", h.clone()).unwrap();
        let v = node.value(7);
        assert!(v.is_nan());
        // Side-channel message, not an interruption
        let messages = h.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tag, "SlotOutOfRange");
    }

    #[test]
    fn test_unknown_node_type() {
        assert!(Node::new("pneumatic", hub()).is_err());
    }

    #[test]
    fn test_connected_ports_idempotent() {
        let node = Node::new("hydraulic", hub()).unwrap();
        node.add_connected_port(PortId(3));
        node.add_connected_port(PortId(3));
        assert_eq!(node.connected_ports(), vec![PortId(3)]);
        node.remove_connected_port(PortId(3));
        node.remove_connected_port(PortId(3));
        assert!(node.connected_ports().is_empty());
    }

    #[test]
    fn test_data_ref_roundtrip() {
        let node = Node::new("mechanic", hub()).unwrap();
        let vel = node.data_ref(mechanic::VELOCITY).unwrap();
        vel.set(2.25);
        assert_eq!(vel.get(), 2.25);
        assert_eq!(node.value(mechanic::VELOCITY), 2.25);
        assert!(node.data_ref(99).is_err());
    }

    #[test]
    fn test_log_rows() {
        let node = Node::new("signal", hub()).unwrap();
        node.set_log_enabled(true);
        node.allocate_log_space(3);

        for step in 0..5 {
            node.set_value(0, step as f64);
            node.log_data();
        }

        // Capacity is 3; later samples are dropped
        assert_eq!(node.logged_rows(), 3);
        assert_eq!(node.logged_series(0), vec![0.0, 1.0, 2.0]);
        assert_eq!(node.logged_value(3, 0), None);
    }

    #[test]
    fn test_merge_start_values() {
        let a = Node::new("mechanic", hub()).unwrap();
        let b = Node::new("mechanic", hub()).unwrap();
        a.set_value(mechanic::FORCE, 10.0);
        b.set_value(mechanic::FORCE, 99.0);
        b.set_value(mechanic::POSITION, 1.5);
        a.merge_start_values(&b);
        // Non-zero survivor slots win, zero slots back-fill
        assert_eq!(a.value(mechanic::FORCE), 10.0);
        assert_eq!(a.value(mechanic::POSITION), 1.5);
    }
}
