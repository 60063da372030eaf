//! Multithreaded step schedulers.
//!
//! Both schedulers preserve the sequential semantics exactly: all Signal
//! components finish before any C component starts, all C before any Q,
//! and logging happens only after the Q phase is complete. Within one
//! phase components read values frozen at the phase boundary, so running
//! same-phase components on different threads needs no locking on the
//! node data itself.
//!
//! [`ParallelAlgorithm::Barrier`] gives every thread a fixed shard of each
//! phase and synchronizes with busy-wait gates; it has the lowest per-step
//! overhead when the shards are balanced. [`ParallelAlgorithm::TaskPool`]
//! lets threads claim components one at a time from a shared pool, which
//! balances uneven workloads at the cost of one atomic claim per component.

mod barrier;
mod taskpool;

pub use barrier::BarrierLock;
pub use taskpool::TaskPool;

pub(crate) use barrier::simulate_barrier;
pub(crate) use taskpool::simulate_task_pool;

use crate::component::Component;

/// Which multithreaded scheduler to use for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelAlgorithm {
    /// Fixed shards with busy-wait phase gates
    #[default]
    Barrier,
    /// Dynamic load balancing through a shared task pool
    TaskPool,
}

/// Raw handle to a component owned by the system, handed to worker
/// threads for the duration of one run.
///
/// The pointee is a heap allocation behind a `Box` in the system's
/// component vector, so the address is stable while the vector is
/// mutably borrowed for the run.
#[derive(Clone, Copy)]
pub(crate) struct ComponentPtr(*mut dyn Component);

// SAFETY: each pointer is stepped by exactly one thread per phase (fixed
// shards in the barrier scheduler, unique pool claims in the task pool
// scheduler), and phases are separated by release/acquire gates.
unsafe impl Send for ComponentPtr {}

impl ComponentPtr {
    pub(crate) fn new(component: &mut (dyn Component + 'static)) -> Self {
        Self(component as *mut dyn Component)
    }

    /// Step the component.
    ///
    /// SAFETY: the caller must hold the only handle being stepped for
    /// this component in the current phase.
    #[inline]
    pub(crate) unsafe fn step(self, time: f64) {
        unsafe { (*self.0).simulate_one_timestep(time) }
    }
}
