//! Barrier-synchronized scheduler.
//!
//! Each phase boundary is one [`BarrierLock`]: workers arrive and spin
//! while the gate is locked; the coordinator waits for all arrivals, locks
//! the gate after the next one, then opens the current one. Locking ahead
//! before opening guarantees no worker can run two phases ahead of a
//! straggler.
//!
//! The coordinator (the calling thread) simulates shard 0 itself, so
//! `n_threads` includes it.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::network::Node;
use crate::system::ComponentSystem;

use super::ComponentPtr;

/// A busy-wait gate for one phase boundary.
///
/// Steady-state protocol: the gate starts locked; workers `enter` (arrive,
/// then spin); the coordinator polls `all_arrived`, then `lock`s the next
/// gate and `unlock`s this one. `lock` also resets the arrival counter for
/// the next cycle.
pub struct BarrierLock {
    counter: AtomicUsize,
    locked: AtomicBool,
}

impl BarrierLock {
    /// Create a locked gate with no arrivals.
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            locked: AtomicBool::new(true),
        }
    }

    /// Whether `n` workers have arrived since the last `lock`.
    #[inline]
    pub fn all_arrived(&self, n: usize) -> bool {
        self.counter.load(Ordering::Acquire) == n
    }

    /// Re-arm the gate: reset arrivals and close it.
    ///
    /// Must only be called while every worker is held behind an earlier
    /// gate, otherwise arrivals are lost.
    #[inline]
    pub fn lock(&self) {
        self.counter.store(0, Ordering::Release);
        self.locked.store(true, Ordering::Release);
    }

    /// Open the gate, releasing every spinning worker.
    #[inline]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Arrive at the gate and spin until it opens.
    #[inline]
    pub fn enter(&self) {
        self.counter.fetch_add(1, Ordering::AcqRel);
        while self.locked.load(Ordering::Acquire) {
            spin_loop();
        }
    }
}

impl Default for BarrierLock {
    fn default() -> Self {
        Self::new()
    }
}

/// The four phase gates of one step.
struct Gates {
    signal: BarrierLock,
    c: BarrierLock,
    q: BarrierLock,
    log: BarrierLock,
}

/// One thread's fixed share of the work.
struct Shard {
    signal: Vec<ComponentPtr>,
    c: Vec<ComponentPtr>,
    q: Vec<ComponentPtr>,
    nodes: Vec<Arc<Node>>,
}

struct StepPlan {
    start_time: f64,
    dt: f64,
    n_steps: usize,
    base_step: usize,
    log_interval: usize,
}

pub(crate) fn simulate_barrier(system: &mut ComponentSystem, stop_time: f64, n_threads: usize) {
    let plan = StepPlan {
        start_time: system.time(),
        dt: system.timestep(),
        n_steps: ((stop_time - system.time()) / system.timestep()).round() as usize,
        base_step: system.step_counter(),
        log_interval: system.log_interval(),
    };
    if plan.n_steps == 0 {
        return;
    }

    let (signal_list, c_list, q_list) = system.execution_lists();
    let abort = system.abort_handle();
    let nodes: Vec<Arc<Node>> = system.nodes().to_vec();

    let components = system.components_mut();
    let ptrs: Vec<ComponentPtr> = components
        .iter_mut()
        .map(|c| ComponentPtr::new(c.as_mut()))
        .collect();

    // Round-robin sharding per phase; shard 0 belongs to the coordinator
    let mut shards: Vec<Shard> = (0..n_threads)
        .map(|_| Shard {
            signal: Vec::new(),
            c: Vec::new(),
            q: Vec::new(),
            nodes: Vec::new(),
        })
        .collect();
    for (pos, &idx) in signal_list.iter().enumerate() {
        shards[pos % n_threads].signal.push(ptrs[idx]);
    }
    for (pos, &idx) in c_list.iter().enumerate() {
        shards[pos % n_threads].c.push(ptrs[idx]);
    }
    for (pos, &idx) in q_list.iter().enumerate() {
        shards[pos % n_threads].q.push(ptrs[idx]);
    }
    for (pos, node) in nodes.iter().enumerate() {
        shards[pos % n_threads].nodes.push(Arc::clone(node));
    }
    let own_shard = shards.remove(0);

    let gates = Gates {
        signal: BarrierLock::new(),
        c: BarrierLock::new(),
        q: BarrierLock::new(),
        log: BarrierLock::new(),
    };
    let halt = AtomicBool::new(false);
    let n_workers = n_threads - 1;
    let mut steps_run = plan.n_steps;

    thread::scope(|scope| {
        for shard in shards {
            let gates = &gates;
            let halt = &halt;
            let plan = &plan;
            scope.spawn(move || worker_loop(shard, gates, halt, plan));
        }

        for step in 1..=plan.n_steps {
            while !gates.signal.all_arrived(n_workers) {
                spin_loop();
            }
            if abort.load(Ordering::Acquire) {
                halt.store(true, Ordering::Release);
            }
            gates.c.lock();
            gates.signal.unlock();
            if halt.load(Ordering::Acquire) {
                steps_run = step - 1;
                break;
            }

            let time = plan.start_time + step as f64 * plan.dt;
            for p in &own_shard.signal {
                unsafe { p.step(time) };
            }

            while !gates.c.all_arrived(n_workers) {
                spin_loop();
            }
            gates.q.lock();
            gates.c.unlock();
            for p in &own_shard.c {
                unsafe { p.step(time) };
            }

            while !gates.q.all_arrived(n_workers) {
                spin_loop();
            }
            gates.log.lock();
            gates.q.unlock();
            for p in &own_shard.q {
                unsafe { p.step(time) };
            }

            while !gates.log.all_arrived(n_workers) {
                spin_loop();
            }
            gates.signal.lock();
            gates.log.unlock();
            if (plan.base_step + step) % plan.log_interval == 0 {
                for node in &own_shard.nodes {
                    node.log_data();
                }
            }
        }
    });

    system.commit_parallel_steps(steps_run);
    if system.was_aborted() {
        system.hub().info(
            "Abort",
            format!("simulation stopped at t = {:.6}", system.time()),
        );
    }
}

fn worker_loop(shard: Shard, gates: &Gates, halt: &AtomicBool, plan: &StepPlan) {
    for step in 1..=plan.n_steps {
        gates.signal.enter();
        if halt.load(Ordering::Acquire) {
            break;
        }
        let time = plan.start_time + step as f64 * plan.dt;
        for p in &shard.signal {
            unsafe { p.step(time) };
        }

        gates.c.enter();
        for p in &shard.c {
            unsafe { p.step(time) };
        }

        gates.q.enter();
        for p in &shard.q {
            unsafe { p.step(time) };
        }

        gates.log.enter();
        if (plan.base_step + step) % plan.log_interval == 0 {
            for node in &shard.nodes {
                node.log_data();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_opens_and_rearms() {
        let gate = BarrierLock::new();
        assert!(gate.all_arrived(0));
        assert!(!gate.all_arrived(1));

        gate.unlock();
        gate.enter();
        assert!(gate.all_arrived(1));

        gate.lock();
        assert!(gate.all_arrived(0));
    }

    #[test]
    fn test_repeated_rounds_never_deadlock() {
        for n_workers in 1..=7usize {
            let a = BarrierLock::new();
            let b = BarrierLock::new();
            thread::scope(|scope| {
                for _ in 0..n_workers {
                    scope.spawn(|| {
                        for _ in 0..1000 {
                            a.enter();
                            b.enter();
                        }
                    });
                }
                for _ in 0..1000 {
                    while !a.all_arrived(n_workers) {
                        spin_loop();
                    }
                    b.lock();
                    a.unlock();
                    while !b.all_arrived(n_workers) {
                        spin_loop();
                    }
                    a.lock();
                    b.unlock();
                }
            });
        }
    }

    #[test]
    fn test_two_threads_cross_the_gate() {
        let gate = BarrierLock::new();
        thread::scope(|scope| {
            scope.spawn(|| gate.enter());
            while !gate.all_arrived(1) {
                spin_loop();
            }
            gate.unlock();
        });
    }
}
