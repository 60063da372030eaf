//! Task-pool scheduler.
//!
//! One [`TaskPool`] per phase dispenses component indices; every thread,
//! coordinator included, claims and steps components until the pool runs
//! dry. The generation counter doubles as the phase-open signal, so a pool
//! is both a work queue and a rendezvous point.
//!
//! The pool balances uneven component costs (a Newton-solving component
//! next to a trivial source) better than fixed shards, at the price of one
//! atomic claim per component per step.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::network::Node;
use crate::system::ComponentSystem;

use super::ComponentPtr;

/// An index dispenser for one phase, reused every step.
///
/// Per generation each index in `0..len` is handed out exactly once.
/// `open` re-arms the pool for the next generation; it spins until every
/// thread has left the previous one, so a straggler's late `take` can
/// never claim work from a generation it did not wait for.
pub struct TaskPool {
    len: usize,
    next: AtomicUsize,
    done: AtomicUsize,
    left: AtomicUsize,
    generation: AtomicUsize,
}

impl TaskPool {
    /// Create a pool over `len` items shared by `n_threads` threads.
    /// Starts closed at generation zero with every thread counted as
    /// having left.
    pub fn new(len: usize, n_threads: usize) -> Self {
        Self {
            len,
            next: AtomicUsize::new(len),
            done: AtomicUsize::new(len),
            left: AtomicUsize::new(n_threads),
            generation: AtomicUsize::new(0),
        }
    }

    /// Number of items per generation.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the pool has no items at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Spin until the pool reaches `generation`.
    #[inline]
    pub fn wait_open(&self, generation: usize) {
        while self.generation.load(Ordering::Acquire) < generation {
            spin_loop();
        }
    }

    /// Claim the next item, or `None` when the generation is drained.
    #[inline]
    pub fn take(&self) -> Option<usize> {
        let i = self.next.fetch_add(1, Ordering::AcqRel);
        (i < self.len).then_some(i)
    }

    /// Mark one claimed item as processed.
    #[inline]
    pub fn finish(&self) {
        self.done.fetch_add(1, Ordering::AcqRel);
    }

    /// Announce that this thread is done with the current generation.
    #[inline]
    pub fn leave(&self) {
        self.left.fetch_add(1, Ordering::AcqRel);
    }

    /// Spin until every item of the current generation is processed.
    #[inline]
    pub fn wait_done(&self) {
        while self.done.load(Ordering::Acquire) < self.len {
            spin_loop();
        }
    }

    /// Re-arm the pool and open it at `generation`.
    ///
    /// Spins until all `n_threads` threads have left the previous
    /// generation before resetting the claim counters.
    pub fn open(&self, generation: usize, n_threads: usize) {
        while self.left.load(Ordering::Acquire) < n_threads {
            spin_loop();
        }
        self.next.store(0, Ordering::Release);
        self.done.store(0, Ordering::Release);
        self.left.store(0, Ordering::Release);
        self.generation.store(generation, Ordering::Release);
    }
}

/// Claim and step components until the pool is drained, then leave.
fn drain(pool: &TaskPool, tasks: &[ComponentPtr], time: f64) {
    while let Some(i) = pool.take() {
        // SAFETY: the pool hands out each index exactly once per
        // generation, so this thread has the only live handle.
        unsafe { tasks[i].step(time) };
        pool.finish();
    }
    pool.leave();
}

/// Claim and log nodes until the pool is drained, then leave.
fn drain_log(pool: &TaskPool, nodes: &[Arc<Node>]) {
    while let Some(i) = pool.take() {
        nodes[i].log_data();
        pool.finish();
    }
    pool.leave();
}

struct StepPlan {
    start_time: f64,
    dt: f64,
    n_steps: usize,
    base_step: usize,
    log_interval: usize,
}

pub(crate) fn simulate_task_pool(system: &mut ComponentSystem, stop_time: f64, n_threads: usize) {
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
    let signal_tasks: Vec<ComponentPtr> = signal_list.iter().map(|&i| ptrs[i]).collect();
    let c_tasks: Vec<ComponentPtr> = c_list.iter().map(|&i| ptrs[i]).collect();
    let q_tasks: Vec<ComponentPtr> = q_list.iter().map(|&i| ptrs[i]).collect();

    let signal_pool = TaskPool::new(signal_tasks.len(), n_threads);
    let c_pool = TaskPool::new(c_tasks.len(), n_threads);
    let q_pool = TaskPool::new(q_tasks.len(), n_threads);
    let log_pool = TaskPool::new(nodes.len(), n_threads);
    let halt = AtomicBool::new(false);
    let mut steps_run = plan.n_steps;

    thread::scope(|scope| {
        for _ in 1..n_threads {
            let signal_tasks = signal_tasks.clone();
            let c_tasks = c_tasks.clone();
            let q_tasks = q_tasks.clone();
            let nodes = nodes.clone();
            let pools = (&signal_pool, &c_pool, &q_pool, &log_pool);
            let halt = &halt;
            let plan = &plan;
            scope.spawn(move || {
                let (signal_pool, c_pool, q_pool, log_pool) = pools;
                for step in 1..=plan.n_steps {
                    signal_pool.wait_open(step);
                    if halt.load(Ordering::Acquire) {
                        break;
                    }
                    let time = plan.start_time + step as f64 * plan.dt;
                    drain(signal_pool, &signal_tasks, time);

                    c_pool.wait_open(step);
                    drain(c_pool, &c_tasks, time);

                    q_pool.wait_open(step);
                    drain(q_pool, &q_tasks, time);

                    if (plan.base_step + step) % plan.log_interval == 0 {
                        log_pool.wait_open(step);
                        drain_log(log_pool, &nodes);
                    }
                }
            });
        }

        for step in 1..=plan.n_steps {
            if abort.load(Ordering::Acquire) {
                halt.store(true, Ordering::Release);
                // Open the first gate so the parked workers observe the
                // halt flag and exit.
                signal_pool.open(step, n_threads);
                steps_run = step - 1;
                break;
            }
            let time = plan.start_time + step as f64 * plan.dt;

            signal_pool.open(step, n_threads);
            drain(&signal_pool, &signal_tasks, time);
            signal_pool.wait_done();

            c_pool.open(step, n_threads);
            drain(&c_pool, &c_tasks, time);
            c_pool.wait_done();

            q_pool.open(step, n_threads);
            drain(&q_pool, &q_tasks, time);
            q_pool.wait_done();

            if (plan.base_step + step) % plan.log_interval == 0 {
                log_pool.open(step, n_threads);
                drain_log(&log_pool, &nodes);
                log_pool.wait_done();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_index_claimed_once() {
        let pool = TaskPool::new(10, 1);
        pool.open(1, 1);
        let mut seen = vec![false; 10];
        while let Some(i) = pool.take() {
            assert!(!seen[i]);
            seen[i] = true;
            pool.finish();
        }
        pool.leave();
        assert!(seen.iter().all(|&s| s));
        pool.wait_done();
    }

    #[test]
    fn test_reopen_after_all_threads_leave() {
        let pool = TaskPool::new(3, 2);
        pool.open(1, 2);
        // Thread one drains everything, both leave
        while pool.take().is_some() {
            pool.finish();
        }
        pool.leave();
        pool.leave();
        pool.open(2, 2);
        assert_eq!(pool.take(), Some(0));
    }

    #[test]
    fn test_concurrent_claims_are_disjoint() {
        let pool = TaskPool::new(1000, 4);
        let claimed: Vec<AtomicUsize> = (0..1000).map(|_| AtomicUsize::new(0)).collect();
        pool.open(1, 4);
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    pool.wait_open(1);
                    while let Some(i) = pool.take() {
                        claimed[i].fetch_add(1, Ordering::Relaxed);
                        pool.finish();
                    }
                    pool.leave();
                });
            }
        });
        pool.wait_done();
        assert!(claimed.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }
}
