//! Fixed-iteration Newton-Raphson for per-component equation systems.
//!
//! Unlike a convergence-driven solver, this one always runs the same small
//! number of iterations. The trade is deliberate: per-step cost stays
//! bounded and identical on every step, which keeps the fixed-timestep
//! schedule deterministic. Accuracy comes from the warm start (the previous
//! step's converged state) and the small timestep, not from iterating to
//! tolerance.

use super::matrix::DenseMatrix;

/// Default number of Newton iterations per step.
pub const DEFAULT_ITERATIONS: usize = 2;

/// Per-iteration relaxation schedule. Chosen for stability on mildly stiff
/// systems; the last entry repeats for any further iterations.
pub const RELAXATION_SCHEDULE: [f64; 4] = [1.0, 0.67, 0.5, 0.5];

/// Outcome of one fixed-iteration solve.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolveReport {
    /// Iterations whose Jacobian could not be factored
    pub singular_iterations: usize,
}

impl SolveReport {
    /// Whether any iteration hit a singular Jacobian.
    pub fn had_singularity(&self) -> bool {
        self.singular_iterations > 0
    }
}

/// Newton-Raphson solver with a fixed iteration count.
///
/// Owned by each Q-type component as solver scratch state. The component
/// supplies a closure that fills the residual vector and the Jacobian from
/// the current state; the solver factors, substitutes and applies the
/// relaxed update.
#[derive(Debug)]
pub struct NewtonSolver {
    iterations: usize,
    jacobian: DenseMatrix,
    residual: Vec<f64>,
    delta: Vec<f64>,
    /// Last successfully computed update, reused damped when the Jacobian
    /// goes singular
    last_delta: Vec<f64>,
}

impl NewtonSolver {
    /// Create a solver for an n-unknown system with the default iteration
    /// count.
    pub fn new(n: usize) -> Self {
        Self::with_iterations(n, DEFAULT_ITERATIONS)
    }

    /// Create a solver with an explicit iteration count (minimum 1).
    pub fn with_iterations(n: usize, iterations: usize) -> Self {
        Self {
            iterations: iterations.max(1),
            jacobian: DenseMatrix::new(n),
            residual: vec![0.0; n],
            delta: vec![0.0; n],
            last_delta: vec![0.0; n],
        }
    }

    /// Number of unknowns.
    pub fn size(&self) -> usize {
        self.residual.len()
    }

    /// Iterations run per solve.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Change the iteration count (minimum 1).
    pub fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations.max(1);
    }

    /// Run the fixed-iteration solve, updating `state` in place.
    ///
    /// `eval` recomputes the residual vector and Jacobian for the given
    /// state. It is called exactly `iterations` times. Each iteration
    /// applies `state -= w[i] * delta` with the relaxation schedule.
    ///
    /// A singular Jacobian never aborts the solve: the last valid delta is
    /// damped toward zero and reused, and the report counts the event so
    /// the component can emit a warning.
    pub fn solve<F>(&mut self, state: &mut [f64], mut eval: F) -> SolveReport
    where
        F: FnMut(&[f64], &mut [f64], &mut DenseMatrix),
    {
        debug_assert_eq!(state.len(), self.residual.len());
        let mut report = SolveReport::default();

        for iter in 0..self.iterations {
            self.jacobian.clear();
            eval(state, &mut self.residual, &mut self.jacobian);

            match self.jacobian.factor() {
                Ok(()) => {
                    self.jacobian.solve_into(&self.residual, &mut self.delta);
                    self.last_delta.copy_from_slice(&self.delta);
                }
                Err(_) => {
                    // Damp the last valid update toward zero instead of
                    // dividing by a vanishing pivot.
                    report.singular_iterations += 1;
                    for d in &mut self.last_delta {
                        *d *= 0.5;
                    }
                    self.delta.copy_from_slice(&self.last_delta);
                }
            }

            let w = RELAXATION_SCHEDULE[iter.min(RELAXATION_SCHEDULE.len() - 1)];
            for (s, d) in state.iter_mut().zip(&self.delta) {
                *s -= w * d;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_system_exact_after_first_iteration() {
        // 2x - 6 = 0. Newton on a linear equation lands on the root in one
        // full-weight step, so the fixed 2-iteration solve is exact.
        let mut solver = NewtonSolver::new(1);
        let mut state = [100.0];
        solver.solve(&mut state, |x, r, j| {
            r[0] = 2.0 * x[0] - 6.0;
            j.set(0, 0, 2.0);
        });
        assert_relative_eq!(state[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_iteration_count_is_fixed() {
        let mut solver = NewtonSolver::with_iterations(1, 4);
        let mut calls = 0;
        let mut state = [0.0];
        solver.solve(&mut state, |x, r, j| {
            calls += 1;
            r[0] = x[0];
            j.set(0, 0, 1.0);
        });
        // Never convergence-checked, never cut short
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_nonlinear_two_iterations_close() {
        // x^2 - 4 = 0 from a warm start near the root. The second
        // iteration applies w = 0.67, so the solve lands short of the
        // full Newton step.
        let mut solver = NewtonSolver::new(1);
        let mut state = [2.5];
        solver.solve(&mut state, |x, r, j| {
            r[0] = x[0] * x[0] - 4.0;
            j.set(0, 0, 2.0 * x[0]);
        });

        let x1 = 2.5 - (2.5 * 2.5 - 4.0) / (2.0 * 2.5);
        let expected = x1 - 0.67 * ((x1 * x1 - 4.0) / (2.0 * x1));
        assert_relative_eq!(state[0], expected, epsilon = 1e-12);
        assert!((state[0] - 2.0).abs() < 2.5e-2);
    }

    #[test]
    fn test_singular_jacobian_damps_not_crashes() {
        let mut solver = NewtonSolver::with_iterations(1, 3);
        let mut state = [1.0];
        let report = solver.solve(&mut state, |x, r, j| {
            r[0] = x[0];
            j.set(0, 0, 0.0); // always singular
        });
        assert_eq!(report.singular_iterations, 3);
        assert!(report.had_singularity());
        assert!(state[0].is_finite());
    }

    #[test]
    fn test_coupled_linear_system() {
        // r0 = x0 + x1 - 3, r1 = x0 - x1 - 1  ->  x0 = 2, x1 = 1
        let mut solver = NewtonSolver::new(2);
        let mut state = [0.0, 0.0];
        solver.solve(&mut state, |x, r, j| {
            r[0] = x[0] + x[1] - 3.0;
            r[1] = x[0] - x[1] - 1.0;
            j.set(0, 0, 1.0);
            j.set(0, 1, 1.0);
            j.set(1, 0, 1.0);
            j.set(1, 1, -1.0);
        });
        assert_relative_eq!(state[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(state[1], 1.0, epsilon = 1e-12);
    }
}
