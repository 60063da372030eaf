//! Per-component numerical machinery.
//!
//! Load (Q-type) components solve small coupled algebraic systems every
//! step. The pipeline is:
//!
//! 1. Read frozen inputs (wave variables, impedances, delayed history).
//! 2. Warm-start the unknown vector from the previous step.
//! 3. Run a fixed number of Newton iterations: rebuild residual and
//!    Jacobian, LU-factor with pivoting, substitute, apply the relaxed
//!    update. There is no convergence check, so per-step cost is bounded.
//! 4. Write derived outputs to node slots.
//! 5. Push future-step terms into delay buffers.
//!
//! Variables bounded to a physical range go through a [`Limiter`], which
//! also supplies the matching one-sided derivative for the Jacobian.

mod delay;
mod matrix;
mod newton;

pub use delay::DelayBuffer;
pub use matrix::{DenseMatrix, SingularMatrix, SINGULARITY_THRESHOLD};
pub use newton::{NewtonSolver, SolveReport, DEFAULT_ITERATIONS, RELAXATION_SCHEDULE};

/// Clamp to a physical range, with the one-sided derivative the Jacobian
/// needs at the boundary.
#[derive(Debug, Clone, Copy)]
pub struct Limiter {
    pub min: f64,
    pub max: f64,
}

impl Limiter {
    /// Create a limiter over `[min, max]`.
    pub fn new(min: f64, max: f64) -> Self {
        debug_assert!(min <= max);
        Self { min, max }
    }

    /// Clamped value.
    #[inline]
    pub fn value(&self, x: f64) -> f64 {
        x.clamp(self.min, self.max)
    }

    /// Derivative of the clamped value: 1 inside the range, 0 at or beyond
    /// a bound. Using this in the Jacobian avoids the division by zero a
    /// naive derivative would produce at the clamp boundary.
    #[inline]
    pub fn derivative(&self, x: f64) -> f64 {
        if x <= self.min || x >= self.max {
            0.0
        } else {
            1.0
        }
    }

    /// Whether `x` lies at or beyond a bound.
    #[inline]
    pub fn is_saturated(&self, x: f64) -> bool {
        x <= self.min || x >= self.max
    }
}
