//! Small dense linear systems for per-component Jacobians.
//!
//! Q-type components solve a handful of coupled algebraic equations every
//! step. The systems are tiny (2-6 unknowns), so a dense row-major matrix
//! with LU decomposition and partial pivoting is the right tool; sparsity
//! would cost more than it saves at this size.

/// Marker error: the matrix could not be factored.
///
/// During stepping this is downgraded to a diagnostic warning with a local
/// fallback; it only propagates as a hard error from start-value seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingularMatrix;

/// Pivot magnitude below which a matrix is treated as singular.
pub const SINGULARITY_THRESHOLD: f64 = 1e-15;

/// A dense square matrix with an in-place LU workspace.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    /// Matrix elements (row-major)
    a: Vec<f64>,
    /// LU decomposition workspace
    lu: Vec<f64>,
    /// Pivot indices from the last factorization
    pivots: Vec<usize>,
    /// Matrix dimension
    size: usize,
}

impl DenseMatrix {
    /// Create a zeroed n-by-n matrix.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            lu: vec![0.0; size * size],
            pivots: vec![0; size],
            size,
        }
    }

    /// Matrix dimension.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Zero all elements.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
    }

    /// Get element at (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    /// Set element at (row, col).
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] = value;
    }

    /// Add to element at (row, col).
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// Perform LU decomposition with partial pivoting.
    ///
    /// The decomposition lives in a separate workspace; the original
    /// elements stay intact for the next rebuild.
    pub fn factor(&mut self) -> Result<(), SingularMatrix> {
        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        for i in 0..n {
            self.pivots[i] = i;
        }

        for k in 0..n {
            // Find pivot
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;

            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if max_val < SINGULARITY_THRESHOLD {
                return Err(SingularMatrix);
            }

            // Swap rows if needed
            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            // Eliminate
            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve `A * x = b` using the precomputed LU decomposition.
    pub fn solve_into(&self, b: &[f64], x: &mut [f64]) {
        let n = self.size;
        debug_assert_eq!(b.len(), n);
        debug_assert_eq!(x.len(), n);

        // Apply pivot permutation to b
        for i in 0..n {
            x[i] = b[self.pivots[i]];
        }

        // Forward substitution (L * y = Pb)
        for i in 0..n {
            for j in 0..i {
                x[i] -= self.lu[i * n + j] * x[j];
            }
        }

        // Back substitution (U * x = y)
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                x[i] -= self.lu[i * n + j] * x[j];
            }
            x[i] /= self.lu[i * n + i];
        }
    }
}
