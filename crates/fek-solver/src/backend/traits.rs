//! Backend trait definitions for the global linear solve.
//!
//! The builder hands the assembled CSR matrix and right-hand side to a
//! backend and only looks at the returned increment and the success signal.
//! Local element algebra stays in dense nalgebra types.

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use thiserror::Error;

/// Failure reported by a backend (singular matrix, no convergence, size
/// mismatch). The builder converts it into `KernelError::LinearSolverFailure`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct BackendError(pub String);

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// Solver convergence and diagnostic info.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveInfo {
    /// Number of iterations (1 for direct solvers)
    pub iterations: usize,
    /// Final residual norm (if available)
    pub residual_norm: Option<f64>,
    /// Human-readable solver name (e.g., "nalgebra-LU", "jacobi-cg")
    pub solver_name: String,
}

/// A linear solver backend: `x = A^-1 b`.
pub trait LinearSolver: Send + Sync {
    fn solve(
        &self,
        a: &CsrMatrix<f64>,
        b: &DVector<f64>,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError>;

    /// Human-readable name of this backend.
    fn name(&self) -> &str;
}

pub(crate) fn check_dimensions(a: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<(), BackendError> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() {
        return Err(BackendError(format!(
            "dimension mismatch: A is {}x{}, b has {} entries",
            a.nrows(),
            a.ncols(),
            b.len()
        )));
    }
    Ok(())
}
