//! Native backend using nalgebra's dense LU.
//!
//! The CSR matrix is expanded to a dense matrix before factorization, so this
//! backend is meant for small-to-medium systems and for tests.

use super::traits::*;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

pub struct NativeBackend;

impl LinearSolver for NativeBackend {
    fn solve(
        &self,
        a: &CsrMatrix<f64>,
        b: &DVector<f64>,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        check_dimensions(a, b)?;
        let n = b.len();
        if n == 0 {
            return Ok((DVector::zeros(0), info(None)));
        }

        let mut dense = DMatrix::zeros(n, n);
        for (row_idx, row) in a.row_iter().enumerate() {
            for (&col_idx, &value) in row.col_indices().iter().zip(row.values().iter()) {
                dense[(row_idx, col_idx)] += value;
            }
        }

        let x = dense
            .clone()
            .lu()
            .solve(b)
            .ok_or(BackendError("singular matrix in LU decomposition".into()))?;

        if x.iter().any(|v| !v.is_finite()) {
            return Err("LU solve produced non-finite values".into());
        }
        let residual = (&dense * &x - b).norm();

        Ok((x, info(Some(residual))))
    }

    fn name(&self) -> &str {
        "native-nalgebra"
    }
}

fn info(residual_norm: Option<f64>) -> SolveInfo {
    SolveInfo {
        iterations: 1,
        residual_norm,
        solver_name: "nalgebra-LU".to_string(),
    }
}
