//! Jacobi-preconditioned conjugate gradient on the CSR matrix.
//!
//! Only valid for symmetric positive definite systems (static problems with
//! the block or elimination Dirichlet policy). Non-convergence within
//! `max_iterations` is reported as a backend error.

use super::traits::*;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

pub struct ConjugateGradient {
    max_iterations: usize,
    tolerance: f64,
    abs_tolerance: f64,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new()
    }
}

impl ConjugateGradient {
    pub fn new() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-10,
            abs_tolerance: 1e-14,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_abs_tolerance(mut self, abs_tolerance: f64) -> Self {
        self.abs_tolerance = abs_tolerance;
        self
    }
}

/// `A x` over the CSR rows.
fn csr_mul(a: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(a.nrows());
    for (i, row) in a.row_iter().enumerate() {
        y[i] = row
            .col_indices()
            .iter()
            .zip(row.values())
            .map(|(&j, &v)| v * x[j])
            .sum();
    }
    y
}

/// Inverse diagonal, with zero or missing diagonal entries mapped to 1.
fn jacobi(a: &CsrMatrix<f64>) -> DVector<f64> {
    let mut inv = DVector::from_element(a.nrows(), 1.0);
    for (i, row) in a.row_iter().enumerate() {
        if let Some(pos) = row.col_indices().iter().position(|&c| c == i) {
            let d = row.values()[pos];
            if d.abs() > f64::MIN_POSITIVE {
                inv[i] = 1.0 / d;
            }
        }
    }
    inv
}

impl LinearSolver for ConjugateGradient {
    fn solve(
        &self,
        a: &CsrMatrix<f64>,
        b: &DVector<f64>,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        check_dimensions(a, b)?;
        let n = b.len();
        let b_norm = b.norm();
        let info = |iterations, residual| SolveInfo {
            iterations,
            residual_norm: Some(residual),
            solver_name: "jacobi-cg".to_string(),
        };

        if b_norm < 1e-300 {
            return Ok((DVector::zeros(n), info(0, 0.0)));
        }

        let precond = jacobi(a);
        let mut x = DVector::zeros(n);
        let mut r = b.clone();
        let mut z = r.component_mul(&precond);
        let mut p = z.clone();
        let mut rz = r.dot(&z);

        for iteration in 1..=self.max_iterations {
            let ap = csr_mul(a, &p);
            let p_ap = p.dot(&ap);
            if !p_ap.is_finite() || p_ap.abs() < 1e-300 {
                return Err(BackendError(format!(
                    "conjugate gradient breakdown at iteration {} (p.Ap = {:e})",
                    iteration, p_ap
                )));
            }
            let alpha = rz / p_ap;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);

            let r_norm = r.norm();
            if r_norm < self.tolerance * b_norm || r_norm < self.abs_tolerance {
                return Ok((x, info(iteration, r_norm)));
            }

            z = r.component_mul(&precond);
            let rz_new = r.dot(&z);
            let beta = rz_new / rz;
            rz = rz_new;
            p = &z + beta * &p;
        }

        Err(BackendError(format!(
            "conjugate gradient did not converge in {} iterations (|r| = {:e})",
            self.max_iterations,
            r.norm()
        )))
    }

    fn name(&self) -> &str {
        "jacobi-cg"
    }
}
