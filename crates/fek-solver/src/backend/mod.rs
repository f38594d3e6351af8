//! Linear-solver backends.
//!
//! The builder-and-solver treats the linear solve as a black box behind
//! [`LinearSolver`]; it never inspects solver internals.
//!
//! # Backends
//!
//! - **Native** (default): dense nalgebra LU. Robust for indefinite
//!   tangents (arc-length past a limit point, transient schemes).
//! - **ConjugateGradient**: Jacobi-preconditioned CG directly on the CSR
//!   matrix, for symmetric positive definite systems.

pub mod conjugate_gradient;
pub mod native;
pub mod traits;

pub use conjugate_gradient::ConjugateGradient;
pub use native::NativeBackend;
pub use traits::*;

/// Returns the default linear solver.
pub fn default_backend() -> Box<dyn LinearSolver> {
    Box::new(NativeBackend)
}
