//! Solution engine of the finite-element kernel.
//!
//! Turns a [`fek_model::ModelPart`] into global algebraic systems and drives
//! them to equilibrium:
//!
//! - [`builder_and_solver`]: DOF registry, sparse assembly, Dirichlet
//!   policies and reactions
//! - [`scheme`]: static, backward Euler and Bossak/Newmark time integration
//! - [`convergence`]: residual and displacement criteria and their
//!   combinations
//! - [`strategies`]: Newton-Raphson and arc-length continuation
//! - [`settings`]: JSON configuration of the strategies
//! - [`backend`]: linear solvers
//! - [`elements`]: reference entities
//!
//! # Example
//!
//! ```no_run
//! use fek_solver::{
//!     default_backend, NewtonRaphsonSettings, NewtonRaphsonStrategy, ResidualCriteria, StaticScheme,
//! };
//!
//! # fn example(model_part: &mut fek_model::ModelPart) -> fek_model::Result<()> {
//! let settings = NewtonRaphsonSettings::from_json(r#"{ "max_iteration": 20 }"#)?;
//! let mut strategy = NewtonRaphsonStrategy::new(
//!     StaticScheme::new(),
//!     default_backend(),
//!     Box::new(ResidualCriteria::new(1e-8, 1e-12)?),
//!     settings,
//! )?;
//! let report = strategy.solve(model_part)?;
//! println!("converged: {} after {} iterations", report.converged, report.iterations);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod builder_and_solver;
pub mod convergence;
pub mod elements;
pub mod scheme;
pub mod settings;
pub mod strategies;

pub use backend::{default_backend, BackendError, ConjugateGradient, LinearSolver, NativeBackend, SolveInfo};
pub use builder_and_solver::{BuilderAndSolver, DirichletPolicy, GlobalSystem};
pub use convergence::{
    AndCriteria, ConvergenceCriteria, CriteriaContext, DisplacementCriteria, OrCriteria, ResidualCriteria,
};
pub use elements::{LaplacianElement, LinearSpringLaw, PointLoadCondition, SpringElement, SpringLaw, TrussElement2D};
pub use scheme::{BackwardEulerScheme, BossakScheme, Scheme, StaticScheme};
pub use settings::{ArcLengthSettings, NewtonRaphsonSettings};
pub use strategies::{ArcLengthStrategy, NewtonRaphsonStrategy, SolutionStepReport};
