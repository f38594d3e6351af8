//! Nonlinear solution strategies.
//!
//! A strategy drives one load or time step through the cycle
//!
//! ```text
//! initialize -> initialize_solution_step -> predict
//!     -> solve_solution_step -> finalize_solution_step
//! ```
//!
//! Both strategies share the same state: a scheme, a builder-and-solver,
//! a convergence criterion and the global system. That state lives in
//! [`StrategyCore`]; the strategies only differ in how an iteration turns
//! residuals into increments.

use crate::backend::LinearSolver;
use crate::builder_and_solver::{BuilderAndSolver, DirichletPolicy, GlobalSystem};
use crate::convergence::{ConvergenceCriteria, CriteriaContext};
use crate::scheme::Scheme;
use fek_model::variables::DISPLACEMENT;
use fek_model::{KernelError, ModelPart, Result};
use nalgebra::DVector;
use tracing::{info, warn};

pub mod arc_length;
pub mod newton_raphson;

pub use arc_length::ArcLengthStrategy;
pub use newton_raphson::NewtonRaphsonStrategy;

/// Outcome of one `solve_solution_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolutionStepReport {
    pub converged: bool,
    pub iterations: usize,
}

/// Options both strategies read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CoreOptions {
    pub max_iteration: usize,
    pub compute_reactions: bool,
    pub reform_dofs_at_each_step: bool,
    pub move_mesh_flag: bool,
    pub fail_on_max_iterations: bool,
    pub echo_level: u32,
}

pub(crate) struct StrategyCore<S: Scheme> {
    pub scheme: S,
    pub builder: BuilderAndSolver,
    pub criteria: Box<dyn ConvergenceCriteria>,
    pub system: GlobalSystem,
    pub options: CoreOptions,
    initialized: bool,
    dof_set_is_initialized: bool,
    solution_step_is_initialized: bool,
    pub stiffness_matrix_is_built: bool,
}

impl<S: Scheme> StrategyCore<S> {
    pub fn new(
        scheme: S,
        linear_solver: Box<dyn LinearSolver>,
        mut criteria: Box<dyn ConvergenceCriteria>,
        policy: DirichletPolicy,
        options: CoreOptions,
    ) -> Self {
        criteria.set_echo_level(options.echo_level);
        Self {
            scheme,
            builder: BuilderAndSolver::new(policy, linear_solver).with_echo_level(options.echo_level),
            criteria,
            system: GlobalSystem::empty(),
            options,
            initialized: false,
            dof_set_is_initialized: false,
            solution_step_is_initialized: false,
            stiffness_matrix_is_built: false,
        }
    }

    pub fn check(&self, model_part: &ModelPart) -> Result<()> {
        self.scheme.check(model_part)?;
        self.criteria.check(model_part)
    }

    pub fn initialize(&mut self, model_part: &mut ModelPart) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.check(model_part)?;
        self.scheme.initialize(model_part)?;
        self.initialized = true;
        Ok(())
    }

    pub fn dof_set_is_initialized(&self) -> bool {
        self.dof_set_is_initialized
    }

    /// Collect and number the DOFs, then size the global system.
    pub fn set_up_system(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.builder.set_up_dof_set(&self.scheme, model_part)?;
        self.builder.set_up_system(model_part)?;
        self.builder
            .resize_and_initialize_vectors(&self.scheme, &mut self.system, model_part)?;
        self.dof_set_is_initialized = true;
        self.stiffness_matrix_is_built = false;
        Ok(())
    }

    pub fn initialize_solution_step(&mut self, model_part: &mut ModelPart) -> Result<()> {
        if self.solution_step_is_initialized {
            return Ok(());
        }
        if !self.dof_set_is_initialized || self.options.reform_dofs_at_each_step {
            self.set_up_system(model_part)?;
        } else if !self.builder.is_system_initialized(&self.system) {
            self.builder
                .resize_and_initialize_vectors(&self.scheme, &mut self.system, model_part)?;
            self.stiffness_matrix_is_built = false;
        }
        self.scheme.initialize_solution_step(model_part)?;
        self.criteria
            .initialize_solution_step(&CriteriaContext::new(model_part, self.builder.dof_set(), &self.system))?;
        self.solution_step_is_initialized = true;
        Ok(())
    }

    pub fn predict(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.scheme.predict(self.builder.dof_set(), model_part)?;
        if self.options.move_mesh_flag {
            move_mesh(model_part)?;
        }
        Ok(())
    }

    /// Entity and criteria hooks plus `pre_criteria`, run before a build.
    pub fn begin_iteration(&mut self, model_part: &mut ModelPart, iteration: usize) -> Result<bool> {
        model_part.process_info_mut().set_iteration(iteration);
        self.scheme.initialize_non_linear_iteration(model_part)?;
        let ctx = CriteriaContext::new(model_part, self.builder.dof_set(), &self.system);
        self.criteria.initialize_non_linear_iteration(&ctx)?;
        self.criteria.pre_criteria(&ctx)
    }

    /// Finalize hooks, then `post_criteria` when the pre-check passed.
    pub fn end_iteration(&mut self, model_part: &mut ModelPart, pre_converged: bool) -> Result<bool> {
        self.scheme.finalize_non_linear_iteration(model_part)?;
        self.criteria
            .finalize_non_linear_iteration(&CriteriaContext::new(model_part, self.builder.dof_set(), &self.system))?;
        if !pre_converged {
            return Ok(false);
        }
        if self.criteria.actualize_rhs() {
            self.builder.build_rhs(&self.scheme, model_part, &mut self.system.b)?;
        }
        self.criteria
            .post_criteria(&CriteriaContext::new(model_part, self.builder.dof_set(), &self.system))
    }

    /// Apply `dx` through the scheme and move the mesh if requested.
    pub fn update_database(&mut self, model_part: &mut ModelPart, dx: &DVector<f64>) -> Result<()> {
        self.scheme.update(self.builder.dof_set(), dx, model_part)?;
        if self.options.move_mesh_flag {
            move_mesh(model_part)?;
        }
        Ok(())
    }

    /// [`Self::update_database`] with the increment held in the system.
    pub fn update_database_with_system_increment(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.scheme.update(self.builder.dof_set(), &self.system.dx, model_part)?;
        if self.options.move_mesh_flag {
            move_mesh(model_part)?;
        }
        Ok(())
    }

    /// Log the outcome, compute reactions and apply the max-iteration policy.
    pub fn finish_iterations(
        &mut self,
        model_part: &mut ModelPart,
        converged: bool,
        iterations: usize,
    ) -> Result<SolutionStepReport> {
        if converged {
            if self.options.echo_level > 0 {
                info!(iterations, "nonlinear step converged");
            }
        } else {
            warn!(
                iterations,
                "maximum number of nonlinear iterations reached without convergence"
            );
        }
        if self.options.compute_reactions {
            self.builder.calculate_reactions(&self.scheme, model_part)?;
        }
        if !converged && self.options.fail_on_max_iterations {
            return Err(KernelError::MaxIterationsExceeded { iterations });
        }
        Ok(SolutionStepReport { converged, iterations })
    }

    pub fn finalize_solution_step(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.scheme.finalize_solution_step(model_part)?;
        self.criteria
            .finalize_solution_step(&CriteriaContext::new(model_part, self.builder.dof_set(), &self.system))?;
        self.solution_step_is_initialized = false;
        if self.options.reform_dofs_at_each_step {
            self.clear();
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.builder.clear();
        self.system = GlobalSystem::empty();
        self.dof_set_is_initialized = false;
        self.stiffness_matrix_is_built = false;
    }
}

/// Current coordinates = initial coordinates + DISPLACEMENT.
pub fn move_mesh(model_part: &mut ModelPart) -> Result<()> {
    if !DISPLACEMENT.iter().any(|&var| model_part.variables().has(var)) {
        return Err(KernelError::config(format!(
            "moving the mesh of {} requires DISPLACEMENT as a nodal variable",
            model_part.name
        )));
    }
    for node in model_part.nodes_mut().iter_mut() {
        let initial = node.initial_coordinates;
        let mut current = initial;
        for (axis, &variable) in DISPLACEMENT.iter().enumerate() {
            if node.has_solution_step_value(variable) {
                current[axis] += node.value(variable)?;
            }
        }
        node.coordinates = current;
    }
    Ok(())
}
