//! Full Newton-Raphson iteration.
//!
//! Each iteration assembles the tangent `A` and residual `b` at the current
//! state, solves `A Dx = b` and applies `Dx` through the scheme:
//!
//! ```text
//! u_{i+1} = u_i + K_T(u_i)^-1 (f_ext - f_int(u_i))
//! ```
//!
//! With `keep_system_constant_during_iterations` the tangent of the first
//! iteration is reused (modified Newton).

use super::{CoreOptions, SolutionStepReport, StrategyCore};
use crate::backend::LinearSolver;
use crate::builder_and_solver::{BuilderAndSolver, GlobalSystem};
use crate::convergence::ConvergenceCriteria;
use crate::scheme::Scheme;
use crate::settings::NewtonRaphsonSettings;
use fek_model::{ModelPart, Result};

pub struct NewtonRaphsonStrategy<S: Scheme> {
    core: StrategyCore<S>,
    settings: NewtonRaphsonSettings,
}

impl<S: Scheme> NewtonRaphsonStrategy<S> {
    pub fn new(
        scheme: S,
        linear_solver: Box<dyn LinearSolver>,
        criteria: Box<dyn ConvergenceCriteria>,
        settings: NewtonRaphsonSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let options = CoreOptions {
            max_iteration: settings.max_iteration,
            compute_reactions: settings.compute_reactions,
            reform_dofs_at_each_step: settings.reform_dofs_at_each_step,
            move_mesh_flag: settings.move_mesh_flag,
            fail_on_max_iterations: settings.fail_on_max_iterations,
            echo_level: settings.echo_level,
        };
        Ok(Self {
            core: StrategyCore::new(scheme, linear_solver, criteria, settings.builder_type, options),
            settings,
        })
    }

    pub fn settings(&self) -> &NewtonRaphsonSettings {
        &self.settings
    }

    pub fn scheme(&self) -> &S {
        &self.core.scheme
    }

    pub fn scheme_mut(&mut self) -> &mut S {
        &mut self.core.scheme
    }

    pub fn builder_and_solver(&self) -> &BuilderAndSolver {
        &self.core.builder
    }

    pub fn system(&self) -> &GlobalSystem {
        &self.core.system
    }

    pub fn set_echo_level(&mut self, echo_level: u32) {
        self.settings.echo_level = echo_level;
        self.core.options.echo_level = echo_level;
        self.core.builder.set_echo_level(echo_level);
        self.core.criteria.set_echo_level(echo_level);
    }

    /// Validate the model part against the scheme, entities and criterion.
    pub fn check(&self, model_part: &ModelPart) -> Result<()> {
        self.core.check(model_part)
    }

    pub fn initialize(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.core.initialize(model_part)
    }

    pub fn initialize_solution_step(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.core.initialize_solution_step(model_part)
    }

    pub fn predict(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.core.predict(model_part)
    }

    /// Iterate until the criterion accepts the state or `max_iteration`
    /// iterations have run.
    pub fn solve_solution_step(&mut self, model_part: &mut ModelPart) -> Result<SolutionStepReport> {
        let max_iteration = self.core.options.max_iteration;
        let mut iteration = 1;
        let mut converged = self.iterate(model_part, iteration)?;
        while !converged && iteration < max_iteration {
            iteration += 1;
            converged = self.iterate(model_part, iteration)?;
        }
        self.core.finish_iterations(model_part, converged, iteration)
    }

    pub fn finalize_solution_step(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.core.finalize_solution_step(model_part)
    }

    /// One full step: initialize (once), then the step cycle.
    pub fn solve(&mut self, model_part: &mut ModelPart) -> Result<SolutionStepReport> {
        self.initialize(model_part)?;
        self.initialize_solution_step(model_part)?;
        self.predict(model_part)?;
        let report = self.solve_solution_step(model_part)?;
        self.finalize_solution_step(model_part)?;
        Ok(report)
    }

    /// Release the DOF set and the global system.
    pub fn clear(&mut self) {
        self.core.clear();
    }

    fn iterate(&mut self, model_part: &mut ModelPart, iteration: usize) -> Result<bool> {
        let pre_converged = self.core.begin_iteration(model_part, iteration)?;

        let core = &mut self.core;
        let reuse_matrix = core.stiffness_matrix_is_built
            && if iteration == 1 {
                self.settings.use_old_stiffness_in_first_iteration
            } else {
                self.settings.keep_system_constant_during_iterations
            };
        if reuse_matrix {
            core.builder
                .build_rhs_and_solve(&core.scheme, model_part, &mut core.system)?;
        } else {
            core.builder.build_and_solve(&core.scheme, model_part, &mut core.system)?;
            core.stiffness_matrix_is_built = true;
        }

        core.update_database_with_system_increment(model_part)?;
        core.end_iteration(model_part, pre_converged)
    }
}
