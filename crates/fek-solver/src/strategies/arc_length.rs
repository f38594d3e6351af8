//! Riks/Ramm arc-length continuation.
//!
//! The load factor `λ` becomes an unknown next to the displacements, so the
//! equilibrium path can be followed past limit points where load control
//! fails. Per step:
//!
//! ```text
//! predictor:  Dxf = A^-1 f              Δλ = s * radius / |Dxf|
//!             DxPred = Δλ Dxf           λ += Δλ
//! corrector:  Dxf = A^-1 f,  Dxb = A^-1 b
//!             δλ = -(DxPred . Dxb) / (DxPred . Dxf)
//!             Dx = Dxb + δλ Dxf         λ += δλ
//! ```
//!
//! `f` is the reference load vector, assembled once at the first step.
//! The sign `s` follows the previous step's increment so the path does not
//! double back after a limit point. After every step the radius is scaled by
//! `sqrt(desired_iterations / iterations)` and clamped to
//! `[min_radius_factor, max_radius_factor] * radius_0`.
//!
//! With `use_old_stiffness_in_first_iteration` the predictor solves with the
//! last assembled `A` instead of the tangent at the start of the step.
//!
//! ## Load scaling
//!
//! The strategy rescales the loads listed in the settings each time `λ`
//! changes. Nodal scalar loads are multiplied by `λ / λ_old`. Condition
//! vector loads get the same ratio inside the corrector loop but are
//! multiplied by the full `λ` in the predictor, which assumes their value
//! was reset to the reference load at the start of the step.

use super::{CoreOptions, SolutionStepReport, StrategyCore};
use crate::backend::LinearSolver;
use crate::builder_and_solver::{BuilderAndSolver, GlobalSystem};
use crate::convergence::ConvergenceCriteria;
use crate::scheme::Scheme;
use crate::settings::ArcLengthSettings;
use fek_model::process_info::LOAD_FACTOR;
use fek_model::{KernelError, ModelPart, Result, VariableRef};
use nalgebra::DVector;
use tracing::{debug, info, warn};

/// Relative size of `DxPred . Dxf` below which the corrector is singular.
const SINGULAR_STEP_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone)]
struct LoadTarget {
    sub_model_part: String,
    variable: VariableRef,
}

/// State restored when a singular step is retried.
struct StepSnapshot {
    dof_values: Vec<f64>,
    lambda: f64,
    lambda_old: f64,
}

pub struct ArcLengthStrategy<S: Scheme> {
    core: StrategyCore<S>,
    settings: ArcLengthSettings,
    loads: Vec<LoadTarget>,
    f: DVector<f64>,
    dxf: DVector<f64>,
    dx_pred: DVector<f64>,
    dx_step: DVector<f64>,
    previous_dx_step: Option<DVector<f64>>,
    radius: f64,
    radius_0: f64,
    lambda: f64,
    lambda_old: f64,
    d_lambda_step: f64,
    /// Product of the factors applied to condition loads in this attempt.
    condition_factor_applied: f64,
    arc_length_is_initialized: bool,
    inside_iteration_loop: bool,
}

impl<S: Scheme> ArcLengthStrategy<S> {
    /// Resolve the load list against `model_part`. Every sub-model-part must
    /// exist and every variable must be a registered nodal scalar or
    /// condition vector.
    pub fn new(
        scheme: S,
        linear_solver: Box<dyn LinearSolver>,
        criteria: Box<dyn ConvergenceCriteria>,
        settings: ArcLengthSettings,
        model_part: &ModelPart,
    ) -> Result<Self> {
        settings.validate()?;
        let mut loads = Vec::with_capacity(settings.loads_sub_model_part_list.len());
        for (name, variable) in settings
            .loads_sub_model_part_list
            .iter()
            .zip(&settings.loads_variable_list)
        {
            model_part.sub_model_part(name)?;
            let variable = model_part.variables().resolve(variable).ok_or_else(|| {
                KernelError::config(format!(
                    "load variable '{}' of sub-model-part '{}' is not registered as a nodal scalar or condition vector",
                    variable, name
                ))
            })?;
            loads.push(LoadTarget {
                sub_model_part: name.clone(),
                variable,
            });
        }

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
            loads,
            f: DVector::zeros(0),
            dxf: DVector::zeros(0),
            dx_pred: DVector::zeros(0),
            dx_step: DVector::zeros(0),
            previous_dx_step: None,
            radius: 0.0,
            radius_0: 0.0,
            lambda: 0.0,
            lambda_old: 1.0,
            d_lambda_step: 0.0,
            condition_factor_applied: 1.0,
            arc_length_is_initialized: false,
            inside_iteration_loop: false,
        })
    }

    pub fn settings(&self) -> &ArcLengthSettings {
        &self.settings
    }

    /// Current load factor.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Load factor increment accumulated in the current step.
    pub fn d_lambda_step(&self) -> f64 {
        self.d_lambda_step
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Norm of the linear response to the reference load.
    pub fn radius_0(&self) -> f64 {
        self.radius_0
    }

    /// Reference load vector `f`.
    pub fn reference_load(&self) -> &DVector<f64> {
        &self.f
    }

    /// Displacement increment accumulated in the current step.
    pub fn step_increment(&self) -> &DVector<f64> {
        &self.dx_step
    }

    pub fn scheme(&self) -> &S {
        &self.core.scheme
    }

    pub fn builder_and_solver(&self) -> &BuilderAndSolver {
        &self.core.builder
    }

    pub fn system(&self) -> &GlobalSystem {
        &self.core.system
    }

    pub fn check(&self, model_part: &ModelPart) -> Result<()> {
        self.core.check(model_part)
    }

    pub fn initialize(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.core.initialize(model_part)
    }

    /// On the first call, solve the linear problem under the reference load
    /// to fix `radius_0` and `f`, and start from `λ = 0`.
    pub fn initialize_solution_step(&mut self, model_part: &mut ModelPart) -> Result<()> {
        if !self.arc_length_is_initialized {
            if !self.core.dof_set_is_initialized() {
                self.core.set_up_system(model_part)?;
            }
            let core = &mut self.core;
            core.builder.build_and_solve(&core.scheme, model_part, &mut core.system)?;
            core.stiffness_matrix_is_built = true;

            let radius_0 = core.system.dx.norm();
            if !(radius_0 > 0.0 && radius_0.is_finite()) {
                return Err(KernelError::config(format!(
                    "the reference load produces a displacement of norm {}; arc-length needs a non-zero load",
                    radius_0
                )));
            }
            self.radius_0 = radius_0;
            self.radius = radius_0;

            self.f = DVector::zeros(core.system.size());
            core.builder.build_rhs(&core.scheme, model_part, &mut self.f)?;

            self.lambda = 0.0;
            self.lambda_old = 1.0;
            self.arc_length_is_initialized = true;
            if self.settings.echo_level > 0 {
                info!(radius_0, "arc-length initialized");
            }
        }

        self.core.initialize_solution_step(model_part)?;

        let size = self.core.system.size();
        if self.f.len() != size {
            self.f = self.f.clone().resize_vertically(size, 0.0);
        }
        self.dxf = DVector::zeros(size);
        self.dx_pred = DVector::zeros(size);
        self.dx_step = DVector::zeros(size);
        if self
            .previous_dx_step
            .as_ref()
            .is_some_and(|previous| previous.len() != size)
        {
            self.previous_dx_step = None;
        }
        self.d_lambda_step = 0.0;
        Ok(())
    }

    pub fn predict(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.core.predict(model_part)
    }

    /// Predictor plus corrector iterations. A singular corrector is retried
    /// with half the radius up to `radius_reduction_retries` times, starting
    /// again from the state at the beginning of the step.
    pub fn solve_solution_step(&mut self, model_part: &mut ModelPart) -> Result<SolutionStepReport> {
        let snapshot = StepSnapshot {
            dof_values: self.core.builder.dof_set().values(model_part.nodes())?,
            lambda: self.lambda,
            lambda_old: self.lambda_old,
        };
        let mut retries_left = self.settings.radius_reduction_retries;
        loop {
            match self.solve_arc_length_step(model_part) {
                Err(KernelError::SingularArcLengthStep { denominator }) if retries_left > 0 => {
                    retries_left -= 1;
                    self.restore(model_part, &snapshot)?;
                    let min_radius = self.settings.min_radius_factor * self.radius_0;
                    self.radius = (0.5 * self.radius).max(min_radius);
                    warn!(
                        denominator,
                        radius = self.radius,
                        "singular arc-length step, retrying with a smaller radius"
                    );
                }
                other => return other,
            }
        }
    }

    /// Adapt the radius to the iteration count and run the finalize hooks.
    pub fn finalize_solution_step(&mut self, model_part: &mut ModelPart) -> Result<()> {
        let iterations = model_part.process_info().iteration().max(1);
        let factor = (self.settings.desired_iterations as f64 / iterations as f64).sqrt();
        self.radius = (self.radius * factor).clamp(
            self.settings.min_radius_factor * self.radius_0,
            self.settings.max_radius_factor * self.radius_0,
        );
        if self.settings.echo_level > 0 {
            info!(lambda = self.lambda, radius = self.radius, "arc-length step finalized");
        }
        self.previous_dx_step = Some(self.dx_step.clone());
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

    /// Forget the reference load and the DOF set; the next step starts over.
    pub fn clear(&mut self) {
        self.core.clear();
        self.arc_length_is_initialized = false;
        self.previous_dx_step = None;
    }

    fn solve_arc_length_step(&mut self, model_part: &mut ModelPart) -> Result<SolutionStepReport> {
        self.inside_iteration_loop = false;
        self.condition_factor_applied = 1.0;
        let mut iteration = 1;
        let pre_converged = self.core.begin_iteration(model_part, iteration)?;
        self.predictor(model_part)?;
        let mut converged = self.core.end_iteration(model_part, pre_converged)?;

        while !converged && iteration < self.core.options.max_iteration {
            iteration += 1;
            self.inside_iteration_loop = true;
            let pre_converged = self.core.begin_iteration(model_part, iteration)?;
            self.corrector(model_part)?;
            converged = self.core.end_iteration(model_part, pre_converged)?;
        }
        self.core.finish_iterations(model_part, converged, iteration)
    }

    fn predictor(&mut self, model_part: &mut ModelPart) -> Result<()> {
        let core = &mut self.core;
        // `b` is replaced by the reference load, so only `A` is assembled.
        let reuse_matrix = core.stiffness_matrix_is_built && self.settings.use_old_stiffness_in_first_iteration;
        if !reuse_matrix {
            core.builder.build_lhs(&core.scheme, model_part, &mut core.system)?;
            core.builder.apply_dirichlet_conditions(&mut core.system);
            core.stiffness_matrix_is_built = true;
        }
        core.system.b.copy_from(&self.f);
        core.builder.system_solve(&mut core.system)?;
        self.dxf.copy_from(&core.system.dx);

        let norm = self.dxf.norm();
        if !(norm > 0.0 && norm.is_finite()) {
            return Err(KernelError::SingularArcLengthStep { denominator: norm });
        }
        let sign = match &self.previous_dx_step {
            Some(previous) if self.dxf.dot(previous) < 0.0 => -1.0,
            _ => 1.0,
        };
        let delta_lambda = sign * self.radius / norm;
        self.d_lambda_step = delta_lambda;
        self.lambda += delta_lambda;
        self.dx_pred = &self.dxf * delta_lambda;
        self.dx_step.copy_from(&self.dx_pred);

        if self.settings.echo_level > 1 {
            debug!(delta_lambda, lambda = self.lambda, "arc-length predictor");
        }
        self.core.update_database(model_part, &self.dx_pred)?;
        self.update_external_loads(model_part)
    }

    fn corrector(&mut self, model_part: &mut ModelPart) -> Result<()> {
        let core = &mut self.core;
        core.builder.build(&core.scheme, model_part, &mut core.system)?;
        core.builder.apply_dirichlet_conditions(&mut core.system);
        self.dxf = core.builder.solve_for(&core.system.a, &self.f)?;
        core.builder.system_solve(&mut core.system)?;
        let dxb = &core.system.dx;

        let denominator = self.dx_pred.dot(&self.dxf);
        let scale = self.dx_pred.norm() * self.dxf.norm();
        if !denominator.is_finite() || denominator.abs() <= SINGULAR_STEP_TOLERANCE * scale {
            return Err(KernelError::SingularArcLengthStep { denominator });
        }
        let delta_lambda = -self.dx_pred.dot(dxb) / denominator;
        let dx = dxb + &self.dxf * delta_lambda;

        self.d_lambda_step += delta_lambda;
        self.lambda += delta_lambda;
        self.dx_step += &dx;
        core.system.dx = dx;

        if self.settings.echo_level > 1 {
            debug!(delta_lambda, lambda = self.lambda, "arc-length corrector");
        }
        self.core.update_database_with_system_increment(model_part)?;
        self.update_external_loads(model_part)
    }

    /// Bring the listed loads in line with the current `λ`.
    fn update_external_loads(&mut self, model_part: &mut ModelPart) -> Result<()> {
        if self.lambda_old == 0.0 {
            return Err(KernelError::SingularArcLengthStep { denominator: 0.0 });
        }
        let ratio = self.lambda / self.lambda_old;
        let condition_factor = if self.inside_iteration_loop { ratio } else { self.lambda };
        self.scale_loads(model_part, ratio, condition_factor)?;
        self.condition_factor_applied *= condition_factor;
        self.lambda_old = self.lambda;
        model_part.process_info_mut().set_real(LOAD_FACTOR, self.lambda);
        Ok(())
    }

    fn scale_loads(&self, model_part: &mut ModelPart, nodal_factor: f64, condition_factor: f64) -> Result<()> {
        for target in &self.loads {
            let sub_model_part = model_part.sub_model_part(&target.sub_model_part)?;
            match target.variable {
                VariableRef::Scalar(variable) => {
                    let indices: Vec<_> = sub_model_part.node_indices().collect();
                    let nodes = model_part.nodes_mut();
                    for index in indices {
                        *nodes[index].value_mut(variable)? *= nodal_factor;
                    }
                }
                VariableRef::Vector(variable) => {
                    let positions: Vec<_> = sub_model_part.condition_positions().collect();
                    let conditions = model_part.conditions_mut();
                    for position in positions {
                        conditions[position].data_mut().scale(variable, condition_factor);
                    }
                }
            }
        }
        Ok(())
    }

    /// Undo a failed attempt: DOF values, load factor and loads return to
    /// their state at the start of the step. Time derivatives are not
    /// restored.
    fn restore(&mut self, model_part: &mut ModelPart, snapshot: &StepSnapshot) -> Result<()> {
        self.core
            .builder
            .dof_set()
            .set_values(model_part.nodes_mut(), &snapshot.dof_values)?;
        if self.lambda_old == 0.0 || self.condition_factor_applied == 0.0 {
            return Err(KernelError::SingularArcLengthStep { denominator: 0.0 });
        }
        let nodal_factor = snapshot.lambda_old / self.lambda_old;
        let condition_factor = 1.0 / self.condition_factor_applied;
        self.scale_loads(model_part, nodal_factor, condition_factor)?;
        self.condition_factor_applied = 1.0;
        self.lambda = snapshot.lambda;
        self.lambda_old = snapshot.lambda_old;
        model_part.process_info_mut().set_real(LOAD_FACTOR, self.lambda);
        if self.core.options.move_mesh_flag {
            super::move_mesh(model_part)?;
        }
        self.dx_pred.fill(0.0);
        self.dx_step.fill(0.0);
        self.d_lambda_step = 0.0;
        Ok(())
    }
}
