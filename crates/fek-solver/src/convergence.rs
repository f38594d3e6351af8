//! Convergence criteria consumed by the nonlinear strategies.
//!
//! A strategy calls the hooks in this order for every iteration:
//!
//! ```text
//! initialize_non_linear_iteration -> pre_criteria -> build/solve/update
//!     -> finalize_non_linear_iteration -> [rebuild b if actualize_rhs] -> post_criteria
//! ```
//!
//! Norms only look at free DOFs: entries `[0, free_count)` of `b` and `Dx`.

use crate::builder_and_solver::GlobalSystem;
use fek_model::{DofSet, KernelError, ModelPart, Result};
use tracing::info;

/// Read-only view of the state a criterion may inspect.
#[derive(Clone, Copy)]
pub struct CriteriaContext<'a> {
    pub model_part: &'a ModelPart,
    pub dofs: &'a DofSet,
    pub system: &'a GlobalSystem,
}

impl<'a> CriteriaContext<'a> {
    pub fn new(model_part: &'a ModelPart, dofs: &'a DofSet, system: &'a GlobalSystem) -> Self {
        Self {
            model_part,
            dofs,
            system,
        }
    }

    fn free_norm(&self, values: &nalgebra::DVector<f64>) -> f64 {
        let n = self.dofs.free_count().min(values.len());
        values.rows(0, n).norm()
    }

    fn free_count(&self) -> usize {
        self.dofs.free_count()
    }
}

pub trait ConvergenceCriteria: Send + Sync {
    fn name(&self) -> &str;

    fn set_echo_level(&mut self, echo_level: u32);

    /// Ask the strategy to rebuild `b` at the updated state before
    /// `post_criteria`.
    fn actualize_rhs(&self) -> bool {
        false
    }

    fn check(&self, _model_part: &ModelPart) -> Result<()> {
        Ok(())
    }

    fn initialize_solution_step(&mut self, _ctx: &CriteriaContext) -> Result<()> {
        Ok(())
    }

    fn initialize_non_linear_iteration(&mut self, _ctx: &CriteriaContext) -> Result<()> {
        Ok(())
    }

    /// Evaluated before the build; `false` skips `post_criteria`.
    fn pre_criteria(&mut self, _ctx: &CriteriaContext) -> Result<bool> {
        Ok(true)
    }

    fn post_criteria(&mut self, ctx: &CriteriaContext) -> Result<bool>;

    fn finalize_non_linear_iteration(&mut self, _ctx: &CriteriaContext) -> Result<()> {
        Ok(())
    }

    fn finalize_solution_step(&mut self, _ctx: &CriteriaContext) -> Result<()> {
        Ok(())
    }
}

fn check_tolerances(kind: &str, relative: f64, absolute: f64) -> Result<()> {
    if !(relative >= 0.0 && absolute >= 0.0) {
        return Err(KernelError::config(format!(
            "{} tolerances must be non-negative (relative = {}, absolute = {})",
            kind, relative, absolute
        )));
    }
    Ok(())
}

/// Residual-based criterion.
///
/// The reference norm is the residual assembled in the first iteration of
/// the step (before its update). Converged when
/// `|b| / |b_0| <= relative_tolerance` or `|b| / n_free < absolute_tolerance`.
#[derive(Debug, Clone)]
pub struct ResidualCriteria {
    relative_tolerance: f64,
    absolute_tolerance: f64,
    initial_residual_norm: f64,
    initial_residual_is_set: bool,
    current_residual_norm: f64,
    echo_level: u32,
}

impl ResidualCriteria {
    pub fn new(relative_tolerance: f64, absolute_tolerance: f64) -> Result<Self> {
        check_tolerances("residual criterion", relative_tolerance, absolute_tolerance)?;
        Ok(Self {
            relative_tolerance,
            absolute_tolerance,
            initial_residual_norm: 0.0,
            initial_residual_is_set: false,
            current_residual_norm: 0.0,
            echo_level: 0,
        })
    }

    pub fn initial_residual_norm(&self) -> f64 {
        self.initial_residual_norm
    }

    pub fn current_residual_norm(&self) -> f64 {
        self.current_residual_norm
    }
}

impl ConvergenceCriteria for ResidualCriteria {
    fn name(&self) -> &str {
        "residual_criterion"
    }

    fn set_echo_level(&mut self, echo_level: u32) {
        self.echo_level = echo_level;
    }

    fn actualize_rhs(&self) -> bool {
        true
    }

    fn initialize_solution_step(&mut self, _ctx: &CriteriaContext) -> Result<()> {
        self.initial_residual_is_set = false;
        self.initial_residual_norm = 0.0;
        Ok(())
    }

    fn finalize_non_linear_iteration(&mut self, ctx: &CriteriaContext) -> Result<()> {
        if !self.initial_residual_is_set {
            self.initial_residual_norm = ctx.free_norm(&ctx.system.b);
            self.initial_residual_is_set = true;
        }
        Ok(())
    }

    fn post_criteria(&mut self, ctx: &CriteriaContext) -> Result<bool> {
        let size = ctx.free_count();
        if size == 0 {
            return Ok(true);
        }
        self.current_residual_norm = ctx.free_norm(&ctx.system.b);
        let ratio = if self.initial_residual_norm < f64::EPSILON {
            0.0
        } else {
            self.current_residual_norm / self.initial_residual_norm
        };
        let absolute = self.current_residual_norm / size as f64;

        if self.echo_level > 0 {
            info!(
                ratio,
                expected_ratio = self.relative_tolerance,
                absolute,
                expected_absolute = self.absolute_tolerance,
                "RESIDUAL CRITERION"
            );
        }
        Ok(ratio <= self.relative_tolerance || absolute < self.absolute_tolerance)
    }
}

/// Increment-based criterion: `|Dx| / |u| <= relative_tolerance` or
/// `|Dx| / n_free <= absolute_tolerance`.
#[derive(Debug, Clone)]
pub struct DisplacementCriteria {
    relative_tolerance: f64,
    absolute_tolerance: f64,
    echo_level: u32,
}

impl DisplacementCriteria {
    pub fn new(relative_tolerance: f64, absolute_tolerance: f64) -> Result<Self> {
        check_tolerances("displacement criterion", relative_tolerance, absolute_tolerance)?;
        Ok(Self {
            relative_tolerance,
            absolute_tolerance,
            echo_level: 0,
        })
    }
}

impl ConvergenceCriteria for DisplacementCriteria {
    fn name(&self) -> &str {
        "displacement_criterion"
    }

    fn set_echo_level(&mut self, echo_level: u32) {
        self.echo_level = echo_level;
    }

    fn post_criteria(&mut self, ctx: &CriteriaContext) -> Result<bool> {
        let size = ctx.free_count();
        if size == 0 {
            return Ok(true);
        }
        let increment_norm = ctx.free_norm(&ctx.system.dx);
        let nodes = ctx.model_part.nodes();
        let mut reference_norm = 0.0;
        for dof in ctx.dofs.free() {
            let value = nodes[dof.node].value(dof.variable)?;
            reference_norm += value * value;
        }
        let mut reference_norm = f64::sqrt(reference_norm);
        if reference_norm == 0.0 {
            reference_norm = 1.0;
        }

        let ratio = increment_norm / reference_norm;
        let absolute = increment_norm / size as f64;
        if self.echo_level > 0 {
            info!(
                ratio,
                expected_ratio = self.relative_tolerance,
                absolute,
                expected_absolute = self.absolute_tolerance,
                "DISPLACEMENT CRITERION"
            );
        }
        Ok(ratio <= self.relative_tolerance || absolute <= self.absolute_tolerance)
    }
}

/// Both criteria must accept.
pub struct AndCriteria {
    first: Box<dyn ConvergenceCriteria>,
    second: Box<dyn ConvergenceCriteria>,
}

/// Either criterion may accept.
pub struct OrCriteria {
    first: Box<dyn ConvergenceCriteria>,
    second: Box<dyn ConvergenceCriteria>,
}

impl AndCriteria {
    pub fn new(first: Box<dyn ConvergenceCriteria>, second: Box<dyn ConvergenceCriteria>) -> Self {
        Self { first, second }
    }
}

impl OrCriteria {
    pub fn new(first: Box<dyn ConvergenceCriteria>, second: Box<dyn ConvergenceCriteria>) -> Self {
        Self { first, second }
    }
}

/// Both sides see every hook, so each keeps its own reference state.
macro_rules! forward_composite_hooks {
    ($name:literal, $combine:expr) => {
        fn name(&self) -> &str {
            $name
        }

        fn set_echo_level(&mut self, echo_level: u32) {
            self.first.set_echo_level(echo_level);
            self.second.set_echo_level(echo_level);
        }

        fn actualize_rhs(&self) -> bool {
            self.first.actualize_rhs() || self.second.actualize_rhs()
        }

        fn check(&self, model_part: &ModelPart) -> Result<()> {
            self.first.check(model_part)?;
            self.second.check(model_part)
        }

        fn initialize_solution_step(&mut self, ctx: &CriteriaContext) -> Result<()> {
            self.first.initialize_solution_step(ctx)?;
            self.second.initialize_solution_step(ctx)
        }

        fn initialize_non_linear_iteration(&mut self, ctx: &CriteriaContext) -> Result<()> {
            self.first.initialize_non_linear_iteration(ctx)?;
            self.second.initialize_non_linear_iteration(ctx)
        }

        fn pre_criteria(&mut self, ctx: &CriteriaContext) -> Result<bool> {
            let first = self.first.pre_criteria(ctx)?;
            let second = self.second.pre_criteria(ctx)?;
            Ok($combine(first, second))
        }

        fn post_criteria(&mut self, ctx: &CriteriaContext) -> Result<bool> {
            let first = self.first.post_criteria(ctx)?;
            let second = self.second.post_criteria(ctx)?;
            Ok($combine(first, second))
        }

        fn finalize_non_linear_iteration(&mut self, ctx: &CriteriaContext) -> Result<()> {
            self.first.finalize_non_linear_iteration(ctx)?;
            self.second.finalize_non_linear_iteration(ctx)
        }

        fn finalize_solution_step(&mut self, ctx: &CriteriaContext) -> Result<()> {
            self.first.finalize_solution_step(ctx)?;
            self.second.finalize_solution_step(ctx)
        }
    };
}

impl ConvergenceCriteria for AndCriteria {
    forward_composite_hooks!("and_criteria", |a: bool, b: bool| a && b);
}

impl ConvergenceCriteria for OrCriteria {
    forward_composite_hooks!("or_criteria", |a: bool, b: bool| a || b);
}
