//! Time/iteration discretization schemes.
//!
//! A scheme sits between the builder and the entities: it decides which
//! local matrices an entity contributes (adding inertia or capacity terms
//! for transient problems) and how a solved increment is written back into
//! the nodal state.

use fek_model::{Dof, DofSet, Entity, EntityContext, KernelError, ModelPart, Result, Variable};
use nalgebra::{DMatrix, DVector};

pub mod backward_euler;
pub mod bossak;
pub mod static_scheme;

pub use backward_euler::BackwardEulerScheme;
pub use bossak::BossakScheme;
pub use static_scheme::StaticScheme;

pub trait Scheme: Send + Sync {
    fn name(&self) -> &str;

    /// One-time validation of the model part before the solution loop.
    fn check(&self, model_part: &ModelPart) -> Result<()> {
        model_part.check()
    }

    fn initialize(&mut self, _model_part: &mut ModelPart) -> Result<()> {
        Ok(())
    }

    fn initialize_solution_step(&mut self, model_part: &mut ModelPart) -> Result<()> {
        model_part.for_each_element_mut(|e, ctx| e.initialize_solution_step(ctx))?;
        model_part.for_each_condition_mut(|c, ctx| c.initialize_solution_step(ctx))
    }

    /// Extrapolate the unknowns before the first iteration of a step.
    fn predict(&mut self, _dofs: &DofSet, _model_part: &mut ModelPart) -> Result<()> {
        Ok(())
    }

    fn initialize_non_linear_iteration(&mut self, model_part: &mut ModelPart) -> Result<()> {
        model_part.for_each_element_mut(|e, ctx| e.initialize_non_linear_iteration(ctx))?;
        model_part.for_each_condition_mut(|c, ctx| c.initialize_non_linear_iteration(ctx))
    }

    fn finalize_non_linear_iteration(&mut self, model_part: &mut ModelPart) -> Result<()> {
        model_part.for_each_element_mut(|e, ctx| e.finalize_non_linear_iteration(ctx))?;
        model_part.for_each_condition_mut(|c, ctx| c.finalize_non_linear_iteration(ctx))
    }

    fn get_dof_list<E: Entity + ?Sized>(&self, entity: &E, ctx: &EntityContext) -> Result<Vec<Dof>> {
        entity.get_dof_list(ctx)
    }

    fn equation_id_vector<E: Entity + ?Sized>(&self, entity: &E, ctx: &EntityContext) -> Result<Vec<usize>> {
        entity.equation_id_vector(ctx)
    }

    fn calculate_system_contributions<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        entity.calculate_local_system(ctx, lhs, rhs)
    }

    fn calculate_lhs_contribution<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
    ) -> Result<()> {
        entity.calculate_left_hand_side(ctx, lhs)
    }

    fn calculate_rhs_contribution<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        entity.calculate_right_hand_side(ctx, rhs)
    }

    /// Write the solved increment `dx` back into the nodal state.
    fn update(&mut self, dofs: &DofSet, dx: &DVector<f64>, model_part: &mut ModelPart) -> Result<()>;

    fn finalize_solution_step(&mut self, model_part: &mut ModelPart) -> Result<()> {
        model_part.for_each_element_mut(|e, ctx| e.finalize_solution_step(ctx))?;
        model_part.for_each_condition_mut(|c, ctx| c.finalize_solution_step(ctx))
    }
}

/// `u += dx` on every free DOF. Fixed DOFs keep their prescribed value.
pub(crate) fn update_free_dofs(dofs: &DofSet, dx: &DVector<f64>, model_part: &mut ModelPart) -> Result<()> {
    let nodes = model_part.nodes_mut();
    for dof in dofs.free() {
        let id = dof
            .equation_id
            .ok_or_else(|| KernelError::config(format!("DOF {} of node {} is not numbered", dof.variable, dof.node_id)))?;
        if id >= dx.len() {
            return Err(KernelError::config(format!(
                "equation id {} outside the solution vector of size {}",
                id,
                dx.len()
            )));
        }
        *nodes[dof.node].value_mut(dof.variable)? += dx[id];
    }
    Ok(())
}

/// Which member of a variable's derivative chain to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Derivative {
    First,
    Second,
}

pub(crate) fn derivative_of(variable: &'static Variable, order: Derivative) -> Result<&'static Variable> {
    let derivative = match order {
        Derivative::First => variable.time_derivative(),
        Derivative::Second => variable.second_time_derivative(),
    };
    derivative.ok_or_else(|| {
        KernelError::config(format!("variable {} has no {:?} time derivative", variable, order))
    })
}

/// Nodal values of the entity's DOF derivatives in local row order, at the
/// given history step.
pub(crate) fn local_derivative_values<E: Entity + ?Sized>(
    entity: &E,
    ctx: &EntityContext,
    order: Derivative,
    step: usize,
) -> Result<DVector<f64>> {
    let dofs = entity.get_dof_list(ctx)?;
    let mut values = DVector::zeros(dofs.len());
    for (i, dof) in dofs.iter().enumerate() {
        let variable = derivative_of(dof.variable, order)?;
        values[i] = ctx.nodes[dof.node].value_at(variable, step)?;
    }
    Ok(values)
}

/// `rhs -= matrix * values`, skipped for entities that return an empty matrix.
pub(crate) fn subtract_product(rhs: &mut DVector<f64>, matrix: &DMatrix<f64>, values: &DVector<f64>) -> Result<()> {
    if matrix.is_empty() {
        return Ok(());
    }
    if matrix.nrows() != rhs.len() || matrix.ncols() != values.len() {
        return Err(KernelError::config(format!(
            "transient matrix of size {}x{} does not match a local system of size {}",
            matrix.nrows(),
            matrix.ncols(),
            rhs.len()
        )));
    }
    rhs.gemv(-1.0, matrix, values, 1.0);
    Ok(())
}

/// `lhs += factor * matrix`, skipped for empty matrices.
pub(crate) fn add_scaled(lhs: &mut DMatrix<f64>, matrix: &DMatrix<f64>, factor: f64) -> Result<()> {
    if matrix.is_empty() {
        return Ok(());
    }
    if matrix.shape() != lhs.shape() {
        return Err(KernelError::config(format!(
            "transient matrix of size {:?} does not match a local LHS of size {:?}",
            matrix.shape(),
            lhs.shape()
        )));
    }
    *lhs += matrix * factor;
    Ok(())
}
