//! First-order implicit (backward Euler) scheme for `M u' + f_int(u) = f_ext`.
//!
//! ```text
//! u'    = (u - u_n) / dt
//! LHS   = K + M / dt
//! RHS   = r - M u'
//! ```
//!
//! `M` is the entity's mass (capacity) matrix. The derivative variable of
//! every DOF (e.g. `TEMPERATURE_RATE` for `TEMPERATURE`) must be registered
//! on the nodes.

use super::{Derivative, Scheme, add_scaled, derivative_of, local_derivative_values, subtract_product, update_free_dofs};
use fek_model::{DofSet, Entity, EntityContext, KernelError, ModelPart, Result};
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, Default)]
pub struct BackwardEulerScheme {
    delta_time: f64,
}

impl BackwardEulerScheme {
    pub fn new() -> Self {
        Self::default()
    }

    fn inertia_terms<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        lhs: Option<&mut DMatrix<f64>>,
        rhs: Option<&mut DVector<f64>>,
    ) -> Result<()> {
        let mut mass = DMatrix::zeros(0, 0);
        entity.calculate_mass_matrix(ctx, &mut mass)?;
        if let Some(lhs) = lhs {
            add_scaled(lhs, &mass, 1.0 / self.delta_time)?;
        }
        if let Some(rhs) = rhs {
            if !mass.is_empty() {
                let rate = local_derivative_values(entity, ctx, Derivative::First, 0)?;
                subtract_product(rhs, &mass, &rate)?;
            }
        }
        Ok(())
    }

    fn update_derivatives(&self, dofs: &DofSet, model_part: &mut ModelPart) -> Result<()> {
        let nodes = model_part.nodes_mut();
        for dof in dofs.iter() {
            let rate = derivative_of(dof.variable, Derivative::First)?;
            let node = &mut nodes[dof.node];
            let value = node.value(dof.variable)?;
            let previous = node.value_at(dof.variable, 1)?;
            node.set_value(rate, (value - previous) / self.delta_time)?;
        }
        Ok(())
    }
}

impl Scheme for BackwardEulerScheme {
    fn name(&self) -> &str {
        "backward_euler"
    }

    fn check(&self, model_part: &ModelPart) -> Result<()> {
        if model_part.buffer_size() < 2 {
            return Err(KernelError::config(format!(
                "backward Euler needs a buffer size of at least 2, model part {} has {}",
                model_part.name,
                model_part.buffer_size()
            )));
        }
        model_part.check()
    }

    fn initialize_solution_step(&mut self, model_part: &mut ModelPart) -> Result<()> {
        let delta_time = model_part.process_info().delta_time();
        if delta_time <= 0.0 || !delta_time.is_finite() {
            return Err(KernelError::config(format!(
                "backward Euler needs a positive DELTA_TIME, got {}",
                delta_time
            )));
        }
        self.delta_time = delta_time;
        model_part.for_each_element_mut(|e, ctx| e.initialize_solution_step(ctx))?;
        model_part.for_each_condition_mut(|c, ctx| c.initialize_solution_step(ctx))
    }

    /// Keep `u = u_n`, so the rate starts at zero.
    fn predict(&mut self, dofs: &DofSet, model_part: &mut ModelPart) -> Result<()> {
        let nodes = model_part.nodes_mut();
        for dof in dofs.free() {
            let node = &mut nodes[dof.node];
            let previous = node.value_at(dof.variable, 1)?;
            node.set_value(dof.variable, previous)?;
        }
        self.update_derivatives(dofs, model_part)
    }

    fn calculate_system_contributions<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        entity.calculate_local_system(ctx, lhs, rhs)?;
        self.inertia_terms(entity, ctx, Some(lhs), Some(rhs))
    }

    fn calculate_lhs_contribution<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
    ) -> Result<()> {
        entity.calculate_left_hand_side(ctx, lhs)?;
        self.inertia_terms(entity, ctx, Some(lhs), None)
    }

    fn calculate_rhs_contribution<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        entity.calculate_right_hand_side(ctx, rhs)?;
        self.inertia_terms(entity, ctx, None, Some(rhs))
    }

    fn update(&mut self, dofs: &DofSet, dx: &DVector<f64>, model_part: &mut ModelPart) -> Result<()> {
        update_free_dofs(dofs, dx, model_part)?;
        self.update_derivatives(dofs, model_part)
    }
}
