//! Bossak-alpha scheme for second-order problems `M u'' + D u' + f_int(u) = f_ext`.
//!
//! With `alpha = 0` this is the Newmark average-acceleration rule.
//!
//! ```text
//! beta  = (1 - alpha)^2 / 4        gamma = 1/2 - alpha
//! a     = (u - u_n) / (beta dt^2) - v_n / (beta dt) - (1/(2 beta) - 1) a_n
//! v     = gamma (u - u_n) / (beta dt) - (gamma/beta - 1) v_n - dt/2 (gamma/beta - 2) a_n
//! LHS   = K + (1 - alpha) / (beta dt^2) M + gamma / (beta dt) D
//! RHS   = r - M ((1 - alpha) a + alpha a_n) - D v
//! ```

use super::{Derivative, Scheme, add_scaled, derivative_of, local_derivative_values, subtract_product, update_free_dofs};
use fek_model::{DofSet, Entity, EntityContext, KernelError, ModelPart, Result};
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, Copy, PartialEq)]
struct NewmarkCoefficients {
    c0: f64,
    c1: f64,
    c2: f64,
    c3: f64,
    c4: f64,
    c5: f64,
}

impl NewmarkCoefficients {
    fn new(alpha: f64, dt: f64) -> Self {
        let beta = 0.25 * (1.0 - alpha) * (1.0 - alpha);
        let gamma = 0.5 - alpha;
        Self {
            c0: 1.0 / (beta * dt * dt),
            c1: gamma / (beta * dt),
            c2: 1.0 / (beta * dt),
            c3: 0.5 / beta - 1.0,
            c4: gamma / beta - 1.0,
            c5: 0.5 * dt * (gamma / beta - 2.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BossakScheme {
    alpha: f64,
    delta_time: f64,
    coefficients: Option<NewmarkCoefficients>,
}

impl BossakScheme {
    /// `alpha` is usually in `[-0.3, 0]`; more negative means more
    /// high-frequency dissipation.
    pub fn new(alpha: f64) -> Result<Self> {
        if !(-1.0 / 3.0..=0.0).contains(&alpha) {
            return Err(KernelError::config(format!(
                "Bossak alpha must lie in [-1/3, 0], got {}",
                alpha
            )));
        }
        Ok(Self {
            alpha,
            delta_time: 0.0,
            coefficients: None,
        })
    }

    /// Plain Newmark (average acceleration).
    pub fn newmark() -> Self {
        Self {
            alpha: 0.0,
            delta_time: 0.0,
            coefficients: None,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        0.25 * (1.0 - self.alpha) * (1.0 - self.alpha)
    }

    pub fn gamma(&self) -> f64 {
        0.5 - self.alpha
    }

    fn coefficients(&self) -> Result<NewmarkCoefficients> {
        self.coefficients
            .ok_or_else(|| KernelError::config("Bossak scheme used before initialize_solution_step"))
    }

    fn dynamic_terms<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        lhs: Option<&mut DMatrix<f64>>,
        rhs: Option<&mut DVector<f64>>,
    ) -> Result<()> {
        let c = self.coefficients()?;
        let mut mass = DMatrix::zeros(0, 0);
        let mut damping = DMatrix::zeros(0, 0);
        entity.calculate_mass_matrix(ctx, &mut mass)?;
        entity.calculate_damping_matrix(ctx, &mut damping)?;

        if let Some(lhs) = lhs {
            add_scaled(lhs, &mass, (1.0 - self.alpha) * c.c0)?;
            add_scaled(lhs, &damping, c.c1)?;
        }
        if let Some(rhs) = rhs {
            if !mass.is_empty() {
                let a = local_derivative_values(entity, ctx, Derivative::Second, 0)?;
                let a_n = local_derivative_values(entity, ctx, Derivative::Second, 1)?;
                let weighted = a * (1.0 - self.alpha) + a_n * self.alpha;
                subtract_product(rhs, &mass, &weighted)?;
            }
            if !damping.is_empty() {
                let v = local_derivative_values(entity, ctx, Derivative::First, 0)?;
                subtract_product(rhs, &damping, &v)?;
            }
        }
        Ok(())
    }

    /// Newmark recovery of velocity and acceleration from the current
    /// displacement of every DOF.
    fn update_derivatives(&self, dofs: &DofSet, model_part: &mut ModelPart) -> Result<()> {
        let c = self.coefficients()?;
        let nodes = model_part.nodes_mut();
        for dof in dofs.iter() {
            let velocity = derivative_of(dof.variable, Derivative::First)?;
            let acceleration = derivative_of(dof.variable, Derivative::Second)?;
            let node = &mut nodes[dof.node];

            let delta = node.value(dof.variable)? - node.value_at(dof.variable, 1)?;
            let v_n = node.value_at(velocity, 1)?;
            let a_n = node.value_at(acceleration, 1)?;

            node.set_value(velocity, c.c1 * delta - c.c4 * v_n - c.c5 * a_n)?;
            node.set_value(acceleration, c.c0 * delta - c.c2 * v_n - c.c3 * a_n)?;
        }
        Ok(())
    }
}

impl Scheme for BossakScheme {
    fn name(&self) -> &str {
        "bossak"
    }

    fn check(&self, model_part: &ModelPart) -> Result<()> {
        if model_part.buffer_size() < 2 {
            return Err(KernelError::config(format!(
                "Bossak scheme needs a buffer size of at least 2, model part {} has {}",
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
                "Bossak scheme needs a positive DELTA_TIME, got {}",
                delta_time
            )));
        }
        self.delta_time = delta_time;
        self.coefficients = Some(NewmarkCoefficients::new(self.alpha, delta_time));
        model_part.for_each_element_mut(|e, ctx| e.initialize_solution_step(ctx))?;
        model_part.for_each_condition_mut(|c, ctx| c.initialize_solution_step(ctx))
    }

    /// Constant-acceleration predictor on free DOFs:
    /// `u = u_n + dt v_n + dt^2/2 a_n`.
    fn predict(&mut self, dofs: &DofSet, model_part: &mut ModelPart) -> Result<()> {
        let dt = self.delta_time;
        let nodes = model_part.nodes_mut();
        for dof in dofs.free() {
            let velocity = derivative_of(dof.variable, Derivative::First)?;
            let acceleration = derivative_of(dof.variable, Derivative::Second)?;
            let node = &mut nodes[dof.node];
            let u_n = node.value_at(dof.variable, 1)?;
            let v_n = node.value_at(velocity, 1)?;
            let a_n = node.value_at(acceleration, 1)?;
            node.set_value(dof.variable, u_n + dt * v_n + 0.5 * dt * dt * a_n)?;
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
        self.dynamic_terms(entity, ctx, Some(lhs), Some(rhs))
    }

    fn calculate_lhs_contribution<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
    ) -> Result<()> {
        entity.calculate_left_hand_side(ctx, lhs)?;
        self.dynamic_terms(entity, ctx, Some(lhs), None)
    }

    fn calculate_rhs_contribution<E: Entity + ?Sized>(
        &self,
        entity: &E,
        ctx: &EntityContext,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        entity.calculate_right_hand_side(ctx, rhs)?;
        self.dynamic_terms(entity, ctx, None, Some(rhs))
    }

    fn update(&mut self, dofs: &DofSet, dx: &DVector<f64>, model_part: &mut ModelPart) -> Result<()> {
        update_free_dofs(dofs, dx, model_part)?;
        self.update_derivatives(dofs, model_part)
    }
}
