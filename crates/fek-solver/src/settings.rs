//! Strategy configuration.
//!
//! Settings are plain serde structs read from JSON. Unknown keys are
//! rejected and every value is validated before a strategy is built, so a
//! bad configuration fails before any numerical work.
//!
//! ```json
//! {
//!     "name": "arc_length_strategy",
//!     "max_iteration": 10,
//!     "desired_iterations": 4,
//!     "max_radius_factor": 10.0,
//!     "min_radius_factor": 0.1,
//!     "loads_sub_model_part_list": ["PointLoad3D_tip"],
//!     "loads_variable_list": ["POINT_LOAD_X"]
//! }
//! ```

use crate::builder_and_solver::DirichletPolicy;
use fek_model::{KernelError, Result};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

pub const NEWTON_RAPHSON_NAME: &str = "newton_raphson_strategy";
pub const ARC_LENGTH_NAME: &str = "arc_length_strategy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NewtonRaphsonSettings {
    pub name: String,
    pub max_iteration: usize,
    pub compute_reactions: bool,
    pub reform_dofs_at_each_step: bool,
    pub move_mesh_flag: bool,
    /// Build `A` once per step and only rebuild `b` afterwards.
    pub keep_system_constant_during_iterations: bool,
    /// Reuse the previous step's `A` in the first iteration.
    pub use_old_stiffness_in_first_iteration: bool,
    /// Turn a non-converged step into `MaxIterationsExceeded`.
    pub fail_on_max_iterations: bool,
    pub echo_level: u32,
    pub builder_type: DirichletPolicy,
}

impl Default for NewtonRaphsonSettings {
    fn default() -> Self {
        Self {
            name: NEWTON_RAPHSON_NAME.to_string(),
            max_iteration: 10,
            compute_reactions: false,
            reform_dofs_at_each_step: false,
            move_mesh_flag: false,
            keep_system_constant_during_iterations: false,
            use_old_stiffness_in_first_iteration: false,
            fail_on_max_iterations: false,
            echo_level: 0,
            builder_type: DirichletPolicy::Elimination,
        }
    }
}

impl NewtonRaphsonSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = parse(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        check_name(&self.name, NEWTON_RAPHSON_NAME)?;
        check_max_iteration(self.max_iteration)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ArcLengthSettings {
    pub name: String,
    pub max_iteration: usize,
    pub compute_reactions: bool,
    pub reform_dofs_at_each_step: bool,
    pub move_mesh_flag: bool,
    pub fail_on_max_iterations: bool,
    pub echo_level: u32,
    pub builder_type: DirichletPolicy,
    /// Predict with the last assembled `A` instead of a fresh tangent.
    pub use_old_stiffness_in_first_iteration: bool,
    pub desired_iterations: usize,
    pub max_radius_factor: f64,
    pub min_radius_factor: f64,
    /// Sub-model-parts whose loads follow the load factor, paired
    /// one-to-one with `loads_variable_list`.
    pub loads_sub_model_part_list: Vec<String>,
    pub loads_variable_list: Vec<String>,
    /// Times a step is retried with half the radius after a singular
    /// corrector. Zero surfaces the error immediately.
    pub radius_reduction_retries: usize,
}

impl Default for ArcLengthSettings {
    fn default() -> Self {
        Self {
            name: ARC_LENGTH_NAME.to_string(),
            max_iteration: 10,
            compute_reactions: false,
            reform_dofs_at_each_step: false,
            move_mesh_flag: false,
            fail_on_max_iterations: false,
            echo_level: 0,
            builder_type: DirichletPolicy::Elimination,
            use_old_stiffness_in_first_iteration: false,
            desired_iterations: 4,
            max_radius_factor: 10.0,
            min_radius_factor: 0.1,
            loads_sub_model_part_list: Vec::new(),
            loads_variable_list: Vec::new(),
            radius_reduction_retries: 0,
        }
    }
}

impl ArcLengthSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = parse(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        check_name(&self.name, ARC_LENGTH_NAME)?;
        check_max_iteration(self.max_iteration)?;
        if self.desired_iterations == 0 {
            return Err(KernelError::config("desired_iterations must be at least 1"));
        }
        if !(self.min_radius_factor > 0.0 && self.min_radius_factor.is_finite()) {
            return Err(KernelError::config(format!(
                "min_radius_factor must be positive, got {}",
                self.min_radius_factor
            )));
        }
        if !(self.max_radius_factor >= self.min_radius_factor && self.max_radius_factor.is_finite()) {
            return Err(KernelError::config(format!(
                "max_radius_factor ({}) must not be smaller than min_radius_factor ({})",
                self.max_radius_factor, self.min_radius_factor
            )));
        }
        if self.loads_sub_model_part_list.len() != self.loads_variable_list.len() {
            return Err(KernelError::config(format!(
                "for each sub-model-part there must be a corresponding variable: {} sub-model-parts, {} variables",
                self.loads_sub_model_part_list.len(),
                self.loads_variable_list.len()
            )));
        }
        Ok(())
    }

    /// The options shared with Newton-Raphson.
    pub fn newton_raphson(&self) -> NewtonRaphsonSettings {
        NewtonRaphsonSettings {
            name: NEWTON_RAPHSON_NAME.to_string(),
            max_iteration: self.max_iteration,
            compute_reactions: self.compute_reactions,
            reform_dofs_at_each_step: self.reform_dofs_at_each_step,
            move_mesh_flag: self.move_mesh_flag,
            keep_system_constant_during_iterations: false,
            use_old_stiffness_in_first_iteration: self.use_old_stiffness_in_first_iteration,
            fail_on_max_iterations: self.fail_on_max_iterations,
            echo_level: self.echo_level,
            builder_type: self.builder_type,
        }
    }
}

fn parse<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| KernelError::config(format!("invalid strategy settings: {}", e)))
}

fn check_name(name: &str, expected: &str) -> Result<()> {
    if name != expected {
        return Err(KernelError::config(format!(
            "settings name '{}' does not match '{}'",
            name, expected
        )));
    }
    Ok(())
}

fn check_max_iteration(max_iteration: usize) -> Result<()> {
    if max_iteration == 0 {
        return Err(KernelError::config("max_iteration must be at least 1"));
    }
    Ok(())
}
