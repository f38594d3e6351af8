//! Quasi-static scheme: no time derivatives, `u += Dx`.

use super::{Scheme, update_free_dofs};
use fek_model::{DofSet, ModelPart, Result};
use nalgebra::DVector;

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticScheme;

impl StaticScheme {
    pub fn new() -> Self {
        Self
    }
}

impl Scheme for StaticScheme {
    fn name(&self) -> &str {
        "static"
    }

    fn update(&mut self, dofs: &DofSet, dx: &DVector<f64>, model_part: &mut ModelPart) -> Result<()> {
        update_free_dofs(dofs, dx, model_part)
    }
}
