//! Steady/transient heat conduction on linear triangles and bilinear quads.
//!
//! ```text
//! K = ∫ t k ∇N ∇N^T dΩ        (CONDUCTIVITY k, THICKNESS t, default 1)
//! M = ∫ t c N N^T dΩ          (HEAT_CAPACITY c, optional)
//! r = -K T
//! ```
//!
//! Every integration point must have a positive Jacobian determinant;
//! clockwise or collapsed elements are rejected with a geometry error.

use fek_model::properties::{CONDUCTIVITY, HEAT_CAPACITY, THICKNESS};
use fek_model::variables::TEMPERATURE;
use fek_model::{
    check_nodal_dofs, Element, Entity, EntityContext, EntityKind, Geometry, GeometryFamily, IntegrationMethod,
    KernelError, Properties, Result, Variable,
};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

static LAPLACIAN_DOFS: [&Variable; 1] = [&TEMPERATURE];

#[derive(Debug, Clone)]
pub struct LaplacianElement {
    id: usize,
    geometry: Geometry,
    properties: Arc<Properties>,
}

impl LaplacianElement {
    pub fn new(id: usize, geometry: Geometry, properties: Arc<Properties>) -> Result<Self> {
        match geometry.family() {
            GeometryFamily::Triangle3 | GeometryFamily::Quadrilateral4 => Ok(Self {
                id,
                geometry,
                properties,
            }),
            family => Err(KernelError::config(format!(
                "laplacian element {} needs a Triangle3 or Quadrilateral4 geometry, got {:?}",
                id, family
            ))),
        }
    }

    fn thickness(&self) -> f64 {
        self.properties.get(THICKNESS).unwrap_or(1.0)
    }

    fn conductivity_matrix(&self, ctx: &EntityContext) -> Result<DMatrix<f64>> {
        let conductivity = self.properties.require(CONDUCTIVITY, EntityKind::Element, self.id)?;
        let factor = conductivity * self.thickness();
        let n = self.geometry.len();
        let mut k = DMatrix::zeros(n, n);
        for point in self.geometry.integration_points(IntegrationMethod::GaussOrder2) {
            let (gradients, det) = self
                .geometry
                .shape_function_gradients(ctx.nodes, point.coordinates)
                .ok_or_else(|| self.degenerate(0.0))?;
            if det <= 0.0 {
                return Err(self.degenerate(det));
            }
            k += &gradients * gradients.transpose() * (factor * point.weight * det);
        }
        Ok(k)
    }

    fn degenerate(&self, det: f64) -> KernelError {
        KernelError::geometry(
            EntityKind::Element,
            self.id,
            format!("non-positive Jacobian determinant {}", det),
        )
    }

    fn temperatures(&self, ctx: &EntityContext) -> Result<DVector<f64>> {
        let values: Result<Vec<f64>> = self
            .geometry
            .points(ctx.nodes)
            .map(|node| node.value(&TEMPERATURE))
            .collect();
        Ok(DVector::from_vec(values?))
    }
}

impl Entity for LaplacianElement {
    fn id(&self) -> usize {
        self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Element
    }

    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn dof_variables(&self) -> &[&'static Variable] {
        &LAPLACIAN_DOFS
    }

    fn calculate_local_system(
        &self,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        let k = self.conductivity_matrix(ctx)?;
        *rhs = -(&k * self.temperatures(ctx)?);
        *lhs = k;
        Ok(())
    }

    fn calculate_mass_matrix(&self, ctx: &EntityContext, mass: &mut DMatrix<f64>) -> Result<()> {
        let Some(capacity) = self.properties.get(HEAT_CAPACITY) else {
            *mass = DMatrix::zeros(0, 0);
            return Ok(());
        };
        let factor = capacity * self.thickness();
        let n = self.geometry.len();
        let mut m = DMatrix::zeros(n, n);
        for point in self.geometry.integration_points(IntegrationMethod::GaussOrder2) {
            let det = self.geometry.determinant_of_jacobian(ctx.nodes, point.coordinates);
            if det <= 0.0 {
                return Err(self.degenerate(det));
            }
            let shape = self.geometry.shape_function_values(point.coordinates);
            m += &shape * shape.transpose() * (factor * point.weight * det);
        }
        *mass = m;
        Ok(())
    }

    fn check(&self, ctx: &EntityContext) -> Result<()> {
        check_nodal_dofs(self, ctx)?;
        self.properties.require(CONDUCTIVITY, EntityKind::Element, self.id)?;
        for point in self.geometry.integration_points(IntegrationMethod::GaussOrder2) {
            let det = self.geometry.determinant_of_jacobian(ctx.nodes, point.coordinates);
            if det.is_nan() || det <= 0.0 {
                return Err(self.degenerate(det));
            }
        }
        Ok(())
    }
}

impl Element for LaplacianElement {}
