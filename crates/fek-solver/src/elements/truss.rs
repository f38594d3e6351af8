//! 2-node linear truss in the xy-plane.
//!
//! The truss resists only axial forces. With direction cosines `(l, m)` from
//! node 1 to node 2:
//!
//! ```text
//! k_local  = (A*E/L) * [ 1  -1]
//!                      [-1   1]
//! T        = [l  m  0  0]
//!            [0  0  l  m]
//! K_global = T^T * k_local * T
//! ```
//!
//! Small-displacement formulation: `f_int = K_global * u`. `DENSITY` adds a
//! lumped mass of `rho*A*L/2` to each translational DOF.

use fek_model::properties::{CROSS_AREA, DENSITY, YOUNG_MODULUS};
use fek_model::variables::{DISPLACEMENT_X, DISPLACEMENT_Y};
use fek_model::{
    Element, Entity, EntityContext, EntityKind, Geometry, GeometryFamily, KernelError, Properties, Result,
    Variable,
};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

static TRUSS_DOFS: [&Variable; 2] = [&DISPLACEMENT_X, &DISPLACEMENT_Y];

#[derive(Debug, Clone)]
pub struct TrussElement2D {
    id: usize,
    geometry: Geometry,
    properties: Arc<Properties>,
}

impl TrussElement2D {
    pub fn new(id: usize, geometry: Geometry, properties: Arc<Properties>) -> Result<Self> {
        if geometry.family() != GeometryFamily::Line2 {
            return Err(KernelError::config(format!(
                "truss element {} needs a Line2 geometry, got {:?}",
                id,
                geometry.family()
            )));
        }
        Ok(Self {
            id,
            geometry,
            properties,
        })
    }

    /// Length and direction cosines in the initial configuration.
    fn direction(&self, ctx: &EntityContext) -> Result<(f64, [f64; 2])> {
        let indices = self.geometry.node_indices();
        let first = ctx.nodes[indices[0]].initial_coordinates;
        let second = ctx.nodes[indices[1]].initial_coordinates;
        let dx = second[0] - first[0];
        let dy = second[1] - first[1];
        let length = (dx * dx + dy * dy).sqrt();
        if length < 1e-10 {
            return Err(KernelError::geometry(
                EntityKind::Element,
                self.id,
                format!("zero or near-zero length: {}", length),
            ));
        }
        Ok((length, [dx / length, dy / length]))
    }

    fn stiffness_matrix(&self, ctx: &EntityContext) -> Result<DMatrix<f64>> {
        let e = self.properties.require(YOUNG_MODULUS, EntityKind::Element, self.id)?;
        let a = self.properties.require(CROSS_AREA, EntityKind::Element, self.id)?;
        let (length, [l, m]) = self.direction(ctx)?;

        let k = a * e / length;
        let k_local = DMatrix::from_row_slice(2, 2, &[k, -k, -k, k]);
        let t = DMatrix::from_row_slice(2, 4, &[l, m, 0.0, 0.0, 0.0, 0.0, l, m]);
        Ok(t.transpose() * k_local * t)
    }

    fn displacements(&self, ctx: &EntityContext) -> Result<DVector<f64>> {
        let mut u = DVector::zeros(4);
        for (a, node) in self.geometry.points(ctx.nodes).enumerate() {
            for (i, &variable) in TRUSS_DOFS.iter().enumerate() {
                u[2 * a + i] = node.value(variable)?;
            }
        }
        Ok(u)
    }
}

impl Entity for TrussElement2D {
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
        &TRUSS_DOFS
    }

    fn calculate_local_system(
        &self,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        let k = self.stiffness_matrix(ctx)?;
        *rhs = -(&k * self.displacements(ctx)?);
        *lhs = k;
        Ok(())
    }

    fn calculate_mass_matrix(&self, ctx: &EntityContext, mass: &mut DMatrix<f64>) -> Result<()> {
        let Some(rho) = self.properties.get(DENSITY) else {
            *mass = DMatrix::zeros(0, 0);
            return Ok(());
        };
        let a = self.properties.require(CROSS_AREA, EntityKind::Element, self.id)?;
        let (length, _) = self.direction(ctx)?;
        *mass = DMatrix::from_diagonal_element(4, 4, 0.5 * rho * a * length);
        Ok(())
    }

    fn check(&self, ctx: &EntityContext) -> Result<()> {
        self.properties.require(YOUNG_MODULUS, EntityKind::Element, self.id)?;
        self.properties.require(CROSS_AREA, EntityKind::Element, self.id)?;
        self.direction(ctx)?;
        for node in self.geometry.points(ctx.nodes) {
            for &variable in &TRUSS_DOFS {
                if !node.has_dof(variable) {
                    return Err(KernelError::missing(
                        EntityKind::Element,
                        self.id,
                        format!("node {} lacks DOF {}", node.id, variable),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Element for TrussElement2D {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fek_model::ModelPart;

    fn truss(x2: f64, y2: f64) -> (ModelPart, TrussElement2D) {
        let mut mp = ModelPart::new("Truss", 1);
        mp.add_nodal_solution_step_variable(&DISPLACEMENT_X);
        mp.add_nodal_solution_step_variable(&DISPLACEMENT_Y);
        let a = mp.create_node(1, 0.0, 0.0, 0.0).unwrap();
        let b = mp.create_node(2, x2, y2, 0.0).unwrap();
        mp.add_dof(&DISPLACEMENT_X);
        mp.add_dof(&DISPLACEMENT_Y);
        let properties = mp.add_properties(
            Properties::new(1)
                .with(YOUNG_MODULUS, 210000.0)
                .with(CROSS_AREA, 0.01),
        );
        let geometry = Geometry::new(GeometryFamily::Line2, vec![a, b]).unwrap();
        (mp, TrussElement2D::new(1, geometry, properties).unwrap())
    }

    #[test]
    fn horizontal_truss_stiffness() {
        let (mp, element) = truss(1.0, 0.0);
        let k = element.stiffness_matrix(&mp.context()).unwrap();
        let ae_l = 210000.0 * 0.01;
        assert_relative_eq!(k[(0, 0)], ae_l, epsilon = 1e-9);
        assert_relative_eq!(k[(0, 2)], -ae_l, epsilon = 1e-9);
        assert_relative_eq!(k[(1, 1)], 0.0, epsilon = 1e-9);
        assert_relative_eq!(k[(3, 3)], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn diagonal_truss_is_symmetric_with_rigid_body_modes() {
        let (mp, element) = truss(3.0, 4.0);
        let k = element.stiffness_matrix(&mp.context()).unwrap();
        assert_relative_eq!(k.clone(), k.transpose(), epsilon = 1e-9);

        // Translation in x produces no force.
        let translation = DVector::from_vec(vec![1.0, 0.0, 1.0, 0.0]);
        assert_relative_eq!((&k * translation).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn residual_is_minus_internal_force() {
        let (mut mp, element) = truss(2.0, 0.0);
        mp.node_mut(2).unwrap().set_value(&DISPLACEMENT_X, 1e-3).unwrap();
        let mut lhs = DMatrix::zeros(0, 0);
        let mut rhs = DVector::zeros(0);
        element.calculate_local_system(&mp.context(), &mut lhs, &mut rhs).unwrap();

        let axial = 210000.0 * 0.01 / 2.0 * 1e-3;
        assert_relative_eq!(rhs[0], axial, epsilon = 1e-12);
        assert_relative_eq!(rhs[2], -axial, epsilon = 1e-12);
    }

    #[test]
    fn zero_length_is_a_geometry_error() {
        let (mp, element) = truss(0.0, 0.0);
        let err = element.check(&mp.context()).unwrap_err();
        assert!(matches!(err, KernelError::Geometry { id: 1, .. }));
    }
}
