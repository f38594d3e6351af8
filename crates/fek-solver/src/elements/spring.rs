//! 2-node axial spring acting on one scalar DOF per node.
//!
//! With elongation `e = u_2 - u_1`, spring force `N(e)` and tangent
//! `k(e) = dN/de`:
//!
//! ```text
//! f_int = [-N, N]
//! K_T   = k * [ 1  -1]
//!             [-1   1]
//! ```
//!
//! The force law is pluggable through [`SpringLaw`]; the default reads
//! `STIFFNESS` from the properties. `NODAL_MASS` adds a lumped mass per node
//! and `DAMPING_COEFFICIENT` a dashpot in parallel.

use fek_model::properties::{DAMPING_COEFFICIENT, NODAL_MASS, STIFFNESS};
use fek_model::{
    check_nodal_dofs, Element, Entity, EntityContext, EntityKind, Geometry, GeometryFamily, KernelError, Properties, Result,
    Variable,
};
use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;
use std::sync::Arc;

/// Force-elongation relation of a spring.
pub trait SpringLaw: Send + Sync + Debug {
    fn force(&self, elongation: f64, properties: &Properties) -> Result<f64>;

    fn tangent(&self, elongation: f64, properties: &Properties) -> Result<f64>;

    /// Parameters the law reads, validated once before the solution loop.
    fn check(&self, _properties: &Properties) -> Result<()> {
        Ok(())
    }
}

/// `N = STIFFNESS * e`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearSpringLaw;

impl SpringLaw for LinearSpringLaw {
    fn force(&self, elongation: f64, properties: &Properties) -> Result<f64> {
        Ok(self.tangent(elongation, properties)? * elongation)
    }

    fn tangent(&self, _elongation: f64, properties: &Properties) -> Result<f64> {
        properties.get(STIFFNESS).ok_or_else(|| {
            KernelError::constitutive(
                EntityKind::Element,
                properties.id,
                format!("linear spring law needs {}", STIFFNESS),
            )
        })
    }

    fn check(&self, properties: &Properties) -> Result<()> {
        self.tangent(0.0, properties).map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct SpringElement {
    id: usize,
    geometry: Geometry,
    properties: Arc<Properties>,
    variables: [&'static Variable; 1],
    law: Arc<dyn SpringLaw>,
}

impl SpringElement {
    /// Linear spring on `variable`. The geometry must be a `Line2`.
    pub fn new(
        id: usize,
        geometry: Geometry,
        properties: Arc<Properties>,
        variable: &'static Variable,
    ) -> Result<Self> {
        if geometry.family() != GeometryFamily::Line2 {
            return Err(KernelError::config(format!(
                "spring element {} needs a Line2 geometry, got {:?}",
                id,
                geometry.family()
            )));
        }
        Ok(Self {
            id,
            geometry,
            properties,
            variables: [variable],
            law: Arc::new(LinearSpringLaw),
        })
    }

    pub fn with_law(mut self, law: Arc<dyn SpringLaw>) -> Self {
        self.law = law;
        self
    }

    fn elongation(&self, ctx: &EntityContext) -> Result<f64> {
        let [first, second] = [self.geometry.node_indices()[0], self.geometry.node_indices()[1]];
        let variable = self.variables[0];
        Ok(ctx.nodes[second].value(variable)? - ctx.nodes[first].value(variable)?)
    }

    fn law_error(&self, error: KernelError) -> KernelError {
        match error {
            KernelError::ConstitutiveLaw { message, .. } => {
                KernelError::constitutive(EntityKind::Element, self.id, message)
            }
            other => other,
        }
    }
}

fn two_node_matrix(value: f64) -> DMatrix<f64> {
    DMatrix::from_row_slice(2, 2, &[value, -value, -value, value])
}

impl Entity for SpringElement {
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
        &self.variables
    }

    fn calculate_local_system(
        &self,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        let elongation = self.elongation(ctx)?;
        let force = self
            .law
            .force(elongation, &self.properties)
            .map_err(|e| self.law_error(e))?;
        let tangent = self
            .law
            .tangent(elongation, &self.properties)
            .map_err(|e| self.law_error(e))?;
        if !force.is_finite() || !tangent.is_finite() {
            return Err(KernelError::constitutive(
                EntityKind::Element,
                self.id,
                format!("spring law returned force {} and tangent {} at elongation {}", force, tangent, elongation),
            ));
        }

        *lhs = two_node_matrix(tangent);
        *rhs = DVector::from_vec(vec![force, -force]);
        Ok(())
    }

    fn calculate_mass_matrix(&self, _ctx: &EntityContext, mass: &mut DMatrix<f64>) -> Result<()> {
        *mass = match self.properties.get(NODAL_MASS) {
            Some(m) => DMatrix::from_diagonal_element(2, 2, m),
            None => DMatrix::zeros(0, 0),
        };
        Ok(())
    }

    fn calculate_damping_matrix(&self, _ctx: &EntityContext, damping: &mut DMatrix<f64>) -> Result<()> {
        *damping = match self.properties.get(DAMPING_COEFFICIENT) {
            Some(c) => two_node_matrix(c),
            None => DMatrix::zeros(0, 0),
        };
        Ok(())
    }

    fn check(&self, ctx: &EntityContext) -> Result<()> {
        check_nodal_dofs(self, ctx)?;
        self.law.check(&self.properties).map_err(|e| self.law_error(e))
    }
}

impl Element for SpringElement {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fek_model::variables::DISPLACEMENT_X;
    use fek_model::ModelPart;

    fn spring_model(stiffness: f64) -> (ModelPart, SpringElement) {
        let mut mp = ModelPart::new("Springs", 1);
        mp.add_nodal_solution_step_variable(&DISPLACEMENT_X);
        let a = mp.create_node(1, 0.0, 0.0, 0.0).unwrap();
        let b = mp.create_node(2, 1.0, 0.0, 0.0).unwrap();
        mp.add_dof(&DISPLACEMENT_X);
        let properties = mp.add_properties(Properties::new(1).with(STIFFNESS, stiffness));
        let geometry = Geometry::new(GeometryFamily::Line2, vec![a, b]).unwrap();
        let element = SpringElement::new(1, geometry, properties, &DISPLACEMENT_X).unwrap();
        (mp, element)
    }

    #[test]
    fn linear_spring_local_system() {
        let (mut mp, element) = spring_model(100.0);
        mp.node_mut(2).unwrap().set_value(&DISPLACEMENT_X, 0.01).unwrap();

        let mut lhs = DMatrix::zeros(0, 0);
        let mut rhs = DVector::zeros(0);
        element.calculate_local_system(&mp.context(), &mut lhs, &mut rhs).unwrap();

        assert_relative_eq!(lhs, two_node_matrix(100.0));
        assert_relative_eq!(rhs[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(rhs[1], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_stiffness_is_a_constitutive_error_for_the_element() {
        let mut mp = ModelPart::new("Springs", 1);
        mp.add_nodal_solution_step_variable(&DISPLACEMENT_X);
        let a = mp.create_node(1, 0.0, 0.0, 0.0).unwrap();
        let b = mp.create_node(2, 1.0, 0.0, 0.0).unwrap();
        let geometry = Geometry::new(GeometryFamily::Line2, vec![a, b]).unwrap();
        let element = SpringElement::new(7, geometry, Arc::new(Properties::new(3)), &DISPLACEMENT_X).unwrap();

        let mut lhs = DMatrix::zeros(0, 0);
        let mut rhs = DVector::zeros(0);
        let err = element.calculate_local_system(&mp.context(), &mut lhs, &mut rhs).unwrap_err();
        assert!(matches!(err, KernelError::ConstitutiveLaw { id: 7, .. }));
    }

    #[test]
    fn check_catches_missing_stiffness_before_any_build() {
        let (mp, element) = spring_model(10.0);
        element.check(&mp.context()).unwrap();

        let bare = SpringElement::new(5, element.geometry().clone(), Arc::new(Properties::new(2)), &DISPLACEMENT_X)
            .unwrap();
        let err = bare.check(&mp.context()).unwrap_err();
        assert!(matches!(err, KernelError::ConstitutiveLaw { id: 5, .. }));
    }

    #[test]
    fn check_defers_to_a_custom_law() {
        #[derive(Debug)]
        struct Constant;
        impl SpringLaw for Constant {
            fn force(&self, _elongation: f64, _properties: &Properties) -> Result<f64> {
                Ok(1.0)
            }
            fn tangent(&self, _elongation: f64, _properties: &Properties) -> Result<f64> {
                Ok(0.0)
            }
        }
        let (mp, element) = spring_model(1.0);
        let custom = SpringElement::new(6, element.geometry().clone(), Arc::new(Properties::new(2)), &DISPLACEMENT_X)
            .unwrap()
            .with_law(Arc::new(Constant));
        custom.check(&mp.context()).unwrap();
    }

    #[test]
    fn mass_and_damping_are_optional() {
        let (mp, element) = spring_model(1.0);
        let mut mass = DMatrix::from_element(1, 1, 9.0);
        element.calculate_mass_matrix(&mp.context(), &mut mass).unwrap();
        assert!(mass.is_empty());

        let properties = Arc::new(Properties::new(2).with(NODAL_MASS, 2.0).with(DAMPING_COEFFICIENT, 0.5));
        let element = SpringElement::new(2, element.geometry().clone(), properties, &DISPLACEMENT_X).unwrap();
        element.calculate_mass_matrix(&mp.context(), &mut mass).unwrap();
        assert_eq!(mass, DMatrix::from_diagonal_element(2, 2, 2.0));
        let mut damping = DMatrix::zeros(0, 0);
        element.calculate_damping_matrix(&mp.context(), &mut damping).unwrap();
        assert_eq!(damping, two_node_matrix(0.5));
    }

    #[test]
    fn rejects_non_line_geometry() {
        let mut mp = ModelPart::new("Springs", 1);
        let a = mp.create_node(1, 0.0, 0.0, 0.0).unwrap();
        let geometry = Geometry::new(GeometryFamily::Point1, vec![a]).unwrap();
        assert!(SpringElement::new(1, geometry, Arc::new(Properties::new(1)), &DISPLACEMENT_X).is_err());
    }
}
