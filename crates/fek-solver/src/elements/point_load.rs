//! Concentrated nodal load.
//!
//! Contributes no stiffness. The residual at each DOF is the nodal load
//! variable paired with it (e.g. `POINT_LOAD_X` for `DISPLACEMENT_X`), plus
//! the matching component of the condition's `POINT_LOAD` vector for
//! structural loads. Absent values count as zero.

use fek_model::variables::{
    DISPLACEMENT_X, DISPLACEMENT_Y, DISPLACEMENT_Z, HEAT_FLUX, POINT_LOAD, POINT_LOAD_X, POINT_LOAD_Y, POINT_LOAD_Z,
    TEMPERATURE,
};
use fek_model::{
    Condition, DataValueContainer, Entity, EntityContext, EntityKind, Geometry, GeometryFamily, KernelError,
    Properties, Result, Variable, VectorVariable,
};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PointLoadCondition {
    id: usize,
    geometry: Geometry,
    properties: Arc<Properties>,
    dofs: Vec<&'static Variable>,
    nodal_loads: Vec<&'static Variable>,
    vector_load: Option<&'static VectorVariable>,
    data: DataValueContainer,
}

impl PointLoadCondition {
    /// Force on `dimension` displacement components (1 to 3).
    pub fn structural(id: usize, geometry: Geometry, properties: Arc<Properties>, dimension: usize) -> Result<Self> {
        if !(1..=3).contains(&dimension) {
            return Err(KernelError::config(format!(
                "point load {} needs a dimension between 1 and 3, got {}",
                id, dimension
            )));
        }
        let dofs = [&DISPLACEMENT_X, &DISPLACEMENT_Y, &DISPLACEMENT_Z];
        let loads = [&POINT_LOAD_X, &POINT_LOAD_Y, &POINT_LOAD_Z];
        Self::build(
            id,
            geometry,
            properties,
            dofs[..dimension].to_vec(),
            loads[..dimension].to_vec(),
            Some(&POINT_LOAD),
        )
    }

    /// Heat input on `TEMPERATURE`, read from `HEAT_FLUX`.
    pub fn flux(id: usize, geometry: Geometry, properties: Arc<Properties>) -> Result<Self> {
        Self::build(id, geometry, properties, vec![&TEMPERATURE], vec![&HEAT_FLUX], None)
    }

    fn build(
        id: usize,
        geometry: Geometry,
        properties: Arc<Properties>,
        dofs: Vec<&'static Variable>,
        nodal_loads: Vec<&'static Variable>,
        vector_load: Option<&'static VectorVariable>,
    ) -> Result<Self> {
        if geometry.family() != GeometryFamily::Point1 {
            return Err(KernelError::config(format!(
                "point load {} needs a Point1 geometry, got {:?}",
                id,
                geometry.family()
            )));
        }
        Ok(Self {
            id,
            geometry,
            properties,
            dofs,
            nodal_loads,
            vector_load,
            data: DataValueContainer::new(),
        })
    }

    pub fn with_vector_load(mut self, value: [f64; 3]) -> Self {
        if let Some(variable) = self.vector_load {
            self.data.set(variable, value);
        }
        self
    }
}

impl Entity for PointLoadCondition {
    fn id(&self) -> usize {
        self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Condition
    }

    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn dof_variables(&self) -> &[&'static Variable] {
        &self.dofs
    }

    fn calculate_local_system(
        &self,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
        rhs: &mut DVector<f64>,
    ) -> Result<()> {
        let n = self.dofs.len();
        let node = &ctx.nodes[self.geometry.node_indices()[0]];
        let vector = self.vector_load.and_then(|variable| self.data.get(variable));

        *lhs = DMatrix::zeros(n, n);
        *rhs = DVector::zeros(n);
        for (i, &load) in self.nodal_loads.iter().enumerate() {
            if node.has_solution_step_value(load) {
                rhs[i] += node.value(load)?;
            }
            if let Some(vector) = vector {
                rhs[i] += vector[i];
            }
        }
        Ok(())
    }
}

impl Condition for PointLoadCondition {
    fn data(&self) -> &DataValueContainer {
        &self.data
    }

    fn data_mut(&mut self) -> &mut DataValueContainer {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fek_model::ModelPart;

    #[test]
    fn nodal_and_vector_loads_add_up() {
        let mut mp = ModelPart::new("Structure", 1);
        mp.add_nodal_solution_step_variable(&DISPLACEMENT_X);
        mp.add_nodal_solution_step_variable(&DISPLACEMENT_Y);
        mp.add_nodal_solution_step_variable(&POINT_LOAD_X);
        let index = mp.create_node(1, 0.0, 0.0, 0.0).unwrap();
        mp.node_mut(1).unwrap().set_value(&POINT_LOAD_X, 3.0).unwrap();

        let geometry = Geometry::new(GeometryFamily::Point1, vec![index]).unwrap();
        let condition = PointLoadCondition::structural(1, geometry, Arc::new(Properties::new(0)), 2)
            .unwrap()
            .with_vector_load([1.0, -2.0, 5.0]);

        let mut lhs = DMatrix::zeros(0, 0);
        let mut rhs = DVector::zeros(0);
        condition.calculate_local_system(&mp.context(), &mut lhs, &mut rhs).unwrap();
        assert_eq!(lhs, DMatrix::zeros(2, 2));
        assert_eq!(rhs, DVector::from_vec(vec![4.0, -2.0]));
    }

    #[test]
    fn vector_load_is_scaled_through_the_data_container() {
        let mut mp = ModelPart::new("Structure", 1);
        let index = mp.create_node(1, 0.0, 0.0, 0.0).unwrap();
        let geometry = Geometry::new(GeometryFamily::Point1, vec![index]).unwrap();
        let mut condition = PointLoadCondition::structural(1, geometry, Arc::new(Properties::new(0)), 1)
            .unwrap()
            .with_vector_load([2.0, 0.0, 0.0]);
        condition.data_mut().scale(&POINT_LOAD, 0.25);
        assert_eq!(condition.data().get(&POINT_LOAD), Some([0.5, 0.0, 0.0]));
    }

    #[test]
    fn rejects_bad_dimension() {
        let mut mp = ModelPart::new("Structure", 1);
        let index = mp.create_node(1, 0.0, 0.0, 0.0).unwrap();
        let geometry = Geometry::new(GeometryFamily::Point1, vec![index]).unwrap();
        assert!(PointLoadCondition::structural(1, geometry, Arc::new(Properties::new(0)), 4).is_err());
    }
}
