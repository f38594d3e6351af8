//! Model builders shared by the integration tests.

#![allow(dead_code)]

use fek_model::properties::{
    CONDUCTIVITY, CROSS_AREA, DAMPING_COEFFICIENT, HEAT_CAPACITY, NODAL_MASS, STIFFNESS, YOUNG_MODULUS,
};
use fek_model::variables::{
    DISPLACEMENT_X, DISPLACEMENT_Y, HEAT_FLUX, POINT_LOAD, POINT_LOAD_X, POINT_LOAD_Y, TEMPERATURE,
};
use fek_model::{EntityKind, Geometry, GeometryFamily, KernelError, ModelPart, Properties, Result};
use fek_solver::{LaplacianElement, PointLoadCondition, SpringElement, SpringLaw, TrussElement2D};
use std::sync::Arc;

/// Softening spring `N(e) = k e exp(-e)`. The force peaks at `e = 1` with
/// `N = k / e`, beyond which the tangent is negative.
#[derive(Debug, Clone, Copy)]
pub struct SofteningSpringLaw {
    pub stiffness: f64,
}

impl SpringLaw for SofteningSpringLaw {
    fn force(&self, elongation: f64, _properties: &Properties) -> Result<f64> {
        Ok(self.stiffness * elongation * (-elongation).exp())
    }

    fn tangent(&self, elongation: f64, _properties: &Properties) -> Result<f64> {
        Ok(self.stiffness * (1.0 - elongation) * (-elongation).exp())
    }
}

/// Spring law that always fails, to check error propagation.
#[derive(Debug, Clone, Copy)]
pub struct BrokenSpringLaw;

impl SpringLaw for BrokenSpringLaw {
    fn force(&self, _elongation: f64, properties: &Properties) -> Result<f64> {
        Err(KernelError::constitutive(EntityKind::Element, properties.id, "law diverged"))
    }

    fn tangent(&self, _elongation: f64, properties: &Properties) -> Result<f64> {
        Err(KernelError::constitutive(EntityKind::Element, properties.id, "law diverged"))
    }
}

/// Ground node 1 (fixed) at x = 0, tip node 2 at x = 1, one spring between
/// them and a point load condition on the tip. The tip node and the load
/// condition form the sub-model-part `"tip"`.
pub fn single_spring(law: Option<Arc<dyn SpringLaw>>, stiffness: f64, load: f64) -> ModelPart {
    let mut mp = ModelPart::new("Structure", 1);
    mp.add_nodal_solution_step_variable(&DISPLACEMENT_X);
    mp.add_nodal_solution_step_variable(&POINT_LOAD_X);
    let ground = mp.create_node(1, 0.0, 0.0, 0.0).expect("Failed to create node 1");
    let tip = mp.create_node(2, 1.0, 0.0, 0.0).expect("Failed to create node 2");
    mp.add_dof(&DISPLACEMENT_X);
    mp.node_mut(1).unwrap().fix(&DISPLACEMENT_X).unwrap();
    mp.node_mut(2).unwrap().set_value(&POINT_LOAD_X, load).unwrap();

    let properties = mp.add_properties(Properties::new(1).with(STIFFNESS, stiffness));
    let geometry = Geometry::new(GeometryFamily::Line2, vec![ground, tip]).unwrap();
    let mut spring = SpringElement::new(1, geometry, properties.clone(), &DISPLACEMENT_X).unwrap();
    if let Some(law) = law {
        spring = spring.with_law(law);
    }
    mp.add_element(Box::new(spring)).unwrap();

    let geometry = Geometry::new(GeometryFamily::Point1, vec![tip]).unwrap();
    let condition = PointLoadCondition::structural(1, geometry, properties, 1).unwrap();
    mp.add_condition(Box::new(condition)).unwrap();

    mp.create_sub_model_part("tip").unwrap();
    mp.add_conditions_to_sub_model_part("tip", &[1]).unwrap();
    mp
}

/// Fixed node 1 at x = 0 and `n` springs of stiffness `k` in series; the
/// last node carries `load` as a `POINT_LOAD_X` nodal value.
pub fn spring_chain(n: usize, k: f64, load: f64) -> ModelPart {
    let mut mp = ModelPart::new("Chain", 1);
    mp.add_nodal_solution_step_variable(&DISPLACEMENT_X);
    mp.add_nodal_solution_step_variable(&POINT_LOAD_X);
    let nodes: Vec<_> = (0..=n)
        .map(|i| mp.create_node(i + 1, i as f64, 0.0, 0.0).unwrap())
        .collect();
    mp.add_dof(&DISPLACEMENT_X);
    mp.node_mut(1).unwrap().fix(&DISPLACEMENT_X).unwrap();
    mp.node_mut(n + 1).unwrap().set_value(&POINT_LOAD_X, load).unwrap();

    let properties = mp.add_properties(Properties::new(1).with(STIFFNESS, k));
    for i in 0..n {
        let geometry = Geometry::new(GeometryFamily::Line2, vec![nodes[i], nodes[i + 1]]).unwrap();
        let spring = SpringElement::new(i + 1, geometry, properties.clone(), &DISPLACEMENT_X).unwrap();
        mp.add_element(Box::new(spring)).unwrap();
    }
    let geometry = Geometry::new(GeometryFamily::Point1, vec![nodes[n]]).unwrap();
    mp.add_condition(Box::new(PointLoadCondition::structural(1, geometry, properties, 1).unwrap()))
        .unwrap();
    mp
}

pub const TRUSS_E: f64 = 210000.0;
pub const TRUSS_A: f64 = 0.01;

/// Two-bar truss: supports at (0, 0) and (2, 0) (both pinned), apex at
/// (1, 1) carrying `(px, py)` through a `POINT_LOAD` vector.
pub fn two_bar_truss(px: f64, py: f64) -> ModelPart {
    let mut mp = ModelPart::new("Truss", 1);
    mp.add_nodal_solution_step_variable(&DISPLACEMENT_X);
    mp.add_nodal_solution_step_variable(&DISPLACEMENT_Y);
    mp.add_nodal_solution_step_variable(&POINT_LOAD_Y);
    mp.add_condition_variable(&POINT_LOAD);
    let left = mp.create_node(1, 0.0, 0.0, 0.0).unwrap();
    let right = mp.create_node(2, 2.0, 0.0, 0.0).unwrap();
    let apex = mp.create_node(3, 1.0, 1.0, 0.0).unwrap();
    mp.add_dof(&DISPLACEMENT_X);
    mp.add_dof(&DISPLACEMENT_Y);
    for id in [1, 2] {
        let node = mp.node_mut(id).unwrap();
        node.fix(&DISPLACEMENT_X).unwrap();
        node.fix(&DISPLACEMENT_Y).unwrap();
    }

    let properties = mp.add_properties(
        Properties::new(1)
            .with(YOUNG_MODULUS, TRUSS_E)
            .with(CROSS_AREA, TRUSS_A),
    );
    for (id, pair) in [(1, [left, apex]), (2, [right, apex])] {
        let geometry = Geometry::new(GeometryFamily::Line2, pair.to_vec()).unwrap();
        mp.add_element(Box::new(TrussElement2D::new(id, geometry, properties.clone()).unwrap()))
            .unwrap();
    }
    let geometry = Geometry::new(GeometryFamily::Point1, vec![apex]).unwrap();
    let load = PointLoadCondition::structural(1, geometry, properties, 2)
        .unwrap()
        .with_vector_load([px, py, 0.0]);
    mp.add_condition(Box::new(load)).unwrap();
    mp.create_sub_model_part("apex").unwrap();
    mp.add_conditions_to_sub_model_part("apex", &[1]).unwrap();
    mp
}

/// Single-DOF oscillator: ground node fixed, tip node with `NODAL_MASS`
/// `mass` on a spring of stiffness `k`, optional viscous damping.
pub fn oscillator(mass: f64, k: f64, damping: Option<f64>, buffer_size: usize) -> ModelPart {
    let mut mp = ModelPart::new("Oscillator", buffer_size);
    mp.add_nodal_solution_step_variable(&DISPLACEMENT_X);
    let ground = mp.create_node(1, 0.0, 0.0, 0.0).unwrap();
    let tip = mp.create_node(2, 1.0, 0.0, 0.0).unwrap();
    mp.add_dof(&DISPLACEMENT_X);
    mp.node_mut(1).unwrap().fix(&DISPLACEMENT_X).unwrap();

    let mut properties = Properties::new(1).with(STIFFNESS, k).with(NODAL_MASS, mass);
    if let Some(c) = damping {
        properties = properties.with(DAMPING_COEFFICIENT, c);
    }
    let properties = mp.add_properties(properties);
    let geometry = Geometry::new(GeometryFamily::Line2, vec![ground, tip]).unwrap();
    mp.add_element(Box::new(SpringElement::new(1, geometry, properties, &DISPLACEMENT_X).unwrap()))
        .unwrap();
    mp
}

/// Heat triangle (0,0) (1,0) (0,1). Node 1 is held at `boundary_temperature`
/// and every node starts at `initial_temperature`. Node 3 receives
/// `HEAT_FLUX = flux` through a point condition.
pub fn heat_triangle(
    conductivity: f64,
    capacity: Option<f64>,
    boundary_temperature: f64,
    initial_temperature: f64,
    flux: f64,
    buffer_size: usize,
) -> ModelPart {
    let mut mp = ModelPart::new("Thermal", buffer_size);
    mp.add_nodal_solution_step_variable(&TEMPERATURE);
    mp.add_nodal_solution_step_variable(&HEAT_FLUX);
    let nodes: Vec<_> = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]
        .iter()
        .enumerate()
        .map(|(i, c)| mp.create_node(i + 1, c[0], c[1], 0.0).unwrap())
        .collect();
    mp.add_dof(&TEMPERATURE);
    for id in 1..=3 {
        mp.node_mut(id).unwrap().set_value(&TEMPERATURE, initial_temperature).unwrap();
    }
    let node = mp.node_mut(1).unwrap();
    node.set_value(&TEMPERATURE, boundary_temperature).unwrap();
    node.fix(&TEMPERATURE).unwrap();
    mp.node_mut(3).unwrap().set_value(&HEAT_FLUX, flux).unwrap();

    let mut properties = Properties::new(1).with(CONDUCTIVITY, conductivity);
    if let Some(c) = capacity {
        properties = properties.with(HEAT_CAPACITY, c);
    }
    let properties = mp.add_properties(properties);
    let geometry = Geometry::new(GeometryFamily::Triangle3, nodes.clone()).unwrap();
    mp.add_element(Box::new(LaplacianElement::new(1, geometry, properties.clone()).unwrap()))
        .unwrap();
    let geometry = Geometry::new(GeometryFamily::Point1, vec![nodes[2]]).unwrap();
    mp.add_condition(Box::new(PointLoadCondition::flux(1, geometry, properties).unwrap()))
        .unwrap();
    mp
}

pub fn tip_displacement(mp: &ModelPart) -> f64 {
    mp.node(2).unwrap().value(&DISPLACEMENT_X).unwrap()
}
