//! Geometry service: node topology plus shape functions, Jacobians and
//! integration rules for the families the kernel uses.
//!
//! Everything here is a pure function of local coordinates and node
//! positions. Local coordinates follow the usual conventions:
//! - `Line2`: ξ ∈ [-1, 1]
//! - `Triangle3`: area coordinates (ξ, η) with ξ, η ≥ 0, ξ + η ≤ 1
//! - `Quadrilateral4`: (ξ, η) ∈ [-1, 1]²

use crate::error::{KernelError, Result};
use crate::node::{Node, NodeIndex, Nodes};
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryFamily {
    /// 1-node point (for nodal conditions)
    Point1,
    /// 2-node straight line
    Line2,
    /// 3-node linear triangle in the xy-plane
    Triangle3,
    /// 4-node bilinear quadrilateral in the xy-plane
    Quadrilateral4,
}

impl GeometryFamily {
    pub fn num_nodes(&self) -> usize {
        match self {
            GeometryFamily::Point1 => 1,
            GeometryFamily::Line2 => 2,
            GeometryFamily::Triangle3 => 3,
            GeometryFamily::Quadrilateral4 => 4,
        }
    }

    pub fn local_dimension(&self) -> usize {
        match self {
            GeometryFamily::Point1 => 0,
            GeometryFamily::Line2 => 1,
            GeometryFamily::Triangle3 | GeometryFamily::Quadrilateral4 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationMethod {
    GaussOrder1,
    GaussOrder2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationPoint {
    pub coordinates: [f64; 2],
    pub weight: f64,
}

/// Ordered node handles with a shape-function family.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    family: GeometryFamily,
    nodes: Vec<NodeIndex>,
}

impl Geometry {
    /// Node count must match the family.
    pub fn new(family: GeometryFamily, nodes: Vec<NodeIndex>) -> Result<Self> {
        if nodes.len() != family.num_nodes() {
            return Err(KernelError::config(format!(
                "{:?} geometry needs {} nodes, got {}",
                family,
                family.num_nodes(),
                nodes.len()
            )));
        }
        Ok(Self { family, nodes })
    }

    pub fn family(&self) -> GeometryFamily {
        self.family
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_indices(&self) -> &[NodeIndex] {
        &self.nodes
    }

    pub fn points<'a>(&'a self, nodes: &'a Nodes) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().map(move |&i| &nodes[i])
    }

    pub fn shape_function_values(&self, local: [f64; 2]) -> DVector<f64> {
        let [xi, eta] = local;
        match self.family {
            GeometryFamily::Point1 => DVector::from_element(1, 1.0),
            GeometryFamily::Line2 => DVector::from_vec(vec![0.5 * (1.0 - xi), 0.5 * (1.0 + xi)]),
            GeometryFamily::Triangle3 => DVector::from_vec(vec![1.0 - xi - eta, xi, eta]),
            GeometryFamily::Quadrilateral4 => DVector::from_vec(vec![
                0.25 * (1.0 - xi) * (1.0 - eta),
                0.25 * (1.0 + xi) * (1.0 - eta),
                0.25 * (1.0 + xi) * (1.0 + eta),
                0.25 * (1.0 - xi) * (1.0 + eta),
            ]),
        }
    }

    /// dN/dξ, one row per node, one column per local direction.
    pub fn shape_function_local_gradients(&self, local: [f64; 2]) -> DMatrix<f64> {
        let [xi, eta] = local;
        match self.family {
            GeometryFamily::Point1 => DMatrix::zeros(1, 0),
            GeometryFamily::Line2 => DMatrix::from_row_slice(2, 1, &[-0.5, 0.5]),
            GeometryFamily::Triangle3 => {
                DMatrix::from_row_slice(3, 2, &[-1.0, -1.0, 1.0, 0.0, 0.0, 1.0])
            }
            GeometryFamily::Quadrilateral4 => DMatrix::from_row_slice(
                4,
                2,
                &[
                    -0.25 * (1.0 - eta),
                    -0.25 * (1.0 - xi),
                    0.25 * (1.0 - eta),
                    -0.25 * (1.0 + xi),
                    0.25 * (1.0 + eta),
                    0.25 * (1.0 + xi),
                    -0.25 * (1.0 + eta),
                    0.25 * (1.0 - xi),
                ],
            ),
        }
    }

    /// Jacobian dx/dξ. Lines use the 3D tangent (3x1); planar families use
    /// the xy-coordinates (2x2).
    pub fn jacobian(&self, nodes: &Nodes, local: [f64; 2]) -> DMatrix<f64> {
        let gradients = self.shape_function_local_gradients(local);
        let dim = match self.family {
            GeometryFamily::Point1 => return DMatrix::zeros(0, 0),
            GeometryFamily::Line2 => 3,
            GeometryFamily::Triangle3 | GeometryFamily::Quadrilateral4 => 2,
        };
        let mut coords = DMatrix::zeros(dim, self.nodes.len());
        for (a, node) in self.points(nodes).enumerate() {
            for i in 0..dim {
                coords[(i, a)] = node.coordinates[i];
            }
        }
        coords * gradients
    }

    /// det(J) for planar families, |dx/dξ| for lines, 1 for points.
    /// Negative values mean an inverted (clockwise) element.
    pub fn determinant_of_jacobian(&self, nodes: &Nodes, local: [f64; 2]) -> f64 {
        let j = self.jacobian(nodes, local);
        match self.family {
            GeometryFamily::Point1 => 1.0,
            GeometryFamily::Line2 => j.norm(),
            GeometryFamily::Triangle3 | GeometryFamily::Quadrilateral4 => {
                j[(0, 0)] * j[(1, 1)] - j[(0, 1)] * j[(1, 0)]
            }
        }
    }

    /// Cartesian gradients dN/dx (planar families only), together with det(J).
    pub fn shape_function_gradients(
        &self,
        nodes: &Nodes,
        local: [f64; 2],
    ) -> Option<(DMatrix<f64>, f64)> {
        if self.family.local_dimension() != 2 {
            return None;
        }
        let j = self.jacobian(nodes, local);
        let det = j[(0, 0)] * j[(1, 1)] - j[(0, 1)] * j[(1, 0)];
        let j_inv = j.try_inverse()?;
        Some((self.shape_function_local_gradients(local) * j_inv, det))
    }

    pub fn integration_points(&self, method: IntegrationMethod) -> Vec<IntegrationPoint> {
        let g = 1.0 / 3.0_f64.sqrt();
        match (self.family, method) {
            (GeometryFamily::Point1, _) => vec![IntegrationPoint {
                coordinates: [0.0, 0.0],
                weight: 1.0,
            }],
            (GeometryFamily::Line2, IntegrationMethod::GaussOrder1) => vec![IntegrationPoint {
                coordinates: [0.0, 0.0],
                weight: 2.0,
            }],
            (GeometryFamily::Line2, IntegrationMethod::GaussOrder2) => [-g, g]
                .iter()
                .map(|&xi| IntegrationPoint {
                    coordinates: [xi, 0.0],
                    weight: 1.0,
                })
                .collect(),
            (GeometryFamily::Triangle3, IntegrationMethod::GaussOrder1) => {
                vec![IntegrationPoint {
                    coordinates: [1.0 / 3.0, 1.0 / 3.0],
                    weight: 0.5,
                }]
            }
            (GeometryFamily::Triangle3, IntegrationMethod::GaussOrder2) => {
                [[1.0 / 6.0, 1.0 / 6.0], [2.0 / 3.0, 1.0 / 6.0], [1.0 / 6.0, 2.0 / 3.0]]
                    .iter()
                    .map(|&coordinates| IntegrationPoint {
                        coordinates,
                        weight: 1.0 / 6.0,
                    })
                    .collect()
            }
            (GeometryFamily::Quadrilateral4, IntegrationMethod::GaussOrder1) => {
                vec![IntegrationPoint {
                    coordinates: [0.0, 0.0],
                    weight: 4.0,
                }]
            }
            (GeometryFamily::Quadrilateral4, IntegrationMethod::GaussOrder2) => {
                let mut points = Vec::with_capacity(4);
                for &eta in &[-g, g] {
                    for &xi in &[-g, g] {
                        points.push(IntegrationPoint {
                            coordinates: [xi, eta],
                            weight: 1.0,
                        });
                    }
                }
                points
            }
        }
    }

    /// Length, area or 1 (points), integrated with the given rule.
    pub fn domain_size(&self, nodes: &Nodes) -> f64 {
        self.integration_points(IntegrationMethod::GaussOrder2)
            .iter()
            .map(|p| p.weight * self.determinant_of_jacobian(nodes, p.coordinates))
            .sum()
    }
}
