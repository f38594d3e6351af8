//! The element/condition contract.
//!
//! An entity turns the current nodal state into a local tangent matrix and a
//! local residual vector, and maps its local rows onto global equation ids.
//! The row order of `equation_id_vector`, `get_dof_list` and every local
//! matrix/vector must agree; the builder checks the sizes and rejects
//! mismatches.
//!
//! Sign convention: the LHS is the tangent `d(f_int)/du` and the RHS is the
//! residual `f_ext - f_int`, so a Newton update is `u += LHS^-1 * RHS`.

use crate::data_container::DataValueContainer;
use crate::dof::Dof;
use crate::error::{EntityKind, KernelError, Result};
use crate::geometry::Geometry;
use crate::node::Nodes;
use crate::process_info::ProcessInfo;
use crate::properties::Properties;
use crate::variables::Variable;
use nalgebra::{DMatrix, DVector};

/// Read-only view handed to entities during a pass.
#[derive(Clone, Copy)]
pub struct EntityContext<'a> {
    pub nodes: &'a Nodes,
    pub process_info: &'a ProcessInfo,
}

impl<'a> EntityContext<'a> {
    pub fn new(nodes: &'a Nodes, process_info: &'a ProcessInfo) -> Self {
        Self {
            nodes,
            process_info,
        }
    }
}

pub trait Entity: Send + Sync + std::fmt::Debug {
    fn id(&self) -> usize;

    fn kind(&self) -> EntityKind;

    fn geometry(&self) -> &Geometry;

    fn properties(&self) -> &Properties;

    /// Variables solved for at each node, in local order.
    fn dof_variables(&self) -> &[&'static Variable];

    /// DOFs in local row order (node-major, then `dof_variables` order).
    fn get_dof_list(&self, ctx: &EntityContext) -> Result<Vec<Dof>> {
        let mut dofs = Vec::with_capacity(self.geometry().len() * self.dof_variables().len());
        for &index in self.geometry().node_indices() {
            let node = &ctx.nodes[index];
            for &variable in self.dof_variables() {
                let nodal = node.dof(variable).ok_or_else(|| {
                    KernelError::missing(
                        self.kind(),
                        self.id(),
                        format!("node {} has no DOF {}", node.id, variable),
                    )
                })?;
                dofs.push(Dof {
                    node_id: node.id,
                    node: index,
                    variable,
                    fixed: nodal.fixed,
                    equation_id: nodal.equation_id,
                });
            }
        }
        Ok(dofs)
    }

    /// Global equation ids in local row order.
    fn equation_id_vector(&self, ctx: &EntityContext) -> Result<Vec<usize>> {
        let mut ids = Vec::with_capacity(self.geometry().len() * self.dof_variables().len());
        for &index in self.geometry().node_indices() {
            let node = &ctx.nodes[index];
            for &variable in self.dof_variables() {
                ids.push(node.equation_id(variable).map_err(|_| {
                    KernelError::missing(
                        self.kind(),
                        self.id(),
                        format!("DOF {} of node {} is not in the current DOF set", variable, node.id),
                    )
                })?);
            }
        }
        Ok(ids)
    }

    /// Fill `lhs` and `rhs` (resized by the callee). Must not mutate shared
    /// state and must be repeatable for the same nodal state.
    fn calculate_local_system(
        &self,
        ctx: &EntityContext,
        lhs: &mut DMatrix<f64>,
        rhs: &mut DVector<f64>,
    ) -> Result<()>;

    fn calculate_left_hand_side(&self, ctx: &EntityContext, lhs: &mut DMatrix<f64>) -> Result<()> {
        let mut rhs = DVector::zeros(0);
        self.calculate_local_system(ctx, lhs, &mut rhs)
    }

    fn calculate_right_hand_side(&self, ctx: &EntityContext, rhs: &mut DVector<f64>) -> Result<()> {
        let mut lhs = DMatrix::zeros(0, 0);
        self.calculate_local_system(ctx, &mut lhs, rhs)
    }

    /// Mass (or capacity) matrix. Entities without inertia leave it empty.
    fn calculate_mass_matrix(&self, _ctx: &EntityContext, mass: &mut DMatrix<f64>) -> Result<()> {
        *mass = DMatrix::zeros(0, 0);
        Ok(())
    }

    fn calculate_damping_matrix(&self, _ctx: &EntityContext, damping: &mut DMatrix<f64>) -> Result<()> {
        *damping = DMatrix::zeros(0, 0);
        Ok(())
    }

    /// One-time validation before the solution loop.
    fn check(&self, ctx: &EntityContext) -> Result<()> {
        check_nodal_dofs(self, ctx)
    }

    fn initialize_solution_step(&mut self, _ctx: &EntityContext) -> Result<()> {
        Ok(())
    }

    fn initialize_non_linear_iteration(&mut self, _ctx: &EntityContext) -> Result<()> {
        Ok(())
    }

    fn finalize_non_linear_iteration(&mut self, _ctx: &EntityContext) -> Result<()> {
        Ok(())
    }

    /// Commit internal history (e.g. plastic state) once the step converged.
    fn finalize_solution_step(&mut self, _ctx: &EntityContext) -> Result<()> {
        Ok(())
    }
}

/// Domain contribution.
/// Every node of `entity` carries each of its DOF variables, both as
/// solution-step data and as a DOF. Overrides of [`Entity::check`] call
/// this before their own validation.
pub fn check_nodal_dofs<E: Entity + ?Sized>(entity: &E, ctx: &EntityContext) -> Result<()> {
    for node in entity.geometry().points(ctx.nodes) {
        for &variable in entity.dof_variables() {
            if !node.has_dof(variable) || !node.has_solution_step_value(variable) {
                return Err(KernelError::missing(
                    entity.kind(),
                    entity.id(),
                    format!("node {} lacks variable or DOF {}", node.id, variable),
                ));
            }
        }
    }
    Ok(())
}

pub trait Element: Entity {}

/// Boundary contribution (loads, prescribed fluxes). Conditions carry vector
/// values that load-control strategies may rescale.
pub trait Condition: Entity {
    fn data(&self) -> &DataValueContainer;

    fn data_mut(&mut self) -> &mut DataValueContainer;
}
