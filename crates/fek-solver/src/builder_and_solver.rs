//! Global system assembly and Dirichlet handling.
//!
//! The builder owns the DOF registry of the current system. A typical cycle:
//!
//! ```text
//! set_up_dof_set -> set_up_system -> resize_and_initialize_vectors
//!     -> (build -> apply_dirichlet_conditions -> system_solve)*
//! ```
//!
//! Local systems are evaluated in parallel with rayon and then scattered in
//! container order (elements first, then conditions), so the assembled
//! values do not depend on the number of threads. If any entity fails, the
//! whole build returns the error before anything is written into `A` or `b`.
//!
//! ## Dirichlet policies
//!
//! | Policy      | System size | Fixed DOFs                                   |
//! |-------------|-------------|----------------------------------------------|
//! | Elimination | free DOFs   | never enter `A`                              |
//! | Block       | all DOFs    | rows/columns zeroed, unit diagonal, `b = 0` |

use crate::backend::LinearSolver;
use crate::scheme::Scheme;
use fek_model::{DofSet, Entity, EntityContext, KernelError, ModelPart, Result};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// How fixed DOFs are removed from the linear system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirichletPolicy {
    #[default]
    Elimination,
    Block,
}

/// `A * Dx = b`, always resized together.
#[derive(Debug, Clone)]
pub struct GlobalSystem {
    pub a: CsrMatrix<f64>,
    pub dx: DVector<f64>,
    pub b: DVector<f64>,
}

impl Default for GlobalSystem {
    fn default() -> Self {
        Self::empty()
    }
}

impl GlobalSystem {
    pub fn empty() -> Self {
        Self {
            a: CsrMatrix::zeros(0, 0),
            dx: DVector::zeros(0),
            b: DVector::zeros(0),
        }
    }

    pub fn size(&self) -> usize {
        self.b.len()
    }

    /// Dense copy of `A`, for diagnostics and tests.
    pub fn dense_lhs(&self) -> DMatrix<f64> {
        let n = self.a.nrows();
        let mut dense = DMatrix::zeros(n, self.a.ncols());
        for (row_idx, row) in self.a.row_iter().enumerate() {
            for (&col_idx, &value) in row.col_indices().iter().zip(row.values().iter()) {
                dense[(row_idx, col_idx)] = value;
            }
        }
        dense
    }
}

/// One entity's evaluated contribution, kept until the scatter phase.
struct LocalContribution {
    ids: Vec<usize>,
    lhs: Option<DMatrix<f64>>,
    rhs: Option<DVector<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parts {
    Both,
    Lhs,
    Rhs,
}

pub struct BuilderAndSolver {
    policy: DirichletPolicy,
    linear_solver: Box<dyn LinearSolver>,
    dof_set: DofSet,
    system_size: usize,
    pattern_is_valid: bool,
    echo_level: u32,
}

impl BuilderAndSolver {
    pub fn new(policy: DirichletPolicy, linear_solver: Box<dyn LinearSolver>) -> Self {
        Self {
            policy,
            linear_solver,
            dof_set: DofSet::default(),
            system_size: 0,
            pattern_is_valid: false,
            echo_level: 0,
        }
    }

    pub fn with_echo_level(mut self, echo_level: u32) -> Self {
        self.echo_level = echo_level;
        self
    }

    pub fn set_echo_level(&mut self, echo_level: u32) {
        self.echo_level = echo_level;
    }

    pub fn policy(&self) -> DirichletPolicy {
        self.policy
    }

    pub fn dof_set(&self) -> &DofSet {
        &self.dof_set
    }

    pub fn free_dof_count(&self) -> usize {
        self.dof_set.free_count()
    }

    pub fn total_dof_count(&self) -> usize {
        self.dof_set.len()
    }

    /// Size of `A`: free DOFs for elimination, all DOFs for block.
    pub fn equation_system_size(&self) -> usize {
        self.system_size
    }

    /// Collect the deduplicated DOFs of every element and condition.
    pub fn set_up_dof_set<S: Scheme>(&mut self, scheme: &S, model_part: &ModelPart) -> Result<()> {
        let ctx = model_part.context();
        let element_dofs = collect_in_order(
            model_part
                .elements()
                .par_iter()
                .map(|e| scheme.get_dof_list(e.as_ref(), &ctx))
                .collect(),
        )?;
        let condition_dofs = collect_in_order(
            model_part
                .conditions()
                .par_iter()
                .map(|c| scheme.get_dof_list(c.as_ref(), &ctx))
                .collect(),
        )?;

        self.dof_set = DofSet::from_dofs(element_dofs.into_iter().chain(condition_dofs).flatten())?;
        self.pattern_is_valid = false;

        if self.echo_level > 1 {
            info!(
                total = self.dof_set.len(),
                free = self.dof_set.free_count(),
                "DOF set set up for model part {}",
                model_part.name
            );
        }
        Ok(())
    }

    /// Number the equations and write the ids onto the nodes. Invalidates
    /// the sparsity pattern; callers must resize afterwards.
    pub fn set_up_system(&mut self, model_part: &mut ModelPart) -> Result<()> {
        self.dof_set.number_equations(model_part.nodes_mut())?;
        self.system_size = match self.policy {
            DirichletPolicy::Elimination => self.dof_set.free_count(),
            DirichletPolicy::Block => self.dof_set.len(),
        };
        self.pattern_is_valid = false;
        Ok(())
    }

    /// Build the sparsity pattern from the entities' equation ids (every
    /// diagonal included) and resize `A`, `Dx` and `b` together.
    pub fn resize_and_initialize_vectors<S: Scheme>(
        &mut self,
        scheme: &S,
        system: &mut GlobalSystem,
        model_part: &ModelPart,
    ) -> Result<()> {
        if !self.dof_set.is_numbered() {
            return Err(KernelError::config("set_up_system must run before resizing the system"));
        }
        let n = self.system_size;
        let ctx = model_part.context();
        let element_ids = collect_in_order(
            model_part
                .elements()
                .par_iter()
                .map(|e| scheme.equation_id_vector(e.as_ref(), &ctx))
                .collect(),
        )?;
        let condition_ids = collect_in_order(
            model_part
                .conditions()
                .par_iter()
                .map(|c| scheme.equation_id_vector(c.as_ref(), &ctx))
                .collect(),
        )?;

        let mut rows: Vec<BTreeSet<usize>> = (0..n).map(|i| BTreeSet::from([i])).collect();
        for ids in element_ids.iter().chain(condition_ids.iter()) {
            for &i in ids.iter().filter(|&&i| i < n) {
                rows[i].extend(ids.iter().copied().filter(|&j| j < n));
            }
        }

        let mut offsets = Vec::with_capacity(n + 1);
        let mut indices = Vec::new();
        offsets.push(0);
        for row in rows {
            indices.extend(row);
            offsets.push(indices.len());
        }
        let nnz = indices.len();
        let pattern = SparsityPattern::try_from_offsets_and_indices(n, n, offsets, indices)
            .map_err(|e| KernelError::config(format!("invalid sparsity pattern: {}", e)))?;
        system.a = CsrMatrix::try_from_pattern_and_values(pattern, vec![0.0; nnz])
            .map_err(|e| KernelError::config(format!("invalid sparse matrix: {}", e)))?;
        system.dx = DVector::zeros(n);
        system.b = DVector::zeros(n);
        self.pattern_is_valid = true;

        if self.echo_level > 1 {
            debug!(size = n, nnz, "global system resized");
        }
        Ok(())
    }

    pub fn is_system_initialized(&self, system: &GlobalSystem) -> bool {
        self.pattern_is_valid && system.size() == self.system_size && system.a.nrows() == self.system_size
    }

    /// Assemble `A` and `b` from scratch.
    pub fn build<S: Scheme>(&self, scheme: &S, model_part: &ModelPart, system: &mut GlobalSystem) -> Result<()> {
        self.check_sizes(system)?;
        let contributions = self.evaluate(scheme, model_part, Parts::Both)?;
        system.a.values_mut().fill(0.0);
        system.b.fill(0.0);
        for local in &contributions {
            self.scatter(local, Some(&mut system.a), Some(&mut system.b))?;
        }
        Ok(())
    }

    /// Assemble `A` only.
    pub fn build_lhs<S: Scheme>(&self, scheme: &S, model_part: &ModelPart, system: &mut GlobalSystem) -> Result<()> {
        self.check_sizes(system)?;
        let contributions = self.evaluate(scheme, model_part, Parts::Lhs)?;
        system.a.values_mut().fill(0.0);
        for local in &contributions {
            self.scatter(local, Some(&mut system.a), None)?;
        }
        Ok(())
    }

    /// Assemble the residual into `b` (Dirichlet rows already cleared).
    pub fn build_rhs<S: Scheme>(&self, scheme: &S, model_part: &ModelPart, b: &mut DVector<f64>) -> Result<()> {
        if b.len() != self.system_size {
            return Err(KernelError::config(format!(
                "RHS has {} entries, the system has {} equations",
                b.len(),
                self.system_size
            )));
        }
        let contributions = self.evaluate(scheme, model_part, Parts::Rhs)?;
        b.fill(0.0);
        for local in &contributions {
            self.scatter(local, None, Some(b))?;
        }
        self.apply_dirichlet_to_rhs(b);
        Ok(())
    }

    /// Enforce the fixed DOFs on the assembled system. Applying it twice
    /// gives the same system as applying it once.
    pub fn apply_dirichlet_conditions(&self, system: &mut GlobalSystem) {
        if self.policy == DirichletPolicy::Elimination {
            return;
        }
        let first_fixed = self.dof_set.free_count();
        let (offsets, columns, values) = system.a.csr_data_mut();
        for row in 0..offsets.len().saturating_sub(1) {
            for k in offsets[row]..offsets[row + 1] {
                let col = columns[k];
                if row >= first_fixed || col >= first_fixed {
                    values[k] = if row == col { 1.0 } else { 0.0 };
                }
            }
        }
        self.apply_dirichlet_to_rhs(&mut system.b);
        for i in first_fixed..system.dx.len() {
            system.dx[i] = 0.0;
        }
    }

    /// Zero the fixed rows of a right-hand side (block policy only).
    pub fn apply_dirichlet_to_rhs(&self, b: &mut DVector<f64>) {
        if self.policy == DirichletPolicy::Block {
            for i in self.dof_set.free_count()..b.len() {
                b[i] = 0.0;
            }
        }
    }

    /// `Dx = A^-1 b` through the injected linear solver.
    pub fn system_solve(&self, system: &mut GlobalSystem) -> Result<()> {
        system.dx = self.solve_for(&system.a, &system.b)?;
        Ok(())
    }

    /// Solve `A x = rhs` for an arbitrary right-hand side against the current
    /// matrix. Arc-length uses this for its second solve per iteration.
    pub fn solve_for(&self, a: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        if rhs.is_empty() {
            return Ok(DVector::zeros(0));
        }
        let (x, info) = self
            .linear_solver
            .solve(a, rhs)
            .map_err(|e| KernelError::LinearSolverFailure(format!("{}: {}", self.linear_solver.name(), e)))?;
        if self.echo_level > 2 {
            debug!(
                solver = %info.solver_name,
                iterations = info.iterations,
                residual = ?info.residual_norm,
                "linear system solved"
            );
        }
        Ok(x)
    }

    pub fn build_and_solve<S: Scheme>(
        &self,
        scheme: &S,
        model_part: &ModelPart,
        system: &mut GlobalSystem,
    ) -> Result<()> {
        self.build(scheme, model_part, system)?;
        self.apply_dirichlet_conditions(system);
        self.system_solve(system)
    }

    /// Rebuild only `b` and solve against the existing `A`.
    pub fn build_rhs_and_solve<S: Scheme>(
        &self,
        scheme: &S,
        model_part: &ModelPart,
        system: &mut GlobalSystem,
    ) -> Result<()> {
        self.build_rhs(scheme, model_part, &mut system.b)?;
        self.system_solve(system)
    }

    /// Write `reaction = -residual` at every fixed DOF into the DOF's
    /// reaction variable. The residual is assembled over all DOFs regardless
    /// of the Dirichlet policy.
    pub fn calculate_reactions<S: Scheme>(&self, scheme: &S, model_part: &mut ModelPart) -> Result<()> {
        let total = self.dof_set.len();
        let contributions = self.evaluate(scheme, model_part, Parts::Rhs)?;
        let mut residual = DVector::zeros(total);
        for local in &contributions {
            scatter_rhs(local, &mut residual, total)?;
        }

        let nodes = model_part.nodes_mut();
        for dof in self.dof_set.fixed() {
            let Some(reaction) = dof.variable.reaction() else {
                continue;
            };
            let Some(id) = dof.equation_id else {
                continue;
            };
            nodes[dof.node].set_value(reaction, -residual[id])?;
        }
        Ok(())
    }

    /// Drop the DOF set and invalidate the system.
    pub fn clear(&mut self) {
        self.dof_set = DofSet::default();
        self.system_size = 0;
        self.pattern_is_valid = false;
    }

    fn check_sizes(&self, system: &GlobalSystem) -> Result<()> {
        if !self.is_system_initialized(system) {
            return Err(KernelError::config(format!(
                "global system ({} equations) does not match the DOF set ({} equations); resize first",
                system.size(),
                self.system_size
            )));
        }
        Ok(())
    }

    /// Evaluate every local system in parallel. Errors are reported for the
    /// first failing entity in container order.
    fn evaluate<S: Scheme>(&self, scheme: &S, model_part: &ModelPart, parts: Parts) -> Result<Vec<LocalContribution>> {
        let ctx = model_part.context();
        let elements = collect_in_order(
            model_part
                .elements()
                .par_iter()
                .map(|e| local_contribution(scheme, e.as_ref(), &ctx, parts))
                .collect(),
        )?;
        let conditions = collect_in_order(
            model_part
                .conditions()
                .par_iter()
                .map(|c| local_contribution(scheme, c.as_ref(), &ctx, parts))
                .collect(),
        )?;
        Ok(elements.into_iter().chain(conditions).collect())
    }

    fn scatter(
        &self,
        local: &LocalContribution,
        a: Option<&mut CsrMatrix<f64>>,
        b: Option<&mut DVector<f64>>,
    ) -> Result<()> {
        let n = self.system_size;
        if let (Some(a), Some(lhs)) = (a, local.lhs.as_ref()) {
            let (offsets, columns, values) = a.csr_data_mut();
            for (i_local, &i) in local.ids.iter().enumerate() {
                if i >= n {
                    continue;
                }
                let row_columns = &columns[offsets[i]..offsets[i + 1]];
                for (j_local, &j) in local.ids.iter().enumerate() {
                    if j >= n {
                        continue;
                    }
                    let k = row_columns.binary_search(&j).map_err(|_| {
                        KernelError::config(format!(
                            "entry ({}, {}) missing from the sparsity pattern; resize after changing the DOF set",
                            i, j
                        ))
                    })?;
                    values[offsets[i] + k] += lhs[(i_local, j_local)];
                }
            }
        }
        if let Some(b) = b {
            scatter_rhs(local, b, n)?;
        }
        Ok(())
    }
}

fn scatter_rhs(local: &LocalContribution, b: &mut DVector<f64>, n: usize) -> Result<()> {
    if let Some(rhs) = local.rhs.as_ref() {
        for (i_local, &i) in local.ids.iter().enumerate() {
            if i < n {
                b[i] += rhs[i_local];
            }
        }
    }
    Ok(())
}

fn local_contribution<S: Scheme, E: Entity + ?Sized>(
    scheme: &S,
    entity: &E,
    ctx: &EntityContext,
    parts: Parts,
) -> Result<LocalContribution> {
    let ids = scheme.equation_id_vector(entity, ctx)?;
    let mut lhs = DMatrix::zeros(0, 0);
    let mut rhs = DVector::zeros(0);
    match parts {
        Parts::Both => scheme.calculate_system_contributions(entity, ctx, &mut lhs, &mut rhs)?,
        Parts::Lhs => scheme.calculate_lhs_contribution(entity, ctx, &mut lhs)?,
        Parts::Rhs => scheme.calculate_rhs_contribution(entity, ctx, &mut rhs)?,
    }

    let inconsistent = || KernelError::InconsistentLocalSystem {
        entity: entity.kind(),
        id: entity.id(),
        ids: ids.len(),
        rows: if parts == Parts::Rhs { rhs.len() } else { lhs.nrows() },
        cols: if parts == Parts::Rhs { 1 } else { lhs.ncols() },
    };
    if parts != Parts::Rhs && (lhs.nrows() != ids.len() || lhs.ncols() != ids.len()) {
        return Err(inconsistent());
    }
    if parts != Parts::Lhs && rhs.len() != ids.len() {
        return Err(inconsistent());
    }

    Ok(LocalContribution {
        lhs: (parts != Parts::Rhs).then_some(lhs),
        rhs: (parts != Parts::Lhs).then_some(rhs),
        ids,
    })
}

/// Turn per-entity results into values, reporting the first error in
/// container order so failures are deterministic.
fn collect_in_order<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirichlet_policy_parses_from_snake_case() {
        let block: DirichletPolicy = serde_json::from_str("\"block\"").unwrap();
        assert_eq!(block, DirichletPolicy::Block);
        assert!(serde_json::from_str::<DirichletPolicy>("\"penalty\"").is_err());
    }

    #[test]
    fn empty_system_has_no_equations() {
        let system = GlobalSystem::empty();
        assert_eq!(system.size(), 0);
        assert_eq!(system.dense_lhs().nrows(), 0);
    }
}
