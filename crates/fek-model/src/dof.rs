//! Degree-of-freedom registry and equation numbering.
//!
//! Free DOFs are numbered `[0, N)` and fixed DOFs `[N, N_total)`, both in
//! (node id, variable name) order, so the numbering only depends on the set
//! of declared DOFs and never on container or thread order.

use crate::error::{KernelError, Result};
use crate::node::{NodeIndex, Nodes};
use crate::variables::Variable;
use std::collections::BTreeMap;

/// Key identifying one unknown: (node id, variable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DofKey {
    pub node_id: usize,
    pub variable: &'static Variable,
}

/// Snapshot of a DOF as reported by an entity's DOF list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dof {
    pub node_id: usize,
    pub node: NodeIndex,
    pub variable: &'static Variable,
    pub fixed: bool,
    pub equation_id: Option<usize>,
}

impl Dof {
    pub fn key(&self) -> DofKey {
        DofKey {
            node_id: self.node_id,
            variable: self.variable,
        }
    }
}

/// Deduplicated, ordered set of DOFs taking part in one system.
#[derive(Debug, Clone, Default)]
pub struct DofSet {
    dofs: Vec<Dof>,
    positions: BTreeMap<DofKey, usize>,
    free_count: usize,
    numbered: bool,
}

impl DofSet {
    /// Collect DOFs, dropping duplicates. The same key reported once as
    /// fixed and once as free is a configuration error.
    pub fn from_dofs(dofs: impl IntoIterator<Item = Dof>) -> Result<Self> {
        let mut unique: BTreeMap<DofKey, Dof> = BTreeMap::new();
        for dof in dofs {
            match unique.get(&dof.key()) {
                Some(existing) if existing.fixed != dof.fixed => {
                    return Err(KernelError::config(format!(
                        "DOF {} of node {} declared both fixed and free",
                        dof.variable, dof.node_id
                    )));
                }
                Some(_) => {}
                None => {
                    unique.insert(dof.key(), dof);
                }
            }
        }

        let dofs: Vec<Dof> = unique
            .into_values()
            .map(|d| Dof {
                equation_id: None,
                ..d
            })
            .collect();
        let positions = dofs.iter().enumerate().map(|(i, d)| (d.key(), i)).collect();
        let free_count = dofs.iter().filter(|d| !d.fixed).count();

        Ok(Self {
            dofs,
            positions,
            free_count,
            numbered: false,
        })
    }

    /// Assign equation ids and write them back onto the nodes.
    pub fn number_equations(&mut self, nodes: &mut Nodes) -> Result<()> {
        let mut next_free = 0;
        let mut next_fixed = self.free_count;
        for dof in &mut self.dofs {
            let id = if dof.fixed {
                next_fixed += 1;
                next_fixed - 1
            } else {
                next_free += 1;
                next_free - 1
            };
            dof.equation_id = Some(id);

            let node = nodes.get_mut(dof.node).ok_or_else(|| {
                KernelError::config(format!("DOF refers to unknown node {}", dof.node_id))
            })?;
            let nodal = node.dof_mut(dof.variable).ok_or_else(|| {
                KernelError::config(format!(
                    "node {} has no DOF {} declared",
                    dof.node_id, dof.variable
                ))
            })?;
            nodal.equation_id = Some(id);
        }
        self.numbered = true;
        Ok(())
    }

    pub fn is_numbered(&self) -> bool {
        self.numbered
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn fixed_count(&self) -> usize {
        self.dofs.len() - self.free_count
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dof> {
        self.dofs.iter()
    }

    pub fn free(&self) -> impl Iterator<Item = &Dof> {
        self.dofs.iter().filter(|d| !d.fixed)
    }

    pub fn fixed(&self) -> impl Iterator<Item = &Dof> {
        self.dofs.iter().filter(|d| d.fixed)
    }

    pub fn get(&self, node_id: usize, variable: &'static Variable) -> Option<&Dof> {
        self.positions
            .get(&DofKey { node_id, variable })
            .map(|&i| &self.dofs[i])
    }

    /// Equation ids in set order.
    pub fn equation_ids(&self) -> Vec<Option<usize>> {
        self.dofs.iter().map(|d| d.equation_id).collect()
    }

    /// Current nodal values of every DOF, in set order.
    pub fn values(&self, nodes: &Nodes) -> Result<Vec<f64>> {
        self.dofs
            .iter()
            .map(|d| nodes[d.node].value(d.variable))
            .collect()
    }

    /// Inverse of [`DofSet::values`].
    pub fn set_values(&self, nodes: &mut Nodes, values: &[f64]) -> Result<()> {
        if values.len() != self.dofs.len() {
            return Err(KernelError::config(format!(
                "expected {} DOF values, got {}",
                self.dofs.len(),
                values.len()
            )));
        }
        for (dof, &value) in self.dofs.iter().zip(values) {
            nodes[dof.node].set_value(dof.variable, value)?;
        }
        Ok(())
    }
}
