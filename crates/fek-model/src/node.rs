//! Nodes, their solution-step history and the node arena.
//!
//! Nodes live in one contiguous container owned by the model part.
//! Geometries refer to them through [`NodeIndex`] handles, which stay valid
//! for as long as the node container is not rebuilt.

use crate::error::{EntityKind, KernelError, Result};
use crate::variables::Variable;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Handle into the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub usize);

/// Ring buffer of nodal values: step 0 is the current step, step 1 the
/// previous converged step, and so on up to `buffer_size - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionStepData {
    steps: VecDeque<BTreeMap<&'static str, f64>>,
    buffer_size: usize,
}

impl SolutionStepData {
    pub fn new(buffer_size: usize, variables: impl Iterator<Item = &'static Variable>) -> Self {
        let buffer_size = buffer_size.max(1);
        let step: BTreeMap<&'static str, f64> = variables.map(|v| (v.name(), 0.0)).collect();
        Self {
            steps: std::iter::repeat_n(step, buffer_size).collect(),
            buffer_size,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn has(&self, variable: &Variable) -> bool {
        self.steps[0].contains_key(variable.name())
    }

    pub fn get(&self, variable: &Variable, step: usize) -> Option<f64> {
        self.steps.get(step)?.get(variable.name()).copied()
    }

    pub fn get_mut(&mut self, variable: &Variable, step: usize) -> Option<&mut f64> {
        self.steps.get_mut(step)?.get_mut(variable.name())
    }

    /// Add storage for a variable in every step (no-op if present).
    pub fn allocate(&mut self, variable: &Variable) {
        for step in &mut self.steps {
            step.entry(variable.name()).or_insert(0.0);
        }
    }

    /// Shift the history by one step; the new current step starts as a copy
    /// of the previous current step.
    pub fn clone_step(&mut self) {
        let current = self.steps[0].clone();
        self.steps.push_front(current);
        self.steps.truncate(self.buffer_size);
    }
}

/// A DOF as stored on its node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodalDof {
    pub variable: &'static Variable,
    pub fixed: bool,
    pub equation_id: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: usize,
    pub coordinates: [f64; 3],
    pub initial_coordinates: [f64; 3],
    data: SolutionStepData,
    dofs: Vec<NodalDof>,
}

impl Node {
    pub fn new(id: usize, x: f64, y: f64, z: f64, data: SolutionStepData) -> Self {
        Self {
            id,
            coordinates: [x, y, z],
            initial_coordinates: [x, y, z],
            data,
            dofs: Vec::new(),
        }
    }

    pub fn x(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn y(&self) -> f64 {
        self.coordinates[1]
    }

    pub fn z(&self) -> f64 {
        self.coordinates[2]
    }

    pub fn solution_step_data(&self) -> &SolutionStepData {
        &self.data
    }

    pub fn solution_step_data_mut(&mut self) -> &mut SolutionStepData {
        &mut self.data
    }

    pub fn has_solution_step_value(&self, variable: &Variable) -> bool {
        self.data.has(variable)
    }

    /// Current value of `variable`, or a `MissingData` error naming the node.
    pub fn value(&self, variable: &Variable) -> Result<f64> {
        self.value_at(variable, 0)
    }

    pub fn value_at(&self, variable: &Variable, step: usize) -> Result<f64> {
        self.data.get(variable, step).ok_or_else(|| {
            KernelError::missing(
                EntityKind::Node,
                self.id,
                format!("no solution-step value for {} at step {}", variable, step),
            )
        })
    }

    pub fn value_mut(&mut self, variable: &Variable) -> Result<&mut f64> {
        let id = self.id;
        self.data.get_mut(variable, 0).ok_or_else(|| {
            KernelError::missing(
                EntityKind::Node,
                id,
                format!("no solution-step value for {}", variable),
            )
        })
    }

    pub fn set_value(&mut self, variable: &Variable, value: f64) -> Result<()> {
        *self.value_mut(variable)? = value;
        Ok(())
    }

    /// Declare `variable` as an unknown on this node. The reaction variable
    /// (if any) gets storage as well.
    pub fn add_dof(&mut self, variable: &'static Variable) {
        if self.dofs.iter().any(|d| d.variable == variable) {
            return;
        }
        self.data.allocate(variable);
        if let Some(reaction) = variable.reaction() {
            self.data.allocate(reaction);
        }
        self.dofs.push(NodalDof {
            variable,
            fixed: false,
            equation_id: None,
        });
    }

    pub fn has_dof(&self, variable: &Variable) -> bool {
        self.dof(variable).is_some()
    }

    pub fn dof(&self, variable: &Variable) -> Option<&NodalDof> {
        self.dofs.iter().find(|d| d.variable == variable)
    }

    pub fn dof_mut(&mut self, variable: &Variable) -> Option<&mut NodalDof> {
        self.dofs.iter_mut().find(|d| d.variable == variable)
    }

    pub fn dofs(&self) -> &[NodalDof] {
        &self.dofs
    }

    pub fn fix(&mut self, variable: &Variable) -> Result<()> {
        self.set_fixity(variable, true)
    }

    pub fn free(&mut self, variable: &Variable) -> Result<()> {
        self.set_fixity(variable, false)
    }

    pub fn is_fixed(&self, variable: &Variable) -> bool {
        self.dof(variable).is_some_and(|d| d.fixed)
    }

    fn set_fixity(&mut self, variable: &Variable, fixed: bool) -> Result<()> {
        let id = self.id;
        let dof = self.dof_mut(variable).ok_or_else(|| {
            KernelError::missing(EntityKind::Node, id, format!("no DOF declared for {}", variable))
        })?;
        dof.fixed = fixed;
        Ok(())
    }

    /// Equation id assigned by the last `set_up_system`.
    pub fn equation_id(&self, variable: &Variable) -> Result<usize> {
        self.dof(variable)
            .and_then(|d| d.equation_id)
            .ok_or_else(|| {
                KernelError::missing(
                    EntityKind::Node,
                    self.id,
                    format!("DOF {} has no equation id (not in the current DOF set)", variable),
                )
            })
    }
}

/// Contiguous node storage with id lookup.
#[derive(Debug, Clone, Default)]
pub struct Nodes {
    nodes: Vec<Node>,
    by_id: HashMap<usize, NodeIndex>,
}

impl Nodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node; a duplicate id is a configuration error.
    pub fn push(&mut self, node: Node) -> Result<NodeIndex> {
        if self.by_id.contains_key(&node.id) {
            return Err(KernelError::config(format!("duplicate node id {}", node.id)));
        }
        let index = NodeIndex(self.nodes.len());
        self.by_id.insert(node.id, index);
        self.nodes.push(node);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, id: usize) -> Option<NodeIndex> {
        self.by_id.get(&id).copied()
    }

    pub fn get(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.0)
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        self.nodes.get_mut(index.0)
    }

    pub fn by_id(&self, id: usize) -> Option<&Node> {
        self.index_of(id).and_then(|i| self.get(i))
    }

    pub fn by_id_mut(&mut self, id: usize) -> Option<&mut Node> {
        let index = self.index_of(id)?;
        self.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }
}

impl std::ops::Index<NodeIndex> for Nodes {
    type Output = Node;

    fn index(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.0]
    }
}

impl std::ops::IndexMut<NodeIndex> for Nodes {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index.0]
    }
}
