//! Model parts: the arena that owns nodes, entities and properties for one
//! physics instance, plus named sub-model-parts that index into it.

use crate::entity::{Condition, Element, EntityContext};
use crate::error::{KernelError, Result};
use crate::node::{Node, NodeIndex, Nodes, SolutionStepData};
use crate::process_info::ProcessInfo;
use crate::properties::Properties;
use crate::variables::{Variable, VariablesList, VectorVariable};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Named subset of the root containers. Sub-model-parts nest; a path such as
/// `"loads.tip"` addresses `tip` inside `loads`.
#[derive(Debug, Clone, Default)]
pub struct SubModelPart {
    pub name: String,
    nodes: BTreeSet<NodeIndex>,
    elements: BTreeSet<usize>,
    conditions: BTreeSet<usize>,
    children: BTreeMap<String, SubModelPart>,
}

impl SubModelPart {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes.iter().copied()
    }

    /// Positions in the root element container.
    pub fn element_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.elements.iter().copied()
    }

    /// Positions in the root condition container.
    pub fn condition_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.conditions.iter().copied()
    }

    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn number_of_conditions(&self) -> usize {
        self.conditions.len()
    }

    pub fn sub_model_part(&self, name: &str) -> Option<&SubModelPart> {
        self.children.get(name)
    }
}

pub struct ModelPart {
    pub name: String,
    buffer_size: usize,
    variables: VariablesList,
    nodes: Nodes,
    elements: Vec<Box<dyn Element>>,
    conditions: Vec<Box<dyn Condition>>,
    properties: BTreeMap<usize, Arc<Properties>>,
    process_info: ProcessInfo,
    sub_model_parts: BTreeMap<String, SubModelPart>,
}

impl std::fmt::Debug for ModelPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelPart")
            .field("name", &self.name)
            .field("buffer_size", &self.buffer_size)
            .field("nodes", &self.nodes.len())
            .field("elements", &self.elements.len())
            .field("conditions", &self.conditions.len())
            .field("sub_model_parts", &self.sub_model_parts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelPart {
    /// `buffer_size` is the number of solution steps kept per node
    /// (1 for static problems, at least 2 for transient schemes).
    pub fn new(name: &str, buffer_size: usize) -> Self {
        Self {
            name: name.to_string(),
            buffer_size: buffer_size.max(1),
            variables: VariablesList::new(),
            nodes: Nodes::new(),
            elements: Vec::new(),
            conditions: Vec::new(),
            properties: BTreeMap::new(),
            process_info: ProcessInfo::new(),
            sub_model_parts: BTreeMap::new(),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn variables(&self) -> &VariablesList {
        &self.variables
    }

    /// Register a nodal variable (and its derivative/reaction chain).
    /// Existing nodes get storage for it as well.
    pub fn add_nodal_solution_step_variable(&mut self, variable: &'static Variable) {
        self.variables.add(variable);
        let registered: Vec<&'static Variable> = self.variables.scalars().collect();
        for node in self.nodes.iter_mut() {
            for var in &registered {
                node.solution_step_data_mut().allocate(var);
            }
        }
    }

    pub fn add_condition_variable(&mut self, variable: &'static VectorVariable) {
        self.variables.add_vector(variable);
    }

    pub fn create_node(&mut self, id: usize, x: f64, y: f64, z: f64) -> Result<NodeIndex> {
        let data = SolutionStepData::new(self.buffer_size, self.variables.scalars());
        self.nodes.push(Node::new(id, x, y, z, data))
    }

    /// Declare `variable` as a DOF on every node.
    pub fn add_dof(&mut self, variable: &'static Variable) {
        if !self.variables.has(variable) {
            self.add_nodal_solution_step_variable(variable);
        }
        for node in self.nodes.iter_mut() {
            node.add_dof(variable);
        }
    }

    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut Nodes {
        &mut self.nodes
    }

    pub fn node(&self, id: usize) -> Result<&Node> {
        self.nodes
            .by_id(id)
            .ok_or_else(|| KernelError::config(format!("model part {} has no node {}", self.name, id)))
    }

    pub fn node_mut(&mut self, id: usize) -> Result<&mut Node> {
        let name = &self.name;
        self.nodes
            .by_id_mut(id)
            .ok_or_else(|| KernelError::config(format!("model part {} has no node {}", name, id)))
    }

    pub fn node_index(&self, id: usize) -> Result<NodeIndex> {
        self.nodes
            .index_of(id)
            .ok_or_else(|| KernelError::config(format!("model part {} has no node {}", self.name, id)))
    }

    pub fn add_properties(&mut self, properties: Properties) -> Arc<Properties> {
        let shared = Arc::new(properties);
        self.properties.insert(shared.id, Arc::clone(&shared));
        shared
    }

    pub fn properties(&self, id: usize) -> Option<Arc<Properties>> {
        self.properties.get(&id).cloned()
    }

    pub fn add_element(&mut self, element: Box<dyn Element>) -> Result<usize> {
        if self.elements.iter().any(|e| e.id() == element.id()) {
            return Err(KernelError::config(format!("duplicate element id {}", element.id())));
        }
        self.check_geometry_handles(element.geometry().node_indices(), element.id())?;
        self.elements.push(element);
        Ok(self.elements.len() - 1)
    }

    pub fn add_condition(&mut self, condition: Box<dyn Condition>) -> Result<usize> {
        if self.conditions.iter().any(|c| c.id() == condition.id()) {
            return Err(KernelError::config(format!("duplicate condition id {}", condition.id())));
        }
        self.check_geometry_handles(condition.geometry().node_indices(), condition.id())?;
        self.conditions.push(condition);
        Ok(self.conditions.len() - 1)
    }

    fn check_geometry_handles(&self, handles: &[NodeIndex], id: usize) -> Result<()> {
        match handles.iter().find(|h| self.nodes.get(**h).is_none()) {
            Some(h) => Err(KernelError::config(format!(
                "entity {} refers to node handle {} outside the node container",
                id, h.0
            ))),
            None => Ok(()),
        }
    }

    pub fn elements(&self) -> &[Box<dyn Element>] {
        &self.elements
    }

    pub fn conditions(&self) -> &[Box<dyn Condition>] {
        &self.conditions
    }

    pub fn conditions_mut(&mut self) -> &mut [Box<dyn Condition>] {
        &mut self.conditions
    }

    pub fn process_info(&self) -> &ProcessInfo {
        &self.process_info
    }

    pub fn process_info_mut(&mut self) -> &mut ProcessInfo {
        &mut self.process_info
    }

    pub fn context(&self) -> EntityContext<'_> {
        EntityContext::new(&self.nodes, &self.process_info)
    }

    /// Visit every element mutably with a read-only view of nodes and
    /// process info.
    pub fn for_each_element_mut<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut dyn Element, &EntityContext) -> Result<()>,
    {
        let ctx = EntityContext::new(&self.nodes, &self.process_info);
        for element in self.elements.iter_mut() {
            f(element.as_mut(), &ctx)?;
        }
        Ok(())
    }

    pub fn for_each_condition_mut<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut dyn Condition, &EntityContext) -> Result<()>,
    {
        let ctx = EntityContext::new(&self.nodes, &self.process_info);
        for condition in self.conditions.iter_mut() {
            f(condition.as_mut(), &ctx)?;
        }
        Ok(())
    }

    /// Run every entity's `check`.
    pub fn check(&self) -> Result<()> {
        let ctx = self.context();
        for element in &self.elements {
            element.check(&ctx)?;
        }
        for condition in &self.conditions {
            condition.check(&ctx)?;
        }
        Ok(())
    }

    /// Advance to a new time step: shift every node's history buffer and
    /// update time, delta time and step counter.
    pub fn clone_time_step(&mut self, new_time: f64) {
        for node in self.nodes.iter_mut() {
            node.solution_step_data_mut().clone_step();
        }
        self.process_info.clone_time_step(new_time);
    }

    /// Create (or return) the sub-model-part at a dot-separated path,
    /// creating intermediate levels as needed.
    pub fn create_sub_model_part(&mut self, path: &str) -> Result<&mut SubModelPart> {
        let mut parts = path.split('.');
        let first = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| KernelError::config("empty sub-model-part name"))?;
        let mut current = self
            .sub_model_parts
            .entry(first.to_string())
            .or_insert_with(|| SubModelPart::new(first));
        for name in parts {
            if name.is_empty() {
                return Err(KernelError::config(format!("invalid sub-model-part path '{}'", path)));
            }
            current = current
                .children
                .entry(name.to_string())
                .or_insert_with(|| SubModelPart::new(name));
        }
        Ok(current)
    }

    pub fn has_sub_model_part(&self, path: &str) -> bool {
        self.sub_model_part(path).is_ok()
    }

    pub fn sub_model_part(&self, path: &str) -> Result<&SubModelPart> {
        let missing = || KernelError::config(format!("model part {} has no sub-model-part '{}'", self.name, path));
        let mut parts = path.split('.');
        let mut current = parts
            .next()
            .and_then(|first| self.sub_model_parts.get(first))
            .ok_or_else(missing)?;
        for name in parts {
            current = current.children.get(name).ok_or_else(missing)?;
        }
        Ok(current)
    }

    /// Add nodes (by id) to the sub-model-part at `path` and to every
    /// level above it.
    pub fn add_nodes_to_sub_model_part(&mut self, path: &str, node_ids: &[usize]) -> Result<()> {
        let indices = node_ids
            .iter()
            .map(|&id| self.node_index(id))
            .collect::<Result<Vec<_>>>()?;
        self.for_each_level(path, |smp| smp.nodes.extend(indices.iter().copied()))
    }

    /// Add conditions (by id) and their nodes to the sub-model-part at `path`.
    pub fn add_conditions_to_sub_model_part(&mut self, path: &str, condition_ids: &[usize]) -> Result<()> {
        let wanted: HashSet<usize> = condition_ids.iter().copied().collect();
        let mut positions = Vec::new();
        let mut nodes = Vec::new();
        for (pos, condition) in self.conditions.iter().enumerate() {
            if wanted.contains(&condition.id()) {
                positions.push(pos);
                nodes.extend_from_slice(condition.geometry().node_indices());
            }
        }
        if positions.len() != wanted.len() {
            return Err(KernelError::config(format!(
                "some of the conditions {:?} do not exist in model part {}",
                condition_ids, self.name
            )));
        }
        self.for_each_level(path, |smp| {
            smp.conditions.extend(positions.iter().copied());
            smp.nodes.extend(nodes.iter().copied());
        })
    }

    pub fn add_elements_to_sub_model_part(&mut self, path: &str, element_ids: &[usize]) -> Result<()> {
        let wanted: HashSet<usize> = element_ids.iter().copied().collect();
        let mut positions = Vec::new();
        let mut nodes = Vec::new();
        for (pos, element) in self.elements.iter().enumerate() {
            if wanted.contains(&element.id()) {
                positions.push(pos);
                nodes.extend_from_slice(element.geometry().node_indices());
            }
        }
        if positions.len() != wanted.len() {
            return Err(KernelError::config(format!(
                "some of the elements {:?} do not exist in model part {}",
                element_ids, self.name
            )));
        }
        self.for_each_level(path, |smp| {
            smp.elements.extend(positions.iter().copied());
            smp.nodes.extend(nodes.iter().copied());
        })
    }

    fn for_each_level<F>(&mut self, path: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&mut SubModelPart),
    {
        if !self.has_sub_model_part(path) {
            return Err(KernelError::config(format!(
                "model part {} has no sub-model-part '{}'",
                self.name, path
            )));
        }
        let mut parts = path.split('.');
        let mut current = match parts.next().and_then(|first| self.sub_model_parts.get_mut(first)) {
            Some(smp) => smp,
            None => return Ok(()),
        };
        f(current);
        for name in parts {
            current = match current.children.get_mut(name) {
                Some(child) => child,
                None => return Ok(()),
            };
            f(current);
        }
        Ok(())
    }
}
