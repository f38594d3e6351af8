//! Variable descriptors and the per-model-part variable catalog.
//!
//! A [`Variable`] names one scalar nodal quantity. DOF variables may point at
//! their time derivative (used by transient schemes) and at the variable that
//! receives the reaction when the DOF is fixed. Identity is by name, so two
//! descriptors with the same name are the same variable.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Scalar nodal variable.
#[derive(Clone, Copy)]
pub struct Variable {
    name: &'static str,
    time_derivative: Option<&'static Variable>,
    reaction: Option<&'static Variable>,
}

impl Variable {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            time_derivative: None,
            reaction: None,
        }
    }

    pub const fn with_time_derivative(mut self, derivative: &'static Variable) -> Self {
        self.time_derivative = Some(derivative);
        self
    }

    pub const fn with_reaction(mut self, reaction: &'static Variable) -> Self {
        self.reaction = Some(reaction);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn time_derivative(&self) -> Option<&'static Variable> {
        self.time_derivative
    }

    /// Derivative of the derivative (e.g. acceleration for a displacement).
    pub fn second_time_derivative(&self) -> Option<&'static Variable> {
        self.time_derivative.and_then(|d| d.time_derivative)
    }

    pub fn reaction(&self) -> Option<&'static Variable> {
        self.reaction
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable({})", self.name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Three-component quantity stored on conditions (e.g. a point load vector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VectorVariable {
    name: &'static str,
}

impl VectorVariable {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for VectorVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub static ACCELERATION_X: Variable = Variable::new("ACCELERATION_X");
pub static ACCELERATION_Y: Variable = Variable::new("ACCELERATION_Y");
pub static ACCELERATION_Z: Variable = Variable::new("ACCELERATION_Z");

pub static VELOCITY_X: Variable = Variable::new("VELOCITY_X").with_time_derivative(&ACCELERATION_X);
pub static VELOCITY_Y: Variable = Variable::new("VELOCITY_Y").with_time_derivative(&ACCELERATION_Y);
pub static VELOCITY_Z: Variable = Variable::new("VELOCITY_Z").with_time_derivative(&ACCELERATION_Z);

pub static REACTION_X: Variable = Variable::new("REACTION_X");
pub static REACTION_Y: Variable = Variable::new("REACTION_Y");
pub static REACTION_Z: Variable = Variable::new("REACTION_Z");

pub static DISPLACEMENT_X: Variable = Variable::new("DISPLACEMENT_X")
    .with_time_derivative(&VELOCITY_X)
    .with_reaction(&REACTION_X);
pub static DISPLACEMENT_Y: Variable = Variable::new("DISPLACEMENT_Y")
    .with_time_derivative(&VELOCITY_Y)
    .with_reaction(&REACTION_Y);
pub static DISPLACEMENT_Z: Variable = Variable::new("DISPLACEMENT_Z")
    .with_time_derivative(&VELOCITY_Z)
    .with_reaction(&REACTION_Z);

pub static TEMPERATURE_RATE: Variable = Variable::new("TEMPERATURE_RATE");
pub static REACTION_FLUX: Variable = Variable::new("REACTION_FLUX");
pub static TEMPERATURE: Variable = Variable::new("TEMPERATURE")
    .with_time_derivative(&TEMPERATURE_RATE)
    .with_reaction(&REACTION_FLUX);

pub static POINT_LOAD_X: Variable = Variable::new("POINT_LOAD_X");
pub static POINT_LOAD_Y: Variable = Variable::new("POINT_LOAD_Y");
pub static POINT_LOAD_Z: Variable = Variable::new("POINT_LOAD_Z");
pub static HEAT_FLUX: Variable = Variable::new("HEAT_FLUX");

pub static POINT_LOAD: VectorVariable = VectorVariable::new("POINT_LOAD");
pub static LINE_LOAD: VectorVariable = VectorVariable::new("LINE_LOAD");
pub static SURFACE_LOAD: VectorVariable = VectorVariable::new("SURFACE_LOAD");

/// Displacement components, in axis order.
pub static DISPLACEMENT: [&Variable; 3] = [&DISPLACEMENT_X, &DISPLACEMENT_Y, &DISPLACEMENT_Z];

/// Catalog of the variables a model part knows about.
#[derive(Debug, Clone, Default)]
pub struct VariablesList {
    scalars: BTreeMap<&'static str, &'static Variable>,
    vectors: BTreeMap<&'static str, &'static VectorVariable>,
}

/// Result of resolving a variable name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariableRef {
    Scalar(&'static Variable),
    Vector(&'static VectorVariable),
}

impl VariablesList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a nodal variable together with its derivative and reaction
    /// chain, so transient schemes and reaction output find storage for them.
    pub fn add(&mut self, variable: &'static Variable) {
        let mut next = Some(variable);
        while let Some(var) = next {
            self.scalars.insert(var.name(), var);
            if let Some(reaction) = var.reaction() {
                self.scalars.insert(reaction.name(), reaction);
            }
            next = var.time_derivative();
        }
    }

    pub fn add_vector(&mut self, variable: &'static VectorVariable) {
        self.vectors.insert(variable.name(), variable);
    }

    pub fn has(&self, variable: &Variable) -> bool {
        self.scalars.contains_key(variable.name())
    }

    pub fn scalars(&self) -> impl Iterator<Item = &'static Variable> + '_ {
        self.scalars.values().copied()
    }

    pub fn resolve(&self, name: &str) -> Option<VariableRef> {
        if let Some(var) = self.scalars.get(name) {
            return Some(VariableRef::Scalar(*var));
        }
        self.vectors.get(name).map(|v| VariableRef::Vector(*v))
    }

    pub fn len(&self) -> usize {
        self.scalars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty()
    }
}
