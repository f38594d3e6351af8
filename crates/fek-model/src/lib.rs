//! Entity model for the finite-element kernel.
//!
//! Nodes with solution-step history, the DOF registry, reference geometries,
//! the element/condition contract and the model part that owns them.

pub mod data_container;
pub mod dof;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod model_part;
pub mod node;
pub mod process_info;
pub mod properties;
pub mod variables;

pub use data_container::DataValueContainer;
pub use dof::{Dof, DofKey, DofSet};
pub use entity::{check_nodal_dofs, Condition, Element, Entity, EntityContext};
pub use error::{EntityKind, KernelError, Result};
pub use geometry::{Geometry, GeometryFamily, IntegrationMethod, IntegrationPoint};
pub use model_part::{ModelPart, SubModelPart};
pub use node::{NodalDof, Node, NodeIndex, Nodes, SolutionStepData};
pub use process_info::{ProcessInfo, ProcessValue};
pub use properties::Properties;
pub use variables::{Variable, VariableRef, VariablesList, VectorVariable};
