//! Reference entities.
//!
//! Small, complete implementations of the entity contract used to exercise
//! the kernel: a scalar spring with a pluggable force law, a linear truss,
//! a heat-conduction element and a nodal load condition.

pub mod laplacian;
pub mod point_load;
pub mod spring;
pub mod truss;

pub use laplacian::LaplacianElement;
pub use point_load::PointLoadCondition;
pub use spring::{LinearSpringLaw, SpringElement, SpringLaw};
pub use truss::TrussElement2D;
