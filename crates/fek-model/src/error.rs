//! Error types for the finite-element kernel.

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

/// Which entity container an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Element,
    Condition,
    Node,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Element => write!(f, "element"),
            EntityKind::Condition => write!(f, "condition"),
            EntityKind::Node => write!(f, "node"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// Malformed or contradictory setup, raised before any numerical work.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Degenerate or inverted geometry found while computing a local system.
    #[error("geometry error in {entity} {id}: {message}")]
    Geometry {
        entity: EntityKind,
        id: usize,
        message: String,
    },

    #[error("constitutive law error in {entity} {id}: {message}")]
    ConstitutiveLaw {
        entity: EntityKind,
        id: usize,
        message: String,
    },

    /// A required nodal variable, DOF or property is absent.
    #[error("missing data for {entity} {id}: {message}")]
    MissingData {
        entity: EntityKind,
        id: usize,
        message: String,
    },

    /// Local matrix/vector sizes disagree with the equation-id vector.
    #[error(
        "{entity} {id} returned a {rows}x{cols} local system for {ids} equation ids"
    )]
    InconsistentLocalSystem {
        entity: EntityKind,
        id: usize,
        ids: usize,
        rows: usize,
        cols: usize,
    },

    #[error("linear solver failure: {0}")]
    LinearSolverFailure(String),

    /// Near-zero `DxPred . Dxf` in the arc-length corrector.
    #[error("singular arc-length step (denominator = {denominator:e})")]
    SingularArcLengthStep { denominator: f64 },

    #[error("maximum number of nonlinear iterations ({iterations}) exceeded")]
    MaxIterationsExceeded { iterations: usize },
}

impl KernelError {
    pub fn config(message: impl Into<String>) -> Self {
        KernelError::Configuration(message.into())
    }

    pub fn geometry(entity: EntityKind, id: usize, message: impl Into<String>) -> Self {
        KernelError::Geometry {
            entity,
            id,
            message: message.into(),
        }
    }

    pub fn constitutive(entity: EntityKind, id: usize, message: impl Into<String>) -> Self {
        KernelError::ConstitutiveLaw {
            entity,
            id,
            message: message.into(),
        }
    }

    pub fn missing(entity: EntityKind, id: usize, message: impl Into<String>) -> Self {
        KernelError::MissingData {
            entity,
            id,
            message: message.into(),
        }
    }

    /// Whether a strategy may reasonably retry the step with a smaller
    /// increment instead of aborting the run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KernelError::LinearSolverFailure(_)
                | KernelError::SingularArcLengthStep { .. }
                | KernelError::MaxIterationsExceeded { .. }
        )
    }
}
