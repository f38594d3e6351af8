//! Material and numerical parameters shared by many entities.

use crate::error::{EntityKind, KernelError, Result};
use std::collections::BTreeMap;

pub const STIFFNESS: &str = "STIFFNESS";
pub const NODAL_MASS: &str = "NODAL_MASS";
pub const DAMPING_COEFFICIENT: &str = "DAMPING_COEFFICIENT";
pub const CONDUCTIVITY: &str = "CONDUCTIVITY";
pub const HEAT_CAPACITY: &str = "HEAT_CAPACITY";
pub const THICKNESS: &str = "THICKNESS";
pub const YOUNG_MODULUS: &str = "YOUNG_MODULUS";
pub const CROSS_AREA: &str = "CROSS_AREA";
pub const DENSITY: &str = "DENSITY";

/// Key-value bag of scalar parameters. Entities hold it through an `Arc`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Properties {
    pub id: usize,
    values: BTreeMap<String, f64>,
}

impl Properties {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value of a parameter the entity cannot work without.
    pub fn require(&self, key: &str, entity: EntityKind, id: usize) -> Result<f64> {
        self.get(key).ok_or_else(|| {
            KernelError::missing(
                entity,
                id,
                format!("properties {} do not define {}", self.id, key),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reports_missing_parameter() {
        let props = Properties::new(4).with(STIFFNESS, 10.0);
        assert_eq!(props.require(STIFFNESS, EntityKind::Element, 1).unwrap(), 10.0);
        let err = props.require(CONDUCTIVITY, EntityKind::Element, 1).unwrap_err();
        assert!(err.to_string().contains("CONDUCTIVITY"));
    }
}
