//! Named vector values carried by conditions.

use crate::variables::VectorVariable;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValueContainer {
    values: BTreeMap<&'static str, [f64; 3]>,
}

impl DataValueContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, variable: &VectorVariable) -> Option<[f64; 3]> {
        self.values.get(variable.name()).copied()
    }

    pub fn set(&mut self, variable: &VectorVariable, value: [f64; 3]) {
        self.values.insert(variable.name(), value);
    }

    pub fn has(&self, variable: &VectorVariable) -> bool {
        self.values.contains_key(variable.name())
    }

    /// Multiply every component of `variable` by `factor` (no-op if unset).
    pub fn scale(&mut self, variable: &VectorVariable, factor: f64) {
        if let Some(v) = self.values.get_mut(variable.name()) {
            for c in v.iter_mut() {
                *c *= factor;
            }
        }
    }
}
