use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The variable bindings of one machine: a name to value mapping visible to
/// every job evaluated on that machine.
///
/// Values are JSON values so that bindings can cross the wire unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(HashMap<String, Value>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Overlays `other` onto these bindings, overwriting existing names.
    pub fn merge(&mut self, other: Bindings) {
        self.0.extend(other.0);
    }

    /// The subset of these bindings whose names appear in `names`.
    /// Unbound names are absent from the result.
    pub fn subset(&self, names: &[String]) -> Bindings {
        Bindings(
            names
                .iter()
                .filter_map(|n| self.0.get(n).map(|v| (n.clone(), v.clone())))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Bindings(iter.into_iter().collect())
    }
}
