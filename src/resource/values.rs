//! Values tree of a Helm release.
//!
//! Values arrive either from a manifest file (YAML, where mapping keys may
//! be any scalar) or from the Kubernetes API (JSON, string keys only).
//! Both are normalised into one `serde_yaml::Mapping` at construction time
//! so the interpreter walks a single representation.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::ManifestError;

/// The `values` stanza of a release. Key order is preserved as read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(Mapping);

impl Values {
    /// Create an empty values tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from generically decoded YAML. `null` is an empty tree.
    pub fn from_yaml(value: Value) -> Result<Self, ManifestError> {
        match value {
            Value::Mapping(m) => Ok(Self(m)),
            Value::Null => Ok(Self::new()),
            other => Err(ManifestError::InvalidValues(kind_of(&other).to_string())),
        }
    }

    /// Build from a JSON object, as returned by the cluster API.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ManifestError> {
        let value = serde_yaml::to_value(value)
            .map_err(|e| ManifestError::InvalidValues(e.to_string()))?;
        Self::from_yaml(value)
    }

    /// Parse a values document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_yaml::from_str(content).map_err(|error| ManifestError::Yaml {
            source_name: "values".to_string(),
            error,
        })?;
        Self::from_yaml(value)
    }

    /// Top-level string keys in lexicographic order. Non-string keys are
    /// never container names and are left out.
    pub fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .0
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    pub fn as_mapping_mut(&mut self) -> &mut Mapping {
        &mut self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Mapping(self.0)
    }
}

impl From<Mapping> for Values {
    fn from(m: Mapping) -> Self {
        Self(m)
    }
}

/// Short name of a value's variant, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
