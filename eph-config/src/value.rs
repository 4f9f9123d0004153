//! Typed configuration values handed to the automation engine.

use std::fmt;

use eph_core::{Result, WorkspaceError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;

use crate::merge::kind_name;

/// A configuration tree that keeps the scalar kind of every leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<EngineValue>),
    Map(IndexMap<String, EngineValue>),
}

impl EngineValue {
    pub fn is_structured(&self) -> bool {
        matches!(self, EngineValue::List(_) | EngineValue::Map(_))
    }

    /// Render as the single string an engine config entry stores. Structured
    /// values are encoded as JSON.
    pub fn to_config_string(&self) -> String {
        match self {
            EngineValue::Null => String::new(),
            EngineValue::Bool(b) => b.to_string(),
            EngineValue::Int(i) => i.to_string(),
            EngineValue::Float(f) => f.to_string(),
            EngineValue::String(s) => s.clone(),
            EngineValue::List(_) | EngineValue::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EngineValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for EngineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_config_string())
    }
}

impl From<&str> for EngineValue {
    fn from(value: &str) -> Self {
        EngineValue::String(value.to_string())
    }
}

impl From<String> for EngineValue {
    fn from(value: String) -> Self {
        EngineValue::String(value)
    }
}

impl From<bool> for EngineValue {
    fn from(value: bool) -> Self {
        EngineValue::Bool(value)
    }
}

/// Convert a merged YAML document into the engine's typed tree.
///
/// Tagged values, non-string mapping keys and integers outside the `i64`
/// range are rejected rather than stringified.
pub fn to_engine(value: &Value) -> Result<EngineValue> {
    convert(value, "$")
}

fn convert(value: &Value, path: &str) -> Result<EngineValue> {
    match value {
        Value::Null => Ok(EngineValue::Null),
        Value::Bool(b) => Ok(EngineValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(EngineValue::Int(i))
            } else if n.is_f64() {
                n.as_f64().map(EngineValue::Float).ok_or_else(|| {
                    WorkspaceError::Config(format!("unrepresentable float at {path}"))
                })
            } else {
                Err(WorkspaceError::Config(format!(
                    "integer {n} at {path} does not fit in a signed 64-bit value"
                )))
            }
        }
        Value::String(s) => Ok(EngineValue::String(s.clone())),
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| convert(item, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>>>()
            .map(EngineValue::List),
        Value::Mapping(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (key, item) in map {
                let key = match key {
                    Value::String(s) => s.clone(),
                    other => {
                        return Err(WorkspaceError::Config(format!(
                            "mapping key at {path} must be a string, got {}",
                            kind_name(other)
                        )))
                    }
                };
                let child = convert(item, &format!("{path}.{key}"))?;
                out.insert(key, child);
            }
            Ok(EngineValue::Map(out))
        }
        Value::Tagged(tagged) => Err(WorkspaceError::Config(format!(
            "unsupported tagged value {} at {path}",
            tagged.tag
        ))),
    }
}
