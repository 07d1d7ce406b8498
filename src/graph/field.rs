// src/graph/field.rs

//! Field value type: references, identity seeds and value casting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::FieldAddress;

/// Direction of a reference edge relative to the declaring field.
///
/// - `To`: the declaring field supplies values to the target.
/// - `From`: the declaring field receives values from the target.
///
/// A reference without a direction can carry values either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefDirection {
    From,
    To,
}

/// A declared link from the declaring field to another field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub target: FieldAddress,
    pub direction: Option<RefDirection>,
}

/// Declared data type of a field, used to cast retrieved values for
/// consistent downstream comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Integer,
    Float,
    Boolean,
}

/// A single addressable datum inside a collection.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub primary_key: bool,
    pub references: Vec<FieldRef>,
    /// Seed key this field accepts (e.g. `email`), if any.
    pub identity: Option<String>,
    pub data_categories: Vec<String>,
    pub data_type: Option<DataType>,
    pub length: Option<usize>,
}

impl Field {
    /// The field name split into path segments for nested row data.
    pub fn field_path(&self) -> Vec<String> {
        self.name.split('.').map(|s| s.to_string()).collect()
    }

    /// Convert a raw retrieved value into the declared data type.
    ///
    /// With no declared type this is a pass-through. Values that cannot be
    /// converted are also passed through unchanged; connectors compare what
    /// they get.
    pub fn cast(&self, value: Value) -> Value {
        let Some(data_type) = self.data_type else {
            return value;
        };

        match data_type {
            DataType::String => match value {
                Value::String(_) => value,
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                other => other,
            },
            DataType::Integer => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => value,
                Value::String(s) => s
                    .parse::<i64>()
                    .map(|i| Value::Number(i.into()))
                    .unwrap_or(value),
                _ => value,
            },
            DataType::Float => match &value {
                Value::Number(_) => value,
                Value::String(s) => s
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(value),
                _ => value,
            },
            DataType::Boolean => match &value {
                Value::Bool(_) => value,
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    _ => value,
                },
                _ => value,
            },
        }
    }
}
