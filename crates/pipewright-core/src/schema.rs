//! Declared result shapes and the validator applied to executor output.
//!
//! [`OutputSchema`] is a small JSON-Schema subset (`type`, `required`,
//! `properties`, `items`). It serialises to a JSON-Schema-shaped document so
//! it can be handed to the executor verbatim as the required output format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// JSON value kinds a schema node can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
}

impl SchemaType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            // 2.0 is an integer too.
            Self::Integer => value.as_f64().is_some_and(|n| n.fract() == 0.0),
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// Name of the JSON kind of `value`, as reported in diagnostics.
fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A declared result shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, OutputSchema>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<OutputSchema>>,
}

impl OutputSchema {
    fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            required: Vec::new(),
            properties: BTreeMap::new(),
            items: None,
        }
    }

    pub fn object() -> Self {
        Self::of(SchemaType::Object)
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    /// An array whose elements must match `items`.
    pub fn array_of(items: OutputSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(SchemaType::Array)
        }
    }

    /// Builder method to add a required property.
    pub fn required(mut self, name: impl Into<String>, schema: OutputSchema) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// Builder method to add an optional (type-checked when present) property.
    pub fn optional(mut self, name: impl Into<String>, schema: OutputSchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Render the schema as a JSON document.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Validate `value` against this schema.
    ///
    /// Collects every missing field and type mismatch rather than stopping
    /// at the first problem.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let mut error = ValidationError::default();
        self.check(value, "", &mut error);
        if error.is_empty() {
            Ok(())
        } else {
            Err(error)
        }
    }

    fn check(&self, value: &Value, path: &str, error: &mut ValidationError) {
        if !self.schema_type.matches(value) {
            error.type_mismatches.push(TypeMismatch {
                path: if path.is_empty() { "$".to_string() } else { path.to_string() },
                expected: self.schema_type,
                actual: kind_of(value).to_string(),
            });
            return;
        }

        match value {
            Value::Object(map) => {
                for name in &self.required {
                    if !map.contains_key(name) {
                        error.missing_fields.push(join(path, name));
                    }
                }
                for (name, schema) in &self.properties {
                    if let Some(child) = map.get(name) {
                        schema.check(child, &join(path, name), error);
                    }
                }
            }
            Value::Array(items) => {
                if let Some(schema) = &self.items {
                    for (i, item) in items.iter().enumerate() {
                        schema.check(item, &format!("{}[{}]", path, i), error);
                    }
                }
            }
            _ => {}
        }
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

/// One field whose JSON kind did not match the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMismatch {
    pub path: String,
    pub expected: SchemaType,
    pub actual: String,
}

/// Field-level diagnostics from a failed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub missing_fields: Vec<String>,
    pub type_mismatches: Vec<TypeMismatch>,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.missing_fields.is_empty() && self.type_mismatches.is_empty()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing_fields.is_empty() {
            parts.push(format!("missing fields: {}", self.missing_fields.join(", ")));
        }
        if !self.type_mismatches.is_empty() {
            let mismatches: Vec<String> = self
                .type_mismatches
                .iter()
                .map(|m| format!("{} (expected {}, got {})", m.path, m.expected, m.actual))
                .collect();
            parts.push(format!("type mismatches: {}", mismatches.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}
