//! Typed parameter schemas for tool contracts.
//!
//! A schema is a closed variant over {string, number, integer, boolean,
//! enum, array, object}, walked recursively both to validate incoming
//! arguments and to derive the JSON-Schema-shaped interface object sent to
//! the model. No runtime reflection: the schema *is* the data.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Parameter schema for a tool contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Schema {
    String,
    Number,
    Integer,
    Boolean,
    /// Closed string enumeration.
    Enum { values: Vec<String> },
    Array { items: Box<Schema> },
    Object { fields: Vec<Field> },
}

/// One named field of an object schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
            description: None,
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

impl Schema {
    /// Top-level object schema from a field list. Tool parameter schemas
    /// are always objects.
    pub fn object(fields: Vec<Field>) -> Self {
        Self::Object { fields }
    }

    /// Object schema with no parameters.
    pub fn empty_object() -> Self {
        Self::Object { fields: Vec::new() }
    }

    pub fn string_enum(values: &[&str]) -> Self {
        Self::Enum {
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn array_of(items: Schema) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Enum { .. } => "enum",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
        }
    }

    /// Derive the model-facing interface object: a JSON-Schema-shaped
    /// `Value`. Deterministic — fields appear in declaration order.
    pub fn to_interface(&self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Number => json!({"type": "number"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Enum { values } => json!({"type": "string", "enum": values}),
            Self::Array { items } => json!({"type": "array", "items": items.to_interface()}),
            Self::Object { fields } => {
                let mut properties = serde_json::Map::new();
                let mut required: Vec<Value> = Vec::new();
                for field in fields {
                    let mut prop = field.schema.to_interface();
                    if let Some(desc) = &field.description {
                        prop["description"] = json!(desc);
                    }
                    properties.insert(field.name.clone(), prop);
                    if field.required {
                        required.push(json!(field.name));
                    }
                }
                json!({
                    "type": "object",
                    "properties": Value::Object(properties),
                    "required": required,
                })
            }
        }
    }

    /// Validate a parsed argument value against this schema.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        self.check(value, "", &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    fn check(&self, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
        match (self, value) {
            (Self::String, Value::String(_)) => {}
            (Self::Number, Value::Number(_)) => {}
            // Integers must not carry a fractional part.
            (Self::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {}
            (Self::Boolean, Value::Bool(_)) => {}
            (Self::Enum { values }, Value::String(s)) => {
                if !values.iter().any(|v| v == s) {
                    issues.push(ValidationIssue {
                        field: path.to_string(),
                        message: format!("expected one of {:?}, got {:?}", values, s),
                    });
                }
            }
            (Self::Array { items }, Value::Array(elems)) => {
                for (i, elem) in elems.iter().enumerate() {
                    let elem_path = format!("{}[{}]", path, i);
                    items.check(elem, &elem_path, issues);
                }
            }
            (Self::Object { fields }, Value::Object(map)) => {
                for field in fields {
                    let field_path = if path.is_empty() {
                        field.name.clone()
                    } else {
                        format!("{}.{}", path, field.name)
                    };
                    match map.get(&field.name) {
                        Some(v) => field.schema.check(v, &field_path, issues),
                        None if field.required => issues.push(ValidationIssue {
                            field: field_path,
                            message: "missing required field".into(),
                        }),
                        None => {}
                    }
                }
                for key in map.keys() {
                    if !fields.iter().any(|f| &f.name == key) {
                        let field_path = if path.is_empty() {
                            key.clone()
                        } else {
                            format!("{}.{}", path, key)
                        };
                        issues.push(ValidationIssue {
                            field: field_path,
                            message: "unknown field".into(),
                        });
                    }
                }
            }
            (expected, actual) => {
                issues.push(ValidationIssue {
                    field: path.to_string(),
                    message: format!(
                        "expected {}, got {}",
                        expected.type_name(),
                        json_type_name(actual)
                    ),
                });
            }
        }
    }
}

/// One field-qualified validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path to the offending field (`a.b[2]`); empty for the root.
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
