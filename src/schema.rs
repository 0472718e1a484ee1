//! Thin wrapper over compiled JSON Schema validators.
//!
//! A [`Schema`] keeps both the raw `serde_json::Value` (for OpenAPI emission)
//! and the compiled validator (for request/response validation). Compilation
//! happens once at declaration time; request-time validation only walks the
//! precompiled schema.

use std::fmt;
use std::sync::Arc;

use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::Value;

/// A single validation failure, addressed by JSON Pointer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationIssue {
    /// JSON Pointer to the offending location ("" for the document root).
    pub pointer: String,
    pub message: String,
}

/// Schema compilation failure.
#[derive(Debug, thiserror::Error)]
#[error("invalid JSON schema: {message}")]
pub struct SchemaError {
    message: String,
}

/// A JSON Schema compiled for repeated validation.
#[derive(Clone)]
pub struct Schema {
    raw: Arc<Value>,
    compiled: Arc<JSONSchema>,
}

impl Schema {
    /// Compile a schema from its JSON representation.
    pub fn new(value: Value) -> Result<Self, SchemaError> {
        let compiled = JSONSchema::compile(&value).map_err(|e| SchemaError {
            message: e.to_string(),
        })?;
        Ok(Self {
            raw: Arc::new(value),
            compiled: Arc::new(compiled),
        })
    }

    /// Build the `{"type": "array", "items": ...}` wrapper around an item
    /// schema. Used for `list` responses.
    pub fn array_of(item: &Schema) -> Result<Self, SchemaError> {
        Self::new(serde_json::json!({
            "type": "array",
            "items": item.as_value().clone(),
        }))
    }

    /// The raw schema document, as supplied at construction.
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// Validate `instance`, collecting every issue rather than stopping at
    /// the first.
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<ValidationIssue>> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|e| ValidationIssue {
                    pointer: e.instance_path.to_string(),
                    message: e.to_string(),
                })
                .collect()),
        }
    }

    /// Validation issues rendered as a JSON `details` payload.
    pub(crate) fn issues_to_details(issues: &[ValidationIssue]) -> Value {
        serde_json::json!(issues)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("raw", &self.raw).finish()
    }
}
