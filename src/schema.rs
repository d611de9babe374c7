//! Validation capability consumed by rules.
//!
//! The rule engine only knows the [`Validator`] trait. [`JsonSchema`] is the bundled
//! implementation, compiled with the `jsonschema` crate (draft detected from `$schema`,
//! 2020-12 otherwise, formats asserted).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Outcome of validating one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn success() -> Self {
        Self { status: true, error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: false,
            error: Some(error.into()),
        }
    }
}

/// Anything able to check a JSON value
pub trait Validator: Send + Sync + fmt::Debug {
    fn validate(&self, value: &Value) -> ValidationOutcome;

    /// Serializable description used in reports
    fn describe(&self) -> Value;
}

/// JSON Schema document compiled once at construction
#[derive(Clone)]
pub struct JsonSchema {
    schema: Value,
    compiled: Result<Arc<jsonschema::Validator>, String>,
}

impl JsonSchema {
    /// Compile a schema document, which must be an object or a boolean
    pub fn new(schema: Value) -> Result<Self, String> {
        match &schema {
            Value::Object(_) | Value::Bool(_) => {}
            other => {
                return Err(format!("schema must be an object or a boolean, got {}", other))
            }
        }

        let compiled = compile(&schema)?;
        Ok(Self {
            schema,
            compiled: Ok(compiled),
        })
    }

    /// Parse a schema given as JSON text
    pub fn from_json_str(text: &str) -> Result<Self, String> {
        let schema: Value =
            serde_json::from_str(text).map_err(|e| format!("schema is not valid JSON: {}", e))?;
        Self::new(schema)
    }

    /// Wrap an object schema built in code; a compile failure surfaces on every `validate`
    pub fn from_map(schema: Map<String, Value>) -> Self {
        let schema = Value::Object(schema);
        let compiled = compile(&schema);
        Self { schema, compiled }
    }

    /// Schema accepting exactly one of `values`
    pub fn enumeration(values: Vec<Value>) -> Self {
        let mut schema = Map::new();
        schema.insert("enum".to_string(), Value::Array(values));
        Self::from_map(schema)
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }
}

fn compile(schema: &Value) -> Result<Arc<jsonschema::Validator>, String> {
    jsonschema::options()
        .should_validate_formats(true)
        .build(schema)
        .map(Arc::new)
        .map_err(|e| format!("invalid schema: {}", e))
}

impl Validator for JsonSchema {
    fn validate(&self, value: &Value) -> ValidationOutcome {
        let compiled = match &self.compiled {
            Ok(compiled) => compiled,
            Err(message) => return ValidationOutcome::failure(message.clone()),
        };

        match compiled.validate(value) {
            Ok(()) => ValidationOutcome::success(),
            Err(error) => {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    ValidationOutcome::failure(error.to_string())
                } else {
                    ValidationOutcome::failure(format!("{}: {}", path, error))
                }
            }
        }
    }

    fn describe(&self) -> Value {
        self.schema.clone()
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema").field("schema", &self.schema).finish()
    }
}

impl PartialEq for JsonSchema {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
    }
}
