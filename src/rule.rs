//! Pointer + schema assertions on an executed exchange.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::RuleError;
use crate::schema::{JsonSchema, Validator};

pub const ROOT_HEADER: &str = "/header";
pub const ROOT_BODY: &str = "/body";
pub const ROOT_STATUS_CODE: &str = "/statusCode";
pub const ROOT_TIMEOUT: &str = "/timeout";

/// Namespaces every rule pointer must start with
pub const ROOTS: [&str; 4] = [ROOT_HEADER, ROOT_BODY, ROOT_STATUS_CODE, ROOT_TIMEOUT];

/// A `(pointer, schema, message?)` assertion
#[derive(Clone)]
pub struct Rule {
    pointer: String,
    root: &'static str,
    schema: Arc<dyn Validator>,
    message: Option<String>,
}

impl Rule {
    pub fn new(
        pointer: impl Into<String>,
        schema: Arc<dyn Validator>,
        message: Option<String>,
    ) -> Result<Self, RuleError> {
        let pointer = pointer.into();
        let root = root_of(&pointer).ok_or_else(|| RuleError::InvalidPointer {
            pointer: pointer.clone(),
            roots: ROOTS.join(", "),
        })?;

        Ok(Self {
            pointer,
            root,
            schema,
            message,
        })
    }

    /// Build from a schema written in a test file, either inline JSON or JSON text
    pub fn from_schema_value(
        pointer: impl Into<String>,
        schema: &Value,
    ) -> Result<Self, RuleError> {
        let pointer = pointer.into();
        let parsed = match schema {
            Value::String(text) => JsonSchema::from_json_str(text),
            other => JsonSchema::new(other.clone()),
        }
        .map_err(|message| RuleError::InvalidSchema {
            pointer: pointer.clone(),
            message,
        })?;

        Self::new(pointer, Arc::new(parsed), None)
    }

    /// Status code must be one of `codes`
    pub fn status_code(codes: &[u16]) -> Self {
        let values = codes.iter().map(|code| Value::from(*code)).collect();
        Self {
            pointer: ROOT_STATUS_CODE.to_string(),
            root: ROOT_STATUS_CODE,
            schema: Arc::new(JsonSchema::enumeration(values)),
            message: None,
        }
    }

    /// Response header `name` must equal `value`
    pub fn header(name: &str, value: &str) -> Self {
        let mut schema = serde_json::Map::new();
        schema.insert("type".to_string(), Value::from("string"));
        schema.insert("enum".to_string(), Value::Array(vec![Value::from(value)]));

        Self {
            pointer: format!("{}/{}", ROOT_HEADER, escape_token(&name.to_ascii_lowercase())),
            root: ROOT_HEADER,
            schema: Arc::new(JsonSchema::from_map(schema)),
            message: None,
        }
    }

    /// Rule on the body; `/body` is prepended unless already present
    pub fn body(pointer: &str, schema: Arc<dyn Validator>) -> Result<Self, RuleError> {
        let full = if pointer == ROOT_BODY || pointer.starts_with("/body/") {
            pointer.to_string()
        } else {
            let relative = pointer.strip_prefix('/').unwrap_or(pointer);
            format!("{}/{}", ROOT_BODY, relative)
        };
        let full = full.trim_end_matches('/').to_string();
        let full = if full.is_empty() { ROOT_BODY.to_string() } else { full };

        Self::new(full, schema, None)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    /// Root namespace the pointer belongs to
    pub fn root(&self) -> &'static str {
        self.root
    }

    /// Pointer with its root stripped, `""` addressing the whole facet
    pub fn relative_pointer(&self) -> &str {
        self.pointer[self.root.len()..].trim_end_matches('/')
    }

    pub fn schema(&self) -> &Arc<dyn Validator> {
        &self.schema
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("pointer", &self.pointer)
            .field("schema", &self.schema.describe())
            .field("message", &self.message)
            .finish()
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.message.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("Rule", fields)?;
        state.serialize_field("pointer", &self.pointer)?;
        state.serialize_field("schema", &self.schema.describe())?;
        if let Some(message) = &self.message {
            state.serialize_field("message", message)?;
        }
        state.end()
    }
}

fn root_of(pointer: &str) -> Option<&'static str> {
    ROOTS.iter().copied().find(|root| {
        pointer
            .strip_prefix(root)
            .map(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(false)
    })
}

/// Escape a key for use as a JSON pointer token
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
