//! Search and replace of global expressions inside JSON documents.

use serde_json::{Map, Value};

use crate::error::ExpressionError;
use crate::expression::{Expression, ExpressionForm};
use crate::globals::{value_to_text, GlobalStore};

/// Resolves `{{{...}}}` and `{{...}}` expressions against a [`GlobalStore`]
#[derive(Debug, Clone, Copy)]
pub struct TemplateResolver<'a> {
    store: &'a GlobalStore,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(store: &'a GlobalStore) -> Self {
        Self { store }
    }

    /// Return a copy of `document` with every string leaf resolved.
    ///
    /// Object keys are left untouched. The first unknown global aborts the resolve.
    pub fn resolve(&self, document: &Value) -> Result<Value, ExpressionError> {
        match document {
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key.clone(), self.resolve(value)?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::String(text) => self.resolve_str(text),
            scalar => Ok(scalar.clone()),
        }
    }

    /// Resolve a single string leaf.
    ///
    /// A whole-value `{{{expr}}}` yields the global with its own type; otherwise every
    /// inline `{{expr}}` is replaced by the textual form of its value.
    pub fn resolve_str(&self, text: &str) -> Result<Value, ExpressionError> {
        if let Some(expression) = Expression::parse(text, ExpressionForm::Replace) {
            return self.store.evaluate(&expression)?.to_value(&expression.key);
        }

        let matches = Expression::scan(text);
        if matches.is_empty() {
            return Ok(Value::String(text.to_string()));
        }

        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;

        for inline in matches {
            let value = self
                .store
                .evaluate(&inline.expression)?
                .to_value(&inline.expression.key)?;

            output.push_str(&text[cursor..inline.range.start]);
            output.push_str(&value_to_text(&value));
            cursor = inline.range.end;
        }
        output.push_str(&text[cursor..]);

        log::trace!("Resolved \"{}\" to \"{}\"", text, output);

        Ok(Value::String(output))
    }
}

/// Convenience wrapper around [`TemplateResolver::resolve`]
pub fn resolve(document: &Value, store: &GlobalStore) -> Result<Value, ExpressionError> {
    TemplateResolver::new(store).resolve(document)
}
