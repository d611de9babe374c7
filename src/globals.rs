//! Run-scoped registry of named globals.
//!
//! Globals are plain values, arrays or generator functions. Test definitions reference
//! them through expressions (see [`crate::expression`]) and tests write exported
//! response values back into the same store for the tests that follow.

use chrono::Utc;
use parking_lot::RwLock;
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ExpressionError;
use crate::expression::{is_valid_key, Argument, Expression, ExpressionForm, ExpressionMode};

/// Signature of generator globals: zero or one argument in, one value out
pub type GeneratorFn = dyn Fn(Option<Value>) -> Result<Value, String> + Send + Sync;

/// A callable global
#[derive(Clone)]
pub struct Generator {
    func: Arc<GeneratorFn>,
}

impl Generator {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Option<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self { func: Arc::new(func) }
    }

    pub fn call(&self, argument: Option<Value>) -> Result<Value, String> {
        (self.func)(argument)
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Generator(callable)")
    }
}

/// Value stored under a global key
#[derive(Debug, Clone)]
pub enum GlobalValue {
    Literal(Value),
    Array(Vec<Value>),
    Generator(Generator),
}

impl GlobalValue {
    /// Convert to a JSON value; generators cannot be substituted without a call
    pub fn to_value(&self, key: &str) -> Result<Value, ExpressionError> {
        match self {
            GlobalValue::Literal(value) => Ok(value.clone()),
            GlobalValue::Array(items) => Ok(Value::Array(items.clone())),
            GlobalValue::Generator(_) => Err(ExpressionError::NotAValue(key.to_string())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            GlobalValue::Generator(_) => "callable",
            GlobalValue::Array(_) => "array",
            GlobalValue::Literal(Value::Null) => "null",
            GlobalValue::Literal(Value::Bool(_)) => "boolean",
            GlobalValue::Literal(Value::Number(n)) if n.is_f64() => "double",
            GlobalValue::Literal(Value::Number(_)) => "integer",
            GlobalValue::Literal(Value::String(_)) => "string",
            GlobalValue::Literal(Value::Array(_)) => "array",
            GlobalValue::Literal(Value::Object(_)) => "object",
        }
    }

    fn describe(&self) -> String {
        match self {
            GlobalValue::Generator(_) => "callable".to_string(),
            GlobalValue::Array(items) => items
                .iter()
                .map(value_to_text)
                .collect::<Vec<_>>()
                .join(", "),
            GlobalValue::Literal(value) => value_to_text(value),
        }
    }
}

impl From<Value> for GlobalValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => GlobalValue::Array(items),
            other => GlobalValue::Literal(other),
        }
    }
}

impl From<Generator> for GlobalValue {
    fn from(generator: Generator) -> Self {
        GlobalValue::Generator(generator)
    }
}

/// Render a value the way it is substituted inside a string
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Shared, synchronized registry of globals
#[derive(Clone)]
pub struct GlobalStore {
    globals: Arc<RwLock<BTreeMap<String, GlobalValue>>>,
}

impl Default for GlobalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GlobalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalStore")
            .field("keys", &self.keys())
            .finish()
    }
}

impl GlobalStore {
    /// Create a store seeded with the built-in generators
    pub fn new() -> Self {
        let store = Self::empty();
        register_builtins(&mut store.globals.write());
        store
    }

    /// Create a store without any built-ins
    pub fn empty() -> Self {
        Self {
            globals: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.globals.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.globals.read().keys().cloned().collect()
    }

    /// Set a global, overwriting any previous value under the same key
    pub fn set(&self, key: &str, value: impl Into<GlobalValue>) -> Result<(), ExpressionError> {
        if !is_valid_key(key) {
            return Err(ExpressionError::InvalidKey(key.to_string()));
        }

        self.globals.write().insert(key.to_string(), value.into());
        Ok(())
    }

    /// Set several globals at once; nothing is written if any key is invalid
    pub fn set_all<K, V>(&self, entries: Vec<(K, V)>) -> Result<(), ExpressionError>
    where
        K: AsRef<str>,
        V: Into<GlobalValue>,
    {
        if let Some((key, _)) = entries.iter().find(|(key, _)| !is_valid_key(key.as_ref())) {
            return Err(ExpressionError::InvalidKey(key.as_ref().to_string()));
        }

        let mut globals = self.globals.write();
        for (key, value) in entries {
            globals.insert(key.as_ref().to_string(), value.into());
        }
        Ok(())
    }

    /// Register a generator function
    pub fn set_function<F>(&self, key: &str, func: F) -> Result<(), ExpressionError>
    where
        F: Fn(Option<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.set(key, Generator::new(func))
    }

    /// Resolve a plain reference such as `name`, `items[2]` or `rand-integer(10)`.
    ///
    /// A function accessed without parentheses yields the generator itself.
    pub fn get(&self, reference: &str) -> Result<GlobalValue, ExpressionError> {
        let expression = Expression::parse(reference, ExpressionForm::Plain)
            .ok_or_else(|| ExpressionError::InvalidExpression(reference.to_string()))?;

        self.evaluate(&expression)
    }

    /// Resolve a plain reference to a JSON value
    pub fn get_value(&self, reference: &str) -> Result<Value, ExpressionError> {
        let expression = Expression::parse(reference, ExpressionForm::Plain)
            .ok_or_else(|| ExpressionError::InvalidExpression(reference.to_string()))?;

        self.evaluate(&expression)?.to_value(&expression.key)
    }

    /// Resolve an already parsed expression
    pub fn evaluate(&self, expression: &Expression) -> Result<GlobalValue, ExpressionError> {
        // Clone out of the lock so generators and nested lookups run unlocked
        let global = self
            .globals
            .read()
            .get(&expression.key)
            .cloned()
            .ok_or_else(|| ExpressionError::UnknownGlobal {
                key: expression.key.clone(),
            })?;

        match expression.mode {
            ExpressionMode::Variable => Ok(global),
            ExpressionMode::Function => {
                let generator = match global {
                    GlobalValue::Generator(generator) => generator,
                    _ => return Err(ExpressionError::NotCallable(expression.key.clone())),
                };

                let argument = match expression.argument() {
                    None => None,
                    Some(Argument::Number(n)) => Some(Value::Number(n)),
                    Some(Argument::Bool(b)) => Some(Value::Bool(b)),
                    Some(Argument::Literal(s)) => Some(Value::String(s)),
                    Some(Argument::Reference(key)) => Some(self.get_value(&key)?),
                };

                generator
                    .call(argument)
                    .map(GlobalValue::from)
                    .map_err(|message| ExpressionError::GeneratorFailed {
                        key: expression.key.clone(),
                        message,
                    })
            }
            ExpressionMode::Array => {
                let index = expression.index.unwrap_or_default();
                let items = match &global {
                    GlobalValue::Array(items) => items.as_slice(),
                    GlobalValue::Literal(Value::Array(items)) => items.as_slice(),
                    _ => return Err(ExpressionError::NotIndexable(expression.key.clone())),
                };

                items
                    .get(index)
                    .cloned()
                    .map(GlobalValue::from)
                    .ok_or_else(|| ExpressionError::IndexOutOfRange {
                        key: expression.key.clone(),
                        index,
                        length: items.len(),
                    })
            }
        }
    }

    /// One line per global: `"key": (type) value`
    pub fn describe(&self) -> Vec<String> {
        self.globals
            .read()
            .iter()
            .map(|(key, value)| {
                format!("\"{}\": ({}) {}", key, value.type_name(), value.describe())
            })
            .collect()
    }
}

fn register_builtins(globals: &mut BTreeMap<String, GlobalValue>) {
    let builtins: Vec<(&str, Generator)> = vec![
        ("rand-integer", Generator::new(rand_integer)),
        ("rand-string", Generator::new(rand_string)),
        ("rand-hash", Generator::new(|_| Ok(Value::String(rand_hash())))),
        ("rand-boolean", Generator::new(|_| Ok(Value::Bool(rand::thread_rng().gen())))),
        ("timestamp", Generator::new(|_| Ok(Value::from(Utc::now().timestamp())))),
        ("microtime", Generator::new(microtime)),
    ];

    for (key, generator) in builtins {
        globals.insert(key.to_string(), GlobalValue::Generator(generator));
    }
}

/// Longest word `rand-string(n)` will produce
pub const RAND_STRING_MAX_LENGTH: i64 = 65_536;

/// Largest value produced by `rand-integer()` without an argument
pub const RAND_MAX: i64 = 2_147_483_647;

fn integer_argument(argument: &Value) -> Result<i64, String> {
    match argument {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| format!("expected an integer, got {}", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected an integer, got \"{}\"", s)),
        other => Err(format!("expected an integer, got {}", other)),
    }
}

fn rand_integer(argument: Option<Value>) -> Result<Value, String> {
    let max = match argument {
        Some(value) => integer_argument(&value)?,
        None => RAND_MAX,
    };

    if max < 0 {
        return Err(format!("maximum must not be negative, got {}", max));
    }

    Ok(Value::from(rand::thread_rng().gen_range(0..=max)))
}

fn rand_string(argument: Option<Value>) -> Result<Value, String> {
    let length = match argument {
        Some(value) => integer_argument(&value)?,
        None => 8,
    };

    if length < 0 {
        return Err(format!("length must not be negative, got {}", length));
    }
    if length > RAND_STRING_MAX_LENGTH {
        return Err(format!(
            "length must not exceed {}, got {}",
            RAND_STRING_MAX_LENGTH, length
        ));
    }

    Ok(Value::String(readable_random_string(length as usize)))
}

/// Random pronounceable word of alternating consonants and vowels
pub fn readable_random_string(length: usize) -> String {
    const CONSONANTS: &[u8] = b"bcdfghjklmnprstvwxyz";
    const VOWELS: &[u8] = b"aeiou";

    let mut rng = rand::thread_rng();
    let mut word = String::with_capacity(length);

    for _ in 0..length / 2 {
        word.push(CONSONANTS[rng.gen_range(0..CONSONANTS.len())] as char);
        word.push(VOWELS[rng.gen_range(0..VOWELS.len())] as char);
    }

    if word.len() < length {
        word.push(VOWELS[rng.gen_range(0..VOWELS.len())] as char);
    }

    word
}

/// 40 hexadecimal characters of randomness
pub fn rand_hash() -> String {
    let bytes: [u8; 20] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn microtime(argument: Option<Value>) -> Result<Value, String> {
    let now = Utc::now();
    let seconds = now.timestamp();
    let micros = now.timestamp_subsec_micros();

    if argument.as_ref().map(is_truthy).unwrap_or(false) {
        let value = seconds as f64 + f64::from(micros) / 1_000_000.0;
        return serde_json::Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| "clock produced a non finite value".to_string());
    }

    Ok(Value::String(format!("0.{:06}00 {}", micros, seconds)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_are_seeded() {
        let store = GlobalStore::new();
        let builtins = [
            "rand-integer",
            "rand-string",
            "rand-hash",
            "rand-boolean",
            "timestamp",
            "microtime",
        ];
        for key in builtins {
            assert!(store.exists(key), "missing builtin {}", key);
        }
        assert!(GlobalStore::empty().keys().is_empty());
    }

    #[test]
    fn test_rand_hash_shape() {
        let hash = rand_hash();
        assert_eq!(hash.len(), 40);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_readable_random_string_lengths() {
        assert_eq!(readable_random_string(5).len(), 5);
        assert_eq!(readable_random_string(6).len(), 6);
        assert_eq!(readable_random_string(0), "");
    }

    #[test]
    fn test_microtime_forms() {
        let store = GlobalStore::new();
        assert!(store.get_value("microtime(true)").unwrap().is_f64());

        let text = store.get_value("microtime()").unwrap();
        let text = text.as_str().unwrap();
        assert!(text.starts_with("0."));
        assert_eq!(text.split(' ').count(), 2);
    }

    #[test]
    fn test_describe_renders_types() {
        let store = GlobalStore::empty();
        store.set("count", json!(3)).unwrap();
        store.set("items", json!([1, 2])).unwrap();
        store.set_function("noop", |_| Ok(Value::Null)).unwrap();

        let lines = store.describe();
        assert!(lines.contains(&"\"count\": (integer) 3".to_string()));
        assert!(lines.contains(&"\"items\": (array) 1, 2".to_string()));
        assert!(lines.contains(&"\"noop\": (callable) callable".to_string()));
    }
}
