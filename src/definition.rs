//! Test definition files and their materialization into executable cases.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::DefinitionError;
use crate::globals::{value_to_text, GlobalStore};
use crate::rule::Rule;
use crate::template::TemplateResolver;
use crate::transport::HttpRequest;

pub const URL_MAX_LENGTH: usize = 2048;
pub const ORDER_RANGE: std::ops::RangeInclusive<i64> = -99_999_999..=99_999_999;
pub const STATUS_CODE_RANGE: std::ops::RangeInclusive<u64> = 100..=999;
pub const MAX_STATUS_CODES: usize = 10;
pub const INCOMPLETE_MAX_LENGTH: usize = 4096;

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

/// `meta.incomplete`: a flag or the reason the test is incomplete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Incomplete {
    Flag(bool),
    Reason(String),
}

impl Incomplete {
    /// Reason to report, `None` when the test is complete
    pub fn reason(&self) -> Option<String> {
        match self {
            Incomplete::Flag(true) => Some("Test is marked as incomplete".to_string()),
            Incomplete::Flag(false) => None,
            Incomplete::Reason(reason) => Some(reason.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub ignore: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "JSONbody", alias = "jsonBody", default = "default_true")]
    pub json_body: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete: Option<Incomplete>,
    /// Files (relative to the test directory) that must run first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            order: 0,
            ignore: false,
            description: None,
            json_body: true,
            incomplete: None,
            dependencies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// `"Name: value"` lines
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Iterator name to a value set, or to an expression yielding one
    #[serde(default)]
    pub iterators: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusCodes {
    One(u16),
    Many(Vec<u16>),
}

impl StatusCodes {
    pub fn codes(&self) -> Vec<u16> {
        match self {
            StatusCodes::One(code) => vec![*code],
            StatusCodes::Many(codes) => codes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSpec {
    pub status_code: StatusCodes,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Pointer to schema; an object, or the same object as JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Value>,
    #[serde(default)]
    pub rule_objects: Vec<Value>,
    /// Global name to a pointer into the response body
    #[serde(default)]
    pub export: BTreeMap<String, String>,
}

/// Parsed and validated test file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    #[serde(default)]
    pub meta: Meta,
    pub request: RequestSpec,
    pub response: ResponseSpec,
}

/// One concrete request with its expectations
#[derive(Debug, Clone)]
pub struct ExecutableCase {
    pub index: usize,
    /// Iterator values bound for this case
    pub bindings: Map<String, Value>,
    pub request: HttpRequest,
    pub rules: Vec<Rule>,
    pub export: BTreeMap<String, String>,
    pub json_body: bool,
}

/// Parse the contents of a test file
pub fn parse(contents: &str) -> Result<TestDefinition, DefinitionError> {
    let document: Value = serde_json::from_str(contents)
        .map_err(|e| DefinitionError::MalformedInput(format!("Not valid JSON: {}", e)))?;

    TestDefinition::from_value(document)
}

impl TestDefinition {
    pub fn from_value(document: Value) -> Result<Self, DefinitionError> {
        validate(&document)?;

        let mut definition: TestDefinition = serde_json::from_value(document)
            .map_err(|e| DefinitionError::MalformedInput(e.to_string()))?;
        definition.request.method = definition.request.method.to_ascii_uppercase();

        Ok(definition)
    }

    /// Whether this definition writes globals for later tests
    pub fn exports(&self) -> bool {
        !self.response.export.is_empty()
    }

    pub fn has_iterators(&self) -> bool {
        !self.request.iterators.is_empty()
    }

    /// Expand into executable cases, resolving globals from `store`.
    ///
    /// Each iterator combination is written into `store` before the rest of the
    /// definition is resolved, so the definition may reference iterator values.
    pub fn materialize(
        &self,
        store: &GlobalStore,
        base_url: Option<&str>,
        default_timeout: Duration,
    ) -> Result<Vec<ExecutableCase>, DefinitionError> {
        let resolver = TemplateResolver::new(store);

        let mut sets = Vec::with_capacity(self.request.iterators.len());
        for (name, values) in &self.request.iterators {
            match resolver.resolve(values)? {
                Value::Array(items) => sets.push((name.clone(), items)),
                other => {
                    return Err(DefinitionError::invalid(
                        format!("request.iterators.{}", name),
                        format!("expected an array of values, got {}", other),
                    ))
                }
            }
        }

        let timeout = self
            .response
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);

        let mut cases = Vec::new();

        for bindings in cartesian(&sets) {
            for (name, value) in &bindings {
                store.set(name, value.clone())?;
            }

            let url = join_url(base_url, &value_to_text(&resolver.resolve_str(&self.request.url)?));

            let mut headers = Vec::with_capacity(self.request.headers.len());
            for line in &self.request.headers {
                headers.push(parse_header_line(&value_to_text(&resolver.resolve_str(line)?))?);
            }

            let rules = self.rules(&resolver)?;

            let mut export = BTreeMap::new();
            for (name, pointer) in &self.response.export {
                export.insert(name.clone(), value_to_text(&resolver.resolve_str(pointer)?));
            }

            let body = match &self.request.body {
                Some(body) => resolver.resolve(body)?,
                None => Value::Null,
            };

            for body in body_variants(body) {
                cases.push(ExecutableCase {
                    index: cases.len(),
                    bindings: bindings.clone(),
                    request: HttpRequest {
                        method: self.request.method.clone(),
                        url: url.clone(),
                        headers: headers.clone(),
                        body,
                        timeout,
                    },
                    rules: rules.clone(),
                    export: export.clone(),
                    json_body: self.meta.json_body,
                });
            }
        }

        log::debug!("Materialized {} cases from {}", cases.len(), self.request.url);

        Ok(cases)
    }

    /// Status code rule first, then header rules, `rules`, and `ruleObjects`
    fn rules(&self, resolver: &TemplateResolver<'_>) -> Result<Vec<Rule>, DefinitionError> {
        let mut rules = vec![Rule::status_code(&self.response.status_code.codes())];

        for (name, value) in &self.response.headers {
            let value = value_to_text(&resolver.resolve_str(value)?);
            rules.push(Rule::header(name, &value));
        }

        if let Some(declared) = &self.response.rules {
            let declared = match resolver.resolve(declared)? {
                Value::String(text) => serde_json::from_str::<Value>(&text)
                    .map_err(|e| DefinitionError::invalid("response.rules", e.to_string()))?,
                other => other,
            };

            let declared = match declared {
                Value::Object(map) => map,
                _ => return Err(DefinitionError::invalid("response.rules", "expected an object")),
            };

            for (pointer, schema) in &declared {
                rules.push(Rule::from_schema_value(pointer.trim_end_matches('/'), schema)?);
            }
        }

        for schema in &self.response.rule_objects {
            rules.push(Rule::from_schema_value("/body", &resolver.resolve(schema)?)?);
        }

        Ok(rules)
    }
}

/// Every combination picking one value from each set, in declaration order.
///
/// No sets yield a single empty combination; an empty set yields none.
pub fn cartesian(sets: &[(String, Vec<Value>)]) -> Vec<Map<String, Value>> {
    let mut combinations = vec![Map::new()];

    for (name, values) in sets {
        let mut next = Vec::with_capacity(combinations.len() * values.len());
        for combination in &combinations {
            for value in values {
                let mut extended = combination.clone();
                extended.insert(name.clone(), value.clone());
                next.push(extended);
            }
        }
        combinations = next;
    }

    combinations
}

fn body_variants(body: Value) -> Vec<Option<String>> {
    let encode = |value: Value| match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    };

    match body {
        Value::Array(items) if !items.is_empty() => items.into_iter().map(encode).collect(),
        Value::Array(_) => vec![None],
        Value::String(text) if text.is_empty() => vec![None],
        other => vec![encode(other)],
    }
}

fn parse_header_line(line: &str) -> Result<(String, String), DefinitionError> {
    let (name, value) = line.split_once(':').ok_or_else(|| {
        DefinitionError::invalid(
            "request.headers",
            format!("expected \"Name: value\", got \"{}\"", line),
        )
    })?;

    let name = name.trim();
    if name.is_empty() {
        return Err(DefinitionError::invalid(
            "request.headers",
            format!("empty header name in \"{}\"", line),
        ));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

fn join_url(base_url: Option<&str>, url: &str) -> String {
    match base_url {
        Some(base) if !url.contains("://") => {
            format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
        }
        _ => url.to_string(),
    }
}

fn validate(document: &Value) -> Result<(), DefinitionError> {
    let root = document
        .as_object()
        .ok_or_else(|| DefinitionError::MalformedInput("Expected a JSON object".to_string()))?;

    if let Some(meta) = root.get("meta") {
        validate_meta(meta)?;
    }

    let request = required(root, "request", "request")?;
    validate_request(request)?;

    let response = required(root, "response", "response")?;
    validate_response(response)
}

fn required<'v>(
    object: &'v Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<&'v Value, DefinitionError> {
    object.get(key).ok_or_else(|| DefinitionError::MissingField {
        field: field.to_string(),
    })
}

fn expect_object<'v>(
    value: &'v Value,
    field: &str,
) -> Result<&'v Map<String, Value>, DefinitionError> {
    value
        .as_object()
        .ok_or_else(|| DefinitionError::invalid(field, "expected an object"))
}

fn expect_bool(value: &Value, field: &str) -> Result<(), DefinitionError> {
    if value.is_boolean() {
        Ok(())
    } else {
        Err(DefinitionError::invalid(field, "expected a boolean"))
    }
}

fn expect_string_map(value: &Value, field: &str) -> Result<(), DefinitionError> {
    for (key, entry) in expect_object(value, field)? {
        if !entry.is_string() {
            return Err(DefinitionError::invalid(format!("{}.{}", field, key), "expected a string"));
        }
    }
    Ok(())
}

fn validate_meta(meta: &Value) -> Result<(), DefinitionError> {
    let meta = expect_object(meta, "meta")?;

    if let Some(order) = meta.get("order") {
        match order.as_i64() {
            Some(order) if ORDER_RANGE.contains(&order) => {}
            _ => {
                return Err(DefinitionError::invalid(
                    "meta.order",
                    format!(
                        "expected an integer between {} and {}",
                        ORDER_RANGE.start(),
                        ORDER_RANGE.end()
                    ),
                ))
            }
        }
    }

    if let Some(ignore) = meta.get("ignore") {
        expect_bool(ignore, "meta.ignore")?;
    }

    if let Some(description) = meta.get("description") {
        if !description.is_string() {
            return Err(DefinitionError::invalid("meta.description", "expected a string"));
        }
    }

    for key in ["JSONbody", "jsonBody"] {
        if let Some(json_body) = meta.get(key) {
            expect_bool(json_body, &format!("meta.{}", key))?;
        }
    }

    match meta.get("incomplete") {
        None | Some(Value::Bool(_)) => {}
        Some(Value::String(reason))
            if !reason.is_empty() && reason.chars().count() <= INCOMPLETE_MAX_LENGTH => {}
        Some(_) => {
            return Err(DefinitionError::invalid(
                "meta.incomplete",
                format!(
                    "expected a boolean or a string of 1 to {} characters",
                    INCOMPLETE_MAX_LENGTH
                ),
            ))
        }
    }

    if let Some(dependencies) = meta.get("dependencies") {
        let valid = dependencies
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false);
        if !valid {
            return Err(DefinitionError::invalid(
                "meta.dependencies",
                "expected an array of strings",
            ));
        }
    }

    Ok(())
}

fn validate_request(request: &Value) -> Result<(), DefinitionError> {
    let request = expect_object(request, "request")?;

    let url = required(request, "url", "request.url")?
        .as_str()
        .ok_or_else(|| DefinitionError::invalid("request.url", "expected a string"))?;
    let length = url.chars().count();
    if length == 0 || length > URL_MAX_LENGTH {
        return Err(DefinitionError::invalid(
            "request.url",
            format!("expected 1 to {} characters, got {}", URL_MAX_LENGTH, length),
        ));
    }

    if let Some(method) = request.get("method") {
        let valid = method
            .as_str()
            .map(|m| !m.is_empty() && m.chars().all(|c| c.is_ascii_alphabetic()))
            .unwrap_or(false);
        if !valid {
            return Err(DefinitionError::invalid("request.method", "expected an HTTP method name"));
        }
    }

    if let Some(iterators) = request.get("iterators") {
        for (name, values) in expect_object(iterators, "request.iterators")? {
            if !crate::expression::is_valid_key(name) {
                return Err(DefinitionError::invalid(
                    "request.iterators",
                    format!("\"{}\" is not a valid global key", name),
                ));
            }
            if !(values.is_array() || values.is_string()) {
                return Err(DefinitionError::invalid(
                    format!("request.iterators.{}", name),
                    "expected an array or an expression",
                ));
            }
        }
    }

    if let Some(headers) = request.get("headers") {
        let valid = headers
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false);
        if !valid {
            return Err(DefinitionError::invalid("request.headers", "expected an array of strings"));
        }
    }

    if let Some(body) = request.get("body") {
        let is_part = |value: &Value| value.is_object() || value.is_string();
        let valid = match body {
            Value::Array(items) => items.iter().all(is_part),
            other => is_part(other),
        };
        if !valid {
            return Err(DefinitionError::invalid(
                "request.body",
                "expected an object, a string, or an array of them",
            ));
        }
    }

    Ok(())
}

fn validate_status_code(value: &Value) -> bool {
    value
        .as_u64()
        .map(|code| STATUS_CODE_RANGE.contains(&code))
        .unwrap_or(false)
}

fn validate_response(response: &Value) -> Result<(), DefinitionError> {
    let response = expect_object(response, "response")?;

    let status_code = required(response, "statusCode", "response.statusCode")?;
    let valid = match status_code {
        Value::Array(codes) => {
            !codes.is_empty()
                && codes.len() <= MAX_STATUS_CODES
                && codes.iter().all(validate_status_code)
        }
        single => validate_status_code(single),
    };
    if !valid {
        return Err(DefinitionError::invalid(
            "response.statusCode",
            format!(
                "expected an integer between {} and {}, or an array of 1 to {} of them",
                STATUS_CODE_RANGE.start(),
                STATUS_CODE_RANGE.end(),
                MAX_STATUS_CODES
            ),
        ));
    }

    if let Some(headers) = response.get("headers") {
        expect_string_map(headers, "response.headers")?;
    }

    if let Some(timeout) = response.get("timeout") {
        if timeout.as_u64().is_none() {
            return Err(DefinitionError::invalid(
                "response.timeout",
                "expected a non-negative integer",
            ));
        }
    }

    if let Some(rules) = response.get("rules") {
        if !(rules.is_object() || rules.is_string()) {
            return Err(DefinitionError::invalid("response.rules", "expected an object"));
        }
    }

    if let Some(rule_objects) = response.get("ruleObjects") {
        if !rule_objects.is_array() {
            return Err(DefinitionError::invalid("response.ruleObjects", "expected an array"));
        }
    }

    if let Some(export) = response.get("export") {
        expect_string_map(export, "response.export")?;
        for name in export.as_object().into_iter().flat_map(|map| map.keys()) {
            if !crate::expression::is_valid_key(name) {
                return Err(DefinitionError::invalid(
                    "response.export",
                    format!("\"{}\" is not a valid global key", name),
                ));
            }
        }
    }

    Ok(())
}
