//! Rule evaluation against an executed exchange.
//!
//! The exchange is projected onto a document with four facets,
//! `{header, statusCode, body, timeout}`, and every rule pointer is looked up in the
//! facet named by its root.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{EngineError, RuleError};
use crate::reporting::{RuleReport, TestStatus};
use crate::rule::{Rule, ROOT_HEADER};
use crate::transport::{HttpRequest, HttpResponse};

/// Request sent and response received for one case
#[derive(Debug, Clone)]
pub struct ExecutedExchange {
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Result of evaluating every rule of one case
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub status: TestStatus,
    /// Body as placed in the document: decoded JSON, or raw text
    pub body: Value,
    pub reports: Vec<RuleReport>,
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Success
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RuleEngine {
    json_body: bool,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RuleEngine {
    /// `json_body` requires the response body to be JSON
    pub fn new(json_body: bool) -> Self {
        Self { json_body }
    }

    /// Decode the body; an empty 204 response decodes to null
    pub fn decode_body(&self, response: &HttpResponse) -> Result<Value, EngineError> {
        if !self.json_body {
            return Ok(Value::String(response.body.clone()));
        }

        if response.status_code == 204 && response.body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response.body).map_err(|e| EngineError::BodyDecode(e.to_string()))
    }

    /// Build the addressable document for `exchange`
    pub fn document(&self, exchange: &ExecutedExchange, body: Value) -> Value {
        json!({
            "header": exchange.response.headers,
            "statusCode": exchange.response.status_code,
            "body": body,
            "timeout": exchange.elapsed.as_secs_f64(),
        })
    }

    /// Evaluate `rules` in order. Only an undecodable body aborts the evaluation.
    pub fn evaluate(
        &self,
        exchange: &ExecutedExchange,
        rules: &[Rule],
    ) -> Result<Evaluation, EngineError> {
        let body = self.decode_body(&exchange.response)?;
        let document = self.document(exchange, body);

        let reports: Vec<RuleReport> =
            rules.iter().map(|rule| self.check(&document, rule)).collect();

        let status = if reports.iter().all(|report| report.status) {
            TestStatus::Success
        } else {
            TestStatus::Failure
        };

        let body = match document {
            Value::Object(mut facets) => facets.remove("body").unwrap_or(Value::Null),
            _ => Value::Null,
        };

        Ok(Evaluation { status, body, reports })
    }

    fn check(&self, document: &Value, rule: &Rule) -> RuleReport {
        let target = match lookup(document, rule) {
            Some(target) => target,
            None => {
                log::debug!("Pointer {} not found", rule.pointer());
                let error = RuleError::PointerNotFound {
                    pointer: rule.pointer().to_string(),
                };
                return RuleReport::failed(rule.clone(), error.to_string());
            }
        };

        let outcome = rule.schema().validate(target);
        if !outcome.status {
            log::debug!("Rule {} failed: {:?}", rule.pointer(), outcome.error);
        }

        RuleReport {
            rule: rule.clone(),
            status: outcome.status,
            error: outcome.error,
        }
    }
}

fn lookup<'d>(document: &'d Value, rule: &Rule) -> Option<&'d Value> {
    let facet = document.get(&rule.root()[1..])?;

    // header names are stored lowercased
    if rule.root() == ROOT_HEADER {
        facet.pointer(&rule.relative_pointer().to_ascii_lowercase())
    } else {
        facet.pointer(rule.relative_pointer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::JsonSchema;
    use std::sync::Arc;

    fn exchange(status_code: u16, body: &str) -> ExecutedExchange {
        let now = Utc::now();
        ExecutedExchange {
            request: HttpRequest {
                method: "GET".to_string(),
                url: "http://localhost/".to_string(),
                headers: Vec::new(),
                body: None,
                timeout: Duration::from_secs(30),
            },
            response: HttpResponse::new(status_code, body)
                .with_header("Content-Type", "application/json"),
            started_at: now,
            finished_at: now,
            elapsed: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_document_facets() {
        let engine = RuleEngine::default();
        let exchange = exchange(200, "{\"id\": 1}");
        let body = engine.decode_body(&exchange.response).unwrap();
        let document = engine.document(&exchange, body);

        assert_eq!(document["statusCode"], 200);
        assert_eq!(document["body"]["id"], 1);
        assert_eq!(document["header"]["content-type"], "application/json");
        assert_eq!(document["timeout"], 0.25);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let engine = RuleEngine::default();
        let schema: Arc<dyn crate::schema::Validator> =
            Arc::new(JsonSchema::new(serde_json::json!({"type": "string"})).unwrap());
        let rule = Rule::new("/header/Content-Type", schema, None).unwrap();

        let evaluation = engine.evaluate(&exchange(200, "{}"), &[rule]).unwrap();
        assert!(evaluation.passed());
    }

    #[test]
    fn test_raw_body_when_json_disabled() {
        let engine = RuleEngine::new(false);
        let evaluation = engine
            .evaluate(&exchange(200, "<html></html>"), &[Rule::status_code(&[200])])
            .unwrap();
        assert_eq!(evaluation.body, Value::String("<html></html>".to_string()));
        assert!(evaluation.passed());
    }

    #[test]
    fn test_empty_body_requires_204() {
        let engine = RuleEngine::default();
        assert_eq!(engine.decode_body(&HttpResponse::new(204, "")).unwrap(), Value::Null);
        assert!(matches!(
            engine.decode_body(&HttpResponse::new(200, "")),
            Err(EngineError::BodyDecode(_))
        ));
    }
}
