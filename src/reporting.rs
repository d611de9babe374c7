use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::engine::ExecutedExchange;
use crate::rule::Rule;
use crate::transport::HttpRequest;

pub mod json;

pub use json::JsonReportWriter;

/// Outcome of one executed (or skipped) test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Failure,
    Error,
    Incomplete,
    Ignore,
}

impl TestStatus {
    /// Character printed in progress output
    pub fn progress_char(&self) -> char {
        match self {
            TestStatus::Success => '.',
            TestStatus::Failure => 'F',
            TestStatus::Error => 'E',
            TestStatus::Ignore => 'I',
            TestStatus::Incomplete => 'S',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Success => "success",
            TestStatus::Failure => "failure",
            TestStatus::Error => "error",
            TestStatus::Incomplete => "incomplete",
            TestStatus::Ignore => "ignore",
        }
    }
}

/// Outcome of a single rule
#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    pub rule: Rule,
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuleReport {
    pub fn passed(rule: Rule) -> Self {
        Self {
            rule,
            status: true,
            error: None,
        }
    }

    pub fn failed(rule: Rule, error: impl Into<String>) -> Self {
        Self {
            rule,
            status: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestReport {
    pub method: String,
    pub url: String,
    pub headers: Vec<String>,
    pub body: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReport {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// Decoded JSON when available, raw text otherwise
    pub body: Value,
    pub timestamp: DateTime<Utc>,
    /// Elapsed seconds
    pub timeout: f64,
}

/// Overall result of one test case
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub file: String,
    /// Case index within its file
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TestStatus,
    /// Set when the case could not be materialized because a global was missing
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unresolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseReport>,
    pub rule_report: Vec<RuleReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestReport {
    pub fn new(file: impl Into<String>, index: usize, status: TestStatus) -> Self {
        Self {
            file: file.into(),
            index,
            description: None,
            status,
            unresolved: false,
            request: None,
            response: None,
            rule_report: Vec::new(),
            error: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn unresolved(mut self) -> Self {
        self.unresolved = true;
        self
    }

    pub fn with_request(mut self, request: &HttpRequest, timestamp: DateTime<Utc>) -> Self {
        let body = request.body.as_ref().map(|raw| {
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        });

        self.request = Some(RequestReport {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request
                .headers
                .iter()
                .map(|(name, value)| format!("{}: {}", name, value))
                .collect(),
            body,
            timestamp,
        });
        self
    }

    /// Attach the exchange; `body` is the decoded body when decoding succeeded
    pub fn with_exchange(self, exchange: &ExecutedExchange, body: Option<Value>) -> Self {
        let mut report = self.with_request(&exchange.request, exchange.started_at);

        report.response = Some(ResponseReport {
            status_code: exchange.response.status_code,
            headers: exchange.response.headers.clone(),
            body: body.unwrap_or_else(|| Value::String(exchange.response.body.clone())),
            timestamp: exchange.finished_at,
            timeout: exchange.elapsed.as_secs_f64(),
        });

        report
    }

    /// Human readable failure lines for the summary
    pub fn messages(&self) -> Vec<String> {
        let mut messages = Vec::new();

        if let Some(error) = &self.error {
            messages.push(error.clone());
        }

        for report in self.rule_report.iter().filter(|r| !r.status) {
            let reason = report.error.as_deref().unwrap_or("validation failed");
            let pointer = report.rule.pointer();
            match report.rule.message() {
                Some(message) => messages.push(format!("{}: {} ({})", pointer, message, reason)),
                None => messages.push(format!("{}: {}", pointer, reason)),
            }
        }

        messages
    }
}

/// Aggregate counts of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteStats {
    pub tests: usize,
    pub success: usize,
    pub failure: usize,
    pub error: usize,
    pub ignore: usize,
    pub incomplete: usize,
    /// Incomplete cases caused by missing globals
    pub unresolved: usize,
}

impl SuiteStats {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a TestReport>) -> Self {
        let mut stats = Self::default();
        for report in reports {
            stats.record(report);
        }
        stats
    }

    pub fn record(&mut self, report: &TestReport) {
        self.tests += 1;
        match report.status {
            TestStatus::Success => self.success += 1,
            TestStatus::Failure => self.failure += 1,
            TestStatus::Error => self.error += 1,
            TestStatus::Ignore => self.ignore += 1,
            TestStatus::Incomplete => self.incomplete += 1,
        }
        if report.unresolved {
            self.unresolved += 1;
        }
    }

    /// 1 on any error, 2 on any failure, 0 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.error > 0 {
            1
        } else if self.failure > 0 {
            2
        } else {
            0
        }
    }
}
