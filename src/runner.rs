use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::definition::{ExecutableCase, TestDefinition};
use crate::engine::{ExecutedExchange, RuleEngine};
use crate::globals::GlobalStore;
use crate::error::TransportError;
use crate::reporting::{TestReport, TestStatus};
use crate::transport::{HttpResponse, HttpTransport};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes materialized cases and writes their exports back into the store
#[derive(Clone)]
pub struct Runner {
    store: GlobalStore,
    transport: Arc<dyn HttpTransport>,
    base_url: Option<String>,
    default_timeout: Duration,
}

impl Runner {
    pub fn new(store: GlobalStore, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            store,
            transport,
            base_url: None,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn store(&self) -> &GlobalStore {
        &self.store
    }

    /// Run every case of a definition, one after the other
    pub async fn run_definition(
        &self,
        file: &str,
        definition: &TestDefinition,
    ) -> Vec<TestReport> {
        let description = definition.meta.description.clone();

        if definition.meta.ignore {
            log::debug!("Ignoring {}", file);
            return vec![TestReport::new(file, 0, TestStatus::Ignore).with_description(description)];
        }

        if let Some(reason) = definition.meta.incomplete.as_ref().and_then(|i| i.reason()) {
            log::debug!("Skipping incomplete {}: {}", file, reason);
            return vec![TestReport::new(file, 0, TestStatus::Incomplete)
                .with_description(description)
                .with_error(reason)];
        }

        let materialized =
            definition.materialize(&self.store, self.base_url.as_deref(), self.default_timeout);
        let cases = match materialized {
            Ok(cases) => cases,
            Err(e) if e.is_unresolved_reference() => {
                log::warn!("{}: {}", file, e);
                return vec![TestReport::new(file, 0, TestStatus::Incomplete)
                    .with_description(description)
                    .with_error(e.to_string())
                    .unresolved()];
            }
            Err(e) => {
                log::error!("{}: {}", file, e);
                return vec![TestReport::new(file, 0, TestStatus::Error)
                    .with_description(description)
                    .with_error(e.to_string())];
            }
        };

        let mut reports = Vec::with_capacity(cases.len());
        for case in &cases {
            let report = self.run_case(file, case).await;
            reports.push(report.with_description(description.clone()));
        }
        reports
    }

    /// Send the request, evaluate the rules, then export
    pub async fn run_case(&self, file: &str, case: &ExecutableCase) -> TestReport {
        let report = TestReport::new(file, case.index, TestStatus::Error);
        let started_at = Utc::now();
        let start = Instant::now();

        let response = match self.send(case).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("{} {} failed: {}", case.request.method, case.request.url, e);
                return report
                    .with_request(&case.request, started_at)
                    .with_error(e.to_string());
            }
        };

        let exchange = ExecutedExchange {
            request: case.request.clone(),
            response,
            started_at,
            finished_at: Utc::now(),
            elapsed: start.elapsed(),
        };

        log::debug!(
            "{} {} -> {} in {:?}",
            exchange.request.method,
            exchange.request.url,
            exchange.response.status_code,
            exchange.elapsed
        );

        let evaluation = match RuleEngine::new(case.json_body).evaluate(&exchange, &case.rules) {
            Ok(evaluation) => evaluation,
            Err(e) => return report.with_exchange(&exchange, None).with_error(e.to_string()),
        };

        let mut report = report.with_exchange(&exchange, Some(evaluation.body.clone()));
        report.status = evaluation.status;
        report.rule_report = evaluation.reports;

        if case.json_body {
            if let Err(message) = self.export(case, &evaluation.body) {
                log::error!("{}: {}", file, message);
                report.status = TestStatus::Error;
                report.error = Some(message);
            }
        }

        report
    }

    /// Send the request, capped by the case timeout whatever the transport does
    async fn send(&self, case: &ExecutableCase) -> Result<HttpResponse, TransportError> {
        let timeout = case.request.timeout;
        match tokio::time::timeout(timeout, self.transport.send(&case.request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => e.into_response(),
            Err(_) => Err(TransportError::Timeout { timeout }),
        }
    }

    /// Write every export of `case` into the store, pointers addressing `body`.
    /// Nothing is written unless every pointer resolves.
    pub fn export(&self, case: &ExecutableCase, body: &Value) -> Result<(), String> {
        let mut resolved = Vec::with_capacity(case.export.len());
        for (name, pointer) in &case.export {
            let pointer = pointer.trim_end_matches('/');
            let value = body.pointer(pointer).ok_or_else(|| {
                format!("Export \"{}\": pointer \"{}\" not found in body", name, pointer)
            })?;
            log::debug!("Exporting {} = {}", name, value);
            resolved.push((name, value.clone()));
        }

        self.store.set_all(resolved).map_err(|e| e.to_string())
    }
}
