mod mocks;

use mocks::{json_response, MockTransport, StubTransport};
use rulerunner::definition::TestDefinition;
use rulerunner::error::TransportError;
use rulerunner::globals::GlobalStore;
use rulerunner::reporting::{SuiteStats, TestStatus};
use rulerunner::runner::Runner;
use rulerunner::transport::HttpResponse;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn definition(document: Value) -> TestDefinition {
    TestDefinition::from_value(document).unwrap()
}

fn runner(transport: MockTransport) -> Runner {
    Runner::new(GlobalStore::empty(), Arc::new(transport))
        .with_base_url(Some("http://api.local".to_string()))
}

#[tokio::test]
async fn test_successful_case_exports_values() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|request| request.method == "POST" && request.url == "http://api.local/users")
        .times(1)
        .returning(|_| Ok(json_response(201, json!({"id": 42, "profile": {"name": "alice"}}))));

    let runner = runner(transport);
    let definition = definition(json!({
        "meta": {"description": "create user"},
        "request": {"url": "/users", "method": "POST", "body": {"name": "alice"}},
        "response": {
            "statusCode": 201,
            "rules": {"/body/id": {"type": "integer"}},
            "export": {"userId": "/id", "userName": "/profile/name"}
        }
    }));

    let reports = runner.run_definition("users/create.json", &definition).await;
    assert_eq!(reports.len(), 1);

    let report = &reports[0];
    assert_eq!(report.status, TestStatus::Success);
    assert_eq!(report.description.as_deref(), Some("create user"));
    assert_eq!(report.rule_report.len(), 2);
    assert_eq!(report.request.as_ref().unwrap().body, Some(json!({"name": "alice"})));
    assert_eq!(report.response.as_ref().unwrap().status_code, 201);

    assert_eq!(runner.store().get_value("userId").unwrap(), json!(42));
    assert_eq!(runner.store().get_value("userName").unwrap(), json!("alice"));
}

#[tokio::test]
async fn test_status_error_response_is_still_evaluated() {
    let mut transport = MockTransport::new();
    transport.expect_send().returning(|_| {
        Err(TransportError::Status {
            response: Box::new(json_response(404, json!({"error": "not found"}))),
        })
    });

    let runner = runner(transport);
    let definition = definition(json!({
        "request": {"url": "/users/999"},
        "response": {"statusCode": 404, "rules": {"/body/error": {"const": "not found"}}}
    }));

    let reports = runner.run_definition("users/missing.json", &definition).await;
    assert_eq!(reports[0].status, TestStatus::Success, "{:?}", reports[0].messages());
}

#[tokio::test]
async fn test_transport_failure_is_an_error() {
    let mut transport = MockTransport::new();
    transport.expect_send().returning(|_| {
        Err(TransportError::Timeout {
            timeout: Duration::from_secs(1),
        })
    });

    let runner = runner(transport);
    let definition = definition(json!({
        "request": {"url": "/slow"},
        "response": {"statusCode": 200, "timeout": 1, "export": {"value": "/id"}}
    }));

    let reports = runner.run_definition("slow.json", &definition).await;
    let report = &reports[0];
    assert_eq!(report.status, TestStatus::Error);
    assert!(report.error.as_deref().unwrap().contains("timeout"));
    assert_eq!(report.request.as_ref().unwrap().url, "http://api.local/slow");
    assert!(report.response.is_none());
    assert!(!runner.store().exists("value"));
}

#[tokio::test]
async fn test_failed_rules_still_export() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .returning(|_| Ok(json_response(200, json!({"id": "not-a-number"}))));

    let runner = runner(transport);
    let definition = definition(json!({
        "request": {"url": "/x"},
        "response": {
            "statusCode": 200,
            "rules": {"/body/id": {"type": "integer"}},
            "export": {"id": "/id"}
        }
    }));

    let reports = runner.run_definition("x.json", &definition).await;
    assert_eq!(reports[0].status, TestStatus::Failure);
    assert_eq!(runner.store().get_value("id").unwrap(), json!("not-a-number"));
}

#[tokio::test]
async fn test_missing_export_pointer_is_an_error() {
    let mut transport = MockTransport::new();
    transport.expect_send().returning(|_| Ok(json_response(200, json!({"id": 1}))));

    let runner = runner(transport);
    let definition = definition(json!({
        "request": {"url": "/x"},
        "response": {"statusCode": 200, "export": {"token": "/auth/token"}}
    }));

    let reports = runner.run_definition("x.json", &definition).await;
    assert_eq!(reports[0].status, TestStatus::Error);
    assert!(reports[0].error.as_deref().unwrap().contains("/auth/token"));
}

#[tokio::test]
async fn test_exports_are_all_or_nothing() {
    let mut transport = MockTransport::new();
    transport.expect_send().returning(|_| Ok(json_response(200, json!({"id": 7}))));

    let runner = runner(transport);
    let definition = definition(json!({
        "request": {"url": "/x"},
        "response": {"statusCode": 200, "export": {"aId": "/id", "zMissing": "/missing"}}
    }));

    let reports = runner.run_definition("x.json", &definition).await;
    assert_eq!(reports[0].status, TestStatus::Error);
    assert!(!runner.store().exists("aId"));
    assert!(!runner.store().exists("zMissing"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_transport_is_capped_by_case_timeout() {
    let transport = StubTransport::new()
        .route("GET", "http://api.local/slow", json_response(200, json!({"id": 1})))
        .delay("http://api.local/slow", Duration::from_millis(2500));

    let runner = Runner::new(GlobalStore::empty(), Arc::new(transport))
        .with_base_url(Some("http://api.local".to_string()));
    let definition = definition(json!({
        "request": {"url": "/slow"},
        "response": {"statusCode": 200, "timeout": 1, "export": {"value": "/id"}}
    }));

    let reports = runner.run_definition("slow.json", &definition).await;
    assert_eq!(reports[0].status, TestStatus::Error);
    assert!(reports[0].error.as_deref().unwrap().contains("timeout"));
    assert!(reports[0].response.is_none());
    assert!(!runner.store().exists("value"));
}

#[tokio::test]
async fn test_non_json_body_skips_export() {
    let mut transport = MockTransport::new();
    transport.expect_send().returning(|_| {
        Ok(HttpResponse::new(200, "pong").with_header("Content-Type", "text/plain"))
    });

    let runner = runner(transport);
    let definition = definition(json!({
        "meta": {"JSONbody": false},
        "request": {"url": "/ping"},
        "response": {
            "statusCode": 200,
            "rules": {"/body": {"const": "pong"}},
            "export": {"pong": "/x"}
        }
    }));

    let reports = runner.run_definition("ping.json", &definition).await;
    assert_eq!(reports[0].status, TestStatus::Success);
    assert!(!runner.store().exists("pong"));
}

#[tokio::test]
async fn test_undecodable_body_is_an_error() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .returning(|_| Ok(HttpResponse::new(200, "<html></html>")));

    let runner = runner(transport);
    let definition = definition(json!({
        "request": {"url": "/x"},
        "response": {"statusCode": 200}
    }));

    let reports = runner.run_definition("x.json", &definition).await;
    assert_eq!(reports[0].status, TestStatus::Error);
    assert_eq!(
        reports[0].response.as_ref().unwrap().body,
        Value::String("<html></html>".to_string())
    );
}

#[tokio::test]
async fn test_skipped_definitions_do_not_send() {
    let mut transport = MockTransport::new();
    transport.expect_send().times(0);
    let runner = runner(transport);

    let ignored = definition(json!({
        "meta": {"ignore": true},
        "request": {"url": "/x"},
        "response": {"statusCode": 200}
    }));
    let incomplete = definition(json!({
        "meta": {"incomplete": "endpoint not deployed"},
        "request": {"url": "/x"},
        "response": {"statusCode": 200}
    }));
    let unresolved = definition(json!({
        "request": {"url": "/users/{{{userId}}}"},
        "response": {"statusCode": 200}
    }));

    let mut reports = Vec::new();
    reports.extend(runner.run_definition("ignored.json", &ignored).await);
    reports.extend(runner.run_definition("incomplete.json", &incomplete).await);
    reports.extend(runner.run_definition("unresolved.json", &unresolved).await);

    assert_eq!(reports[0].status, TestStatus::Ignore);
    assert_eq!(reports[1].status, TestStatus::Incomplete);
    assert_eq!(reports[1].error.as_deref(), Some("endpoint not deployed"));
    assert_eq!(reports[2].status, TestStatus::Incomplete);
    assert!(reports[2].unresolved);

    let stats = SuiteStats::from_reports(&reports);
    assert_eq!(stats.ignore, 1);
    assert_eq!(stats.incomplete, 2);
    assert_eq!(stats.unresolved, 1);
    assert_eq!(stats.exit_code(), 0);
}

#[tokio::test]
async fn test_iterators_send_one_request_per_combination() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(4)
        .returning(|request| Ok(json_response(200, json!({"url": request.url}))));

    let runner = runner(transport);
    let definition = definition(json!({
        "request": {"url": "/items/{{a}}/{{b}}", "iterators": {"a": [1, 2], "b": ["x", "y"]}},
        "response": {"statusCode": 200}
    }));

    let reports = runner.run_definition("items.json", &definition).await;
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|report| report.status == TestStatus::Success));

    let urls: Vec<&str> = reports
        .iter()
        .map(|report| report.request.as_ref().unwrap().url.as_str())
        .collect();
    assert_eq!(
        urls,
        vec![
            "http://api.local/items/1/x",
            "http://api.local/items/1/y",
            "http://api.local/items/2/x",
            "http://api.local/items/2/y",
        ]
    );
}
