use rulerunner::definition::{parse, Incomplete, TestDefinition};
use rulerunner::error::{DefinitionError, ExpressionError};
use rulerunner::globals::GlobalStore;
use serde_json::{json, Value};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);

fn definition(document: Value) -> TestDefinition {
    TestDefinition::from_value(document).unwrap()
}

#[test]
fn test_malformed_input() {
    assert!(matches!(parse("{not json"), Err(DefinitionError::MalformedInput(_))));
    assert!(matches!(parse("[]"), Err(DefinitionError::MalformedInput(_))));
}

#[test]
fn test_missing_required_fields() {
    let err =
        parse(r#"{"request": {"method": "GET"}, "response": {"statusCode": 200}}"#).unwrap_err();
    assert!(matches!(err, DefinitionError::MissingField { ref field } if field == "request.url"));

    let err = parse(r#"{"request": {"url": "/x"}, "response": {}}"#).unwrap_err();
    assert!(matches!(
        err,
        DefinitionError::MissingField { ref field } if field == "response.statusCode"
    ));

    let err = parse(r#"{"request": {"url": "/x"}}"#).unwrap_err();
    assert!(matches!(err, DefinitionError::MissingField { ref field } if field == "response"));
}

#[test]
fn test_invalid_status_codes() {
    for status_code in [json!(99), json!(1000), json!("200"), json!([]), json!([200, 42])] {
        let err = TestDefinition::from_value(json!({
            "request": {"url": "/x"},
            "response": {"statusCode": status_code}
        }))
        .unwrap_err();
        assert!(
            matches!(
                err,
                DefinitionError::InvalidField { ref field, .. } if field == "response.statusCode"
            ),
            "{:?}",
            err
        );
    }

    let too_many: Vec<u16> = (200..211).collect();
    assert!(TestDefinition::from_value(json!({
        "request": {"url": "/x"},
        "response": {"statusCode": too_many}
    }))
    .is_err());
}

#[test]
fn test_invalid_fields() {
    let cases = vec![
        (json!({"url": "/x", "body": 5}), "request.body"),
        (json!({"url": "/x", "body": [{"a": 1}, 2]}), "request.body"),
        (json!({"url": "/x", "headers": "Accept: */*"}), "request.headers"),
        (json!({"url": ""}), "request.url"),
        (json!({"url": "/x", "method": "GE T"}), "request.method"),
        (json!({"url": "/x", "iterators": {"1bad": [1]}}), "request.iterators"),
    ];

    for (request, expected) in cases {
        let err = TestDefinition::from_value(json!({
            "request": request,
            "response": {"statusCode": 200}
        }))
        .unwrap_err();
        assert!(
            matches!(err, DefinitionError::InvalidField { ref field, .. } if field == expected),
            "{:?}",
            err
        );
    }

    let err = TestDefinition::from_value(json!({
        "meta": {"order": 100_000_000},
        "request": {"url": "/x"},
        "response": {"statusCode": 200}
    }))
    .unwrap_err();
    assert!(matches!(
        err,
        DefinitionError::InvalidField { ref field, .. } if field == "meta.order"
    ));
}

#[test]
fn test_meta_fields() {
    let definition = definition(json!({
        "meta": {
            "order": -5,
            "description": "create user",
            "JSONbody": false,
            "incomplete": "waiting for the backend",
            "dependencies": ["users/login.json"]
        },
        "request": {"url": "/x", "method": "post"},
        "response": {"statusCode": [200, 201]}
    }));

    assert_eq!(definition.meta.order, -5);
    assert!(!definition.meta.json_body);
    assert_eq!(
        definition.meta.incomplete,
        Some(Incomplete::Reason("waiting for the backend".to_string()))
    );
    assert_eq!(definition.meta.dependencies, vec!["users/login.json".to_string()]);
    assert_eq!(definition.request.method, "POST");
    assert_eq!(definition.response.status_code.codes(), vec![200, 201]);

    let camel = definition_with_meta(json!({"jsonBody": false}));
    assert!(!camel.meta.json_body);
}

fn definition_with_meta(meta: Value) -> TestDefinition {
    definition(json!({
        "meta": meta,
        "request": {"url": "/x"},
        "response": {"statusCode": 200}
    }))
}

#[test]
fn test_iterators_expand_to_cartesian_product() {
    let store = GlobalStore::empty();
    let definition = definition(json!({
        "request": {
            "url": "/items/{{a}}/{{b}}",
            "iterators": {"a": [1, 2], "b": ["x", "y"]}
        },
        "response": {"statusCode": 200}
    }));

    let cases = definition.materialize(&store, None, TIMEOUT).unwrap();
    let urls: Vec<&str> = cases.iter().map(|case| case.request.url.as_str()).collect();
    assert_eq!(urls, vec!["/items/1/x", "/items/1/y", "/items/2/x", "/items/2/y"]);

    let indices: Vec<usize> = cases.iter().map(|case| case.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(cases[3].bindings.get("a"), Some(&json!(2)));
    assert_eq!(cases[3].bindings.get("b"), Some(&json!("y")));
}

#[test]
fn test_iterator_values_from_a_global() {
    let store = GlobalStore::empty();
    store.set("ids", json!([7, 8, 9])).unwrap();

    let definition = definition(json!({
        "request": {"url": "/users/{{id}}", "iterators": {"id": "{{{ids}}}"}},
        "response": {"statusCode": 200}
    }));

    let cases = definition.materialize(&store, None, TIMEOUT).unwrap();
    assert_eq!(cases.len(), 3);
    assert_eq!(cases[2].request.url, "/users/9");

    let scalar = definition_with_iterator(json!("{{{single}}}"));
    store.set("single", json!(1)).unwrap();
    assert!(matches!(
        scalar.materialize(&store, None, TIMEOUT),
        Err(DefinitionError::InvalidField { .. })
    ));
}

fn definition_with_iterator(values: Value) -> TestDefinition {
    definition(json!({
        "request": {"url": "/x", "iterators": {"it": values}},
        "response": {"statusCode": 200}
    }))
}

#[test]
fn test_body_variants_multiply_iterator_combinations() {
    let store = GlobalStore::empty();
    let definition = definition(json!({
        "request": {
            "url": "/x",
            "method": "POST",
            "iterators": {"n": [1, 2]},
            "body": [{"value": "{{{n}}}"}, "raw {{n}}"]
        },
        "response": {"statusCode": 200}
    }));

    let cases = definition.materialize(&store, None, TIMEOUT).unwrap();
    let bodies: Vec<Option<String>> = cases.iter().map(|case| case.request.body.clone()).collect();
    assert_eq!(
        bodies,
        vec![
            Some("{\"value\":1}".to_string()),
            Some("raw 1".to_string()),
            Some("{\"value\":2}".to_string()),
            Some("raw 2".to_string()),
        ]
    );
}

#[test]
fn test_empty_body_yields_one_case() {
    let store = GlobalStore::empty();
    for body in [json!([]), json!("")] {
        let definition = definition(json!({
            "request": {"url": "/x", "body": body},
            "response": {"statusCode": 200}
        }));
        let cases = definition.materialize(&store, None, TIMEOUT).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].request.body, None);
    }
}

#[test]
fn test_rules_are_built_in_order() {
    let store = GlobalStore::empty();
    store.set("kind", json!("json")).unwrap();

    let definition = definition(json!({
        "request": {"url": "/x"},
        "response": {
            "statusCode": [200, 201],
            "headers": {"Content-Type": "application/{{kind}}"},
            "rules": {"/body/id": {"type": "integer"}, "/timeout": {"maximum": 2}},
            "ruleObjects": [{"type": "object", "required": ["id"]}]
        }
    }));

    let cases = definition.materialize(&store, None, TIMEOUT).unwrap();
    let pointers: Vec<&str> = cases[0].rules.iter().map(|rule| rule.pointer()).collect();
    assert_eq!(
        pointers,
        vec!["/statusCode", "/header/content-type", "/body/id", "/timeout", "/body"]
    );

    let header = &cases[0].rules[1];
    assert!(header.schema().validate(&json!("application/json")).status);
}

#[test]
fn test_rules_as_json_text() {
    let store = GlobalStore::empty();
    let definition = definition(json!({
        "request": {"url": "/x"},
        "response": {"statusCode": 200, "rules": "{\"/body/name\": {\"type\": \"string\"}}"}
    }));

    let cases = definition.materialize(&store, None, TIMEOUT).unwrap();
    assert_eq!(cases[0].rules[1].pointer(), "/body/name");
}

#[test]
fn test_invalid_rule_pointer() {
    let store = GlobalStore::empty();
    let definition = definition(json!({
        "request": {"url": "/x"},
        "response": {"statusCode": 200, "rules": {"/headers/x": {"type": "string"}}}
    }));

    assert!(matches!(
        definition.materialize(&store, None, TIMEOUT),
        Err(DefinitionError::Rule(_))
    ));
}

#[test]
fn test_request_resolution() {
    let store = GlobalStore::empty();
    store.set("token", json!("abc")).unwrap();

    let definition = definition(json!({
        "request": {
            "url": "/me",
            "headers": ["Authorization: Bearer {{token}}", "Accept: application/json"]
        },
        "response": {"statusCode": 200, "timeout": 5, "export": {"userId": "/id"}}
    }));

    let cases = definition
        .materialize(&store, Some("http://api.local/v1/"), TIMEOUT)
        .unwrap();
    let request = &cases[0].request;

    assert_eq!(request.url, "http://api.local/v1/me");
    assert_eq!(request.method, "GET");
    assert_eq!(
        request.headers,
        vec![
            ("Authorization".to_string(), "Bearer abc".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ]
    );
    assert_eq!(request.timeout, Duration::from_secs(5));
    assert_eq!(cases[0].export.get("userId").map(String::as_str), Some("/id"));
    assert!(definition.exports());
}

#[test]
fn test_unresolved_global() {
    let store = GlobalStore::empty();
    let definition = definition(json!({
        "request": {"url": "/users/{{{userId}}}"},
        "response": {"statusCode": 200}
    }));

    let err = definition.materialize(&store, None, TIMEOUT).unwrap_err();
    assert!(err.is_unresolved_reference());
    assert!(matches!(
        err,
        DefinitionError::Expression(ExpressionError::UnknownGlobal { ref key }) if key == "userId"
    ));
}
