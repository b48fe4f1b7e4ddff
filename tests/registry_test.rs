//! Tests for the tool registry and executor.

use agentry::registry::{FnTool, Tool, ToolCallResult, ToolError, ToolFailure, ToolRegistry};
use agentry::schema::{Field, Schema};
use agentry::types::ToolCall;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn add_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "add",
        "Adds two numbers",
        Schema::object(vec![
            Field::required("a", Schema::Number),
            Field::required("b", Schema::Number),
        ]),
        |args| async move {
            let a = args["a"].as_f64().unwrap_or_default();
            let b = args["b"].as_f64().unwrap_or_default();
            Ok(json!(a + b))
        },
    ))
}

fn sleeper(name: &str, delay: Duration) -> Arc<dyn Tool> {
    let name_owned = name.to_string();
    Arc::new(FnTool::new(
        name,
        "Sleeps then answers",
        Schema::empty_object(),
        move |_args| {
            let name = name_owned.clone();
            async move {
                tokio::time::sleep(delay).await;
                Ok(json!(format!("{}-result", name)))
            }
        },
    ))
}

// ---------------------------------------------------------------------------
// Interface derivation & caching
// ---------------------------------------------------------------------------

#[test]
fn interfaces_are_cached_until_reregistration() {
    let registry = ToolRegistry::new();
    registry.register(add_tool());

    let first = registry.list_interfaces();
    let second = registry.list_interfaces();
    assert_eq!(first.len(), 1);
    assert!(
        Arc::ptr_eq(&first[0], &second[0]),
        "repeated calls must reuse the cached interface"
    );

    // Re-registering the same name must invalidate the cache.
    registry.register(Arc::new(FnTool::new(
        "add",
        "Adds two integers",
        Schema::object(vec![
            Field::required("a", Schema::Integer),
            Field::required("b", Schema::Integer),
        ]),
        |_| async { Ok(json!(0)) },
    )));

    let third = registry.list_interfaces();
    assert!(
        !Arc::ptr_eq(&first[0], &third[0]),
        "re-registration must produce a fresh interface"
    );
    assert_eq!(third[0].description, "Adds two integers");
    assert_eq!(third[0].parameters["properties"]["a"]["type"], "integer");
}

#[test]
fn interface_shape_includes_required_fields() {
    let registry = ToolRegistry::new();
    registry.register(add_tool());

    let interfaces = registry.list_interfaces();
    let params = &interfaces[0].parameters;
    assert_eq!(params["type"], "object");
    assert_eq!(params["required"], json!(["a", "b"]));
}

// ---------------------------------------------------------------------------
// execute_one
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_scenario_succeeds() {
    let registry = ToolRegistry::new();
    registry.register(add_tool());
    let cancel = CancellationToken::new();

    let call = ToolCall::new("c1", "add", r#"{"a": 2, "b": 3}"#);
    let result = registry.execute_one(&call, &cancel).await;
    assert_eq!(result.id, "c1");
    assert_eq!(result.outcome.unwrap(), json!(5.0));
}

#[tokio::test]
async fn invalid_arguments_name_the_field() {
    let registry = ToolRegistry::new();
    registry.register(add_tool());
    let cancel = CancellationToken::new();

    let call = ToolCall::new("c1", "add", r#"{"a": "x", "b": 3}"#);
    let result = registry.execute_one(&call, &cancel).await;
    match result.outcome {
        Err(ToolError::InvalidArguments(issues)) => {
            assert_eq!(issues[0].field, "a");
        }
        other => panic!("expected InvalidArguments, got {:?}", other),
    }
}

#[tokio::test]
async fn validation_failure_never_invokes_the_executor() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let spy = invocations.clone();
    let registry = ToolRegistry::new();
    registry.register(Arc::new(FnTool::new(
        "probe",
        "Counts invocations",
        Schema::object(vec![Field::required("n", Schema::Integer)]),
        move |_| {
            let spy = spy.clone();
            async move {
                spy.fetch_add(1, Ordering::SeqCst);
                Ok(json!("ran"))
            }
        },
    )));
    let cancel = CancellationToken::new();

    let bad = ToolCall::new("c1", "probe", r#"{"n": "not a number"}"#);
    let result = registry.execute_one(&bad, &cancel).await;
    assert!(result.is_error());
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    let good = ToolCall::new("c2", "probe", r#"{"n": 1}"#);
    let result = registry.execute_one(&good, &cancel).await;
    assert!(!result.is_error());
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_tool_is_reported_not_thrown() {
    let registry = ToolRegistry::new();
    let cancel = CancellationToken::new();

    let call = ToolCall::new("c1", "nope", "{}");
    let result = registry.execute_one(&call, &cancel).await;
    match result.outcome {
        Err(ToolError::NotFound(name)) => assert_eq!(name, "nope"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_arguments_do_not_reach_the_executor() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let spy = invocations.clone();
    let registry = ToolRegistry::new();
    registry.register(Arc::new(FnTool::new(
        "probe",
        "Counts invocations",
        Schema::empty_object(),
        move |_| {
            let spy = spy.clone();
            async move {
                spy.fetch_add(1, Ordering::SeqCst);
                Ok(json!("ran"))
            }
        },
    )));
    let cancel = CancellationToken::new();

    let call = ToolCall::new("c1", "probe", "{not json");
    let result = registry.execute_one(&call, &cancel).await;
    assert!(matches!(
        result.outcome,
        Err(ToolError::MalformedArguments(_))
    ));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn executor_errors_are_wrapped_with_the_tool_name() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(FnTool::new(
        "flaky",
        "Always fails",
        Schema::empty_object(),
        |_| async { Err::<serde_json::Value, _>(ToolFailure::new("disk on fire")) },
    )));
    let cancel = CancellationToken::new();

    let call = ToolCall::new("c1", "flaky", "{}");
    let result = registry.execute_one(&call, &cancel).await;
    match result.outcome {
        Err(ToolError::ExecutionFailed { tool, message }) => {
            assert_eq!(tool, "flaky");
            assert_eq!(message, "disk on fire");
        }
        other => panic!("expected ExecutionFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn slow_executor_times_out_as_per_call_failure() {
    let registry = ToolRegistry::new().with_call_timeout(Duration::from_millis(20));
    registry.register(sleeper("glacial", Duration::from_secs(5)));
    let cancel = CancellationToken::new();

    let call = ToolCall::new("c1", "glacial", "{}");
    let result = registry.execute_one(&call, &cancel).await;
    match result.outcome {
        Err(ToolError::ExecutionFailed { message, .. }) => {
            assert!(message.contains("timed out"));
        }
        other => panic!("expected timeout failure, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// execute_many
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_results_come_back_in_call_order() {
    let registry = ToolRegistry::new();
    registry.register(sleeper("slow", Duration::from_millis(100)));
    registry.register(sleeper("fast", Duration::from_millis(1)));
    let cancel = CancellationToken::new();

    let calls = vec![
        ToolCall::new("c-slow", "slow", "{}"),
        ToolCall::new("c-fast", "fast", "{}"),
    ];
    let results = registry.execute_many(&calls, &cancel).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "c-slow");
    assert_eq!(results[0].outcome.as_ref().unwrap(), &json!("slow-result"));
    assert_eq!(results[1].id, "c-fast");
    assert_eq!(results[1].outcome.as_ref().unwrap(), &json!("fast-result"));
}

#[tokio::test]
async fn batch_order_holds_under_randomized_latency() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(FnTool::new(
        "jitter",
        "Sleeps a random few ms",
        Schema::object(vec![Field::required("tag", Schema::String)]),
        |args| async move {
            let ms = rand::random::<u64>() % 20;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(args["tag"].clone())
        },
    )));
    let cancel = CancellationToken::new();

    let calls: Vec<ToolCall> = (0..16)
        .map(|i| {
            ToolCall::new(
                format!("c{}", i),
                "jitter",
                format!(r#"{{"tag": "t{}"}}"#, i),
            )
        })
        .collect();
    let results = registry.execute_many(&calls, &cancel).await;

    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.id, calls[i].id, "results[{}] paired wrongly", i);
    }
}

#[tokio::test]
async fn one_failure_never_poisons_the_batch() {
    let registry = ToolRegistry::new();
    registry.register(add_tool());
    let cancel = CancellationToken::new();

    let calls = vec![
        ToolCall::new("c1", "add", r#"{"a": 1, "b": 1}"#),
        ToolCall::new("c2", "missing", "{}"),
        ToolCall::new("c3", "add", r#"{"a": 2, "b": 2}"#),
    ];
    let results = registry.execute_many(&calls, &cancel).await;

    assert_eq!(results.len(), 3);
    assert!(!results[0].is_error());
    assert!(results[1].is_error());
    assert!(!results[2].is_error());
    assert!(results[1].content().contains("error"));
}

#[test]
fn failure_content_is_error_shaped_json() {
    let result = ToolCallResult {
        id: "c1".into(),
        name: "x".into(),
        outcome: Err(ToolError::NotFound("x".into())),
    };
    let parsed: serde_json::Value = serde_json::from_str(&result.content()).unwrap();
    assert!(parsed["error"].as_str().unwrap().contains("x"));
}
