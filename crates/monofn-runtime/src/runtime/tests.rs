//! Failure-containment tests for the execution pipeline.

use std::sync::Arc;
use std::time::Duration;

use monofn_common::{InvocationRequest, InvocationStatus};
use serde_json::json;

use crate::resource_limits::ResourceLimits;
use crate::runtime::{Executor, HandlerBinding};

fn executor(src: &str) -> Executor {
    let limits = ResourceLimits::default().with_execution_timeout(Duration::from_secs(5));
    let binding = HandlerBinding::from_source("tests.js", src, &limits).unwrap();
    Executor::new(Arc::new(binding), limits)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hundred_failing_invocations_all_report_error() {
    let exec = executor("function handler(x, c) { throw new Error('fail ' + x); }");

    for i in 0..100 {
        let result = exec.execute(InvocationRequest::new(json!(i))).await;
        assert_eq!(result.status(), InvocationStatus::Error, "invocation {}", i);
        assert_eq!(result.error_message(), Some(format!("fail {}", i).as_str()));
    }

    // The executor is still healthy afterwards.
    let ok = executor("function handler(x, c) { return x; }")
        .execute(InvocationRequest::new(json!("still alive")))
        .await;
    assert!(ok.is_ok());
    assert_eq!(exec.available_slots(), exec.limits().max_concurrency);
}

#[tokio::test]
async fn test_failure_does_not_leak_into_next_call() {
    let exec = executor(
        r#"
        var poisoned = false;
        function handler(x, c) {
            if (poisoned) { return 'poisoned'; }
            poisoned = true;
            if (x === 'fail') { throw new Error('first'); }
            return 'clean';
        }
        "#,
    );
    let first = exec.execute(InvocationRequest::new(json!("fail"))).await;
    assert_eq!(first.status(), InvocationStatus::Error);

    let second = exec.execute(InvocationRequest::new(json!("ok"))).await;
    assert_eq!(second.output(), Some(&json!("clean")));
}

#[tokio::test]
async fn test_global_mutation_does_not_persist() {
    let exec = executor(
        "function handler(x, c) { globalThis.counter = (globalThis.counter || 0) + 1; return counter; }",
    );
    for _ in 0..3 {
        let result = exec.execute(InvocationRequest::new(json!(null))).await;
        assert_eq!(result.output(), Some(&json!(1)));
    }
}

#[tokio::test]
async fn test_status_matches_populated_fields() {
    let exec = executor(
        "function handler(x, c) { if (x.fail) { throw new TypeError('bad'); } return x.v; }",
    );
    let ok = exec.execute(InvocationRequest::new(json!({"v": 7}))).await;
    let err = exec.execute(InvocationRequest::new(json!({"fail": true}))).await;

    for result in [ok, err] {
        let value = serde_json::to_value(&result).unwrap();
        let has_output = value.get("output").is_some();
        let has_error = value.get("errorMessage").is_some() && value.get("errorKind").is_some();
        match result.status() {
            InvocationStatus::Ok => assert!(has_output && !has_error),
            _ => assert!(!has_output && has_error),
        }
    }
}
