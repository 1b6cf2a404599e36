//! Invocation data model.
//!
//! An [`InvocationRequest`] is created per incoming call and handed to the executor,
//! which turns it into exactly one [`InvocationResult`]. The result's outcome is an
//! enum flattened into the record, so a result can never carry both an output and
//! an error:
//!
//! ```json
//! {"requestId":"…","status":"ok","output":5,"startedAt":"…","durationMs":3}
//! {"requestId":"…","status":"error","errorKind":"TypeError","errorMessage":"…","startedAt":"…","durationMs":1}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Caller-supplied metadata passed to the handler as its second argument.
///
/// Unknown fields are preserved in `extra` and forwarded to the handler untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Deadline hint in milliseconds. The executor never waits longer than its own
    /// configured timeout, even if the hint is larger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One incoming call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InvocationRequest {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub context: RequestContext,
}

impl InvocationRequest {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            context: RequestContext::default(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.context.request_id = Some(request_id.into());
        self
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.context.deadline_ms = Some(deadline_ms);
        self
    }

    /// Assigns a fresh UUID v4 request id if the caller did not supply one and
    /// returns the id in effect.
    pub fn ensure_request_id(&mut self) -> &str {
        self.context
            .request_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
    }
}

/// Terminal status of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Ok,
    Error,
    Timeout,
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvocationStatus::Ok => "ok",
            InvocationStatus::Error => "error",
            InvocationStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// What the handler produced. Serialized inline with a `status` tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Ok {
        output: Value,
    },
    Error {
        #[serde(rename = "errorKind")]
        error_kind: String,
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
    Timeout {
        #[serde(rename = "errorKind")]
        error_kind: String,
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

impl Outcome {
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Outcome::Error {
            error_kind: kind.into(),
            error_message: message.into(),
        }
    }

    pub fn timeout(limit_ms: u128) -> Self {
        Outcome::Timeout {
            error_kind: "Timeout".into(),
            error_message: format!("handler did not complete within {}ms", limit_ms),
        }
    }

    pub fn status(&self) -> InvocationStatus {
        match self {
            Outcome::Ok { .. } => InvocationStatus::Ok,
            Outcome::Error { .. } => InvocationStatus::Error,
            Outcome::Timeout { .. } => InvocationStatus::Timeout,
        }
    }
}

/// The record written to the result store for every invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub request_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl InvocationResult {
    pub fn new(
        request_id: impl Into<String>,
        outcome: Outcome,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            outcome,
            started_at,
            duration_ms,
        }
    }

    pub fn status(&self) -> InvocationStatus {
        self.outcome.status()
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Ok { .. })
    }

    pub fn output(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Ok { output } => Some(output),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Ok { .. } => None,
            Outcome::Error { error_kind, .. } | Outcome::Timeout { error_kind, .. } => {
                Some(error_kind)
            }
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Ok { .. } => None,
            Outcome::Error { error_message, .. } | Outcome::Timeout { error_message, .. } => {
                Some(error_message)
            }
        }
    }
}

/// Acknowledgment returned to the caller of the runtime.
///
/// `result.status` reports what the handler did; `stored` reports whether the
/// record reached the result store. The two are independent: a successful handler
/// call whose record could not be written has `stored = false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationAck {
    pub request_id: String,
    pub stored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
    pub result: InvocationResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn started() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_ok_result_serializes_output_only() {
        let result = InvocationResult::new("r1", Outcome::Ok { output: json!(5) }, started(), 3);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["output"], 5);
        assert_eq!(value["requestId"], "r1");
        assert_eq!(value["durationMs"], 3);
        assert!(value.get("errorMessage").is_none());
        assert!(value.get("errorKind").is_none());
    }

    #[test]
    fn test_error_result_serializes_error_fields_only() {
        let result = InvocationResult::new(
            "r2",
            Outcome::error("TypeError", "missing key 'b'"),
            started(),
            1,
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["errorKind"], "TypeError");
        assert_eq!(value["errorMessage"], "missing key 'b'");
        assert!(value.get("output").is_none());
    }

    #[test]
    fn test_timeout_outcome_names_limit() {
        let outcome = Outcome::timeout(250);
        assert_eq!(outcome.status(), InvocationStatus::Timeout);
        match outcome {
            Outcome::Timeout { error_message, error_kind } => {
                assert_eq!(error_kind, "Timeout");
                assert!(error_message.contains("250ms"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_rejects_ok_without_output() {
        let raw = json!({
            "requestId": "r3",
            "status": "ok",
            "startedAt": "2025-01-01T00:00:00Z",
            "durationMs": 2
        });
        assert!(serde_json::from_value::<InvocationResult>(raw).is_err());
    }

    #[test]
    fn test_deserialize_stored_record() {
        let raw = r#"{"requestId":"r4","status":"timeout","errorKind":"Timeout","errorMessage":"too slow","startedAt":"2025-01-01T00:00:00Z","durationMs":100}"#;
        let result: InvocationResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.status(), InvocationStatus::Timeout);
        assert_eq!(result.error_message(), Some("too slow"));
        assert!(result.output().is_none());
    }

    #[test]
    fn test_request_context_keeps_extra_fields() {
        let raw = json!({"input": {"a": 1}, "context": {"requestId": "abc", "tenant": "t1"}});
        let request: InvocationRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.context.request_id.as_deref(), Some("abc"));
        assert_eq!(request.context.extra["tenant"], "t1");
    }

    #[test]
    fn test_ensure_request_id_assigns_once() {
        let mut request = InvocationRequest::new(json!(null));
        let first = request.ensure_request_id().to_string();
        let second = request.ensure_request_id().to_string();
        assert_eq!(first, second);
        assert!(uuid::Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn test_ensure_request_id_keeps_caller_id() {
        let mut request = InvocationRequest::new(json!(null)).with_request_id("caller-id");
        assert_eq!(request.ensure_request_id(), "caller-id");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(InvocationStatus::Ok.to_string(), "ok");
        assert_eq!(InvocationStatus::Error.to_string(), "error");
        assert_eq!(InvocationStatus::Timeout.to_string(), "timeout");
    }
}
