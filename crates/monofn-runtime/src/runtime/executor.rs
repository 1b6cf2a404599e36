//! Invocation Executor.
//!
//! Turns one [`InvocationRequest`] into exactly one [`InvocationResult`]. Handler
//! calls run on tokio's blocking pool, each in a fresh engine context, bounded by
//! a semaphore and a wall-clock timeout.
//!
//! # Timeouts
//!
//! The timeout covers waiting for a concurrency slot and the handler call itself.
//! When it fires, the blocking thread cannot be interrupted. The invocation gives
//! its concurrency slot back at once and the thread is abandoned until the
//! handler returns or an engine limit stops it.
//!
//! Abandoned threads are bounded separately: each call also holds a thread
//! permit, moved into the blocking task, out of a pool of `max_concurrency +
//! max_abandoned_threads`. Only when that pool is exhausted do new invocations
//! wait behind runaway handlers.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use monofn_common::{InvocationRequest, InvocationResult, Outcome};
use serde_json::{json, Value as JsonValue};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::resource_limits::ResourceLimits;
use crate::runtime::context::{HandlerContext, HandlerError, PrepareError};
use crate::runtime::loader::HandlerBinding;

/// Executes invocations against one [`HandlerBinding`].
#[derive(Clone)]
pub struct Executor {
    binding: Arc<HandlerBinding>,
    limits: ResourceLimits,
    slots: Arc<Semaphore>,
    threads: Arc<Semaphore>,
}

impl Executor {
    pub fn new(binding: Arc<HandlerBinding>, limits: ResourceLimits) -> Self {
        let concurrency = limits.max_concurrency.max(1);
        let slots = Arc::new(Semaphore::new(concurrency));
        let threads = Arc::new(Semaphore::new(concurrency + limits.max_abandoned_threads));
        Self {
            binding,
            limits,
            slots,
            threads,
        }
    }

    pub fn binding(&self) -> &HandlerBinding {
        &self.binding
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Free concurrency slots right now.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Handler threads still running, abandoned ones included.
    pub fn running_threads(&self) -> usize {
        self.limits.max_concurrency.max(1) + self.limits.max_abandoned_threads
            - self.threads.available_permits()
    }

    /// Runs the handler for `request`. Never fails: every failure mode is
    /// captured in the returned result.
    pub async fn execute(&self, mut request: InvocationRequest) -> InvocationResult {
        let request_id = request.ensure_request_id().to_string();
        let started_at = Utc::now();
        let start = Instant::now();

        let budget = self.budget_for(&request);
        request.context.deadline_ms = Some(budget.as_millis() as u64);
        let context = self.handler_context(&request);

        debug!(%request_id, budget_ms = budget.as_millis() as u64, "Executing invocation");

        let outcome = match tokio::time::timeout(budget, self.run(request.input, context)).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::timeout(budget.as_millis()),
        };

        InvocationResult::new(
            request_id,
            outcome,
            started_at,
            start.elapsed().as_millis() as u64,
        )
    }

    /// Effective time budget: the configured timeout, shortened by a caller's
    /// non-zero deadline hint.
    fn budget_for(&self, request: &InvocationRequest) -> Duration {
        match request.context.deadline_ms {
            Some(hint) if hint > 0 => self
                .limits
                .execution_timeout
                .min(Duration::from_millis(hint)),
            _ => self.limits.execution_timeout,
        }
    }

    /// The caller's context with runtime fields merged in (runtime fields win).
    fn handler_context(&self, request: &InvocationRequest) -> JsonValue {
        let mut context = serde_json::to_value(&request.context).unwrap_or_else(|_| json!({}));
        if let Some(map) = context.as_object_mut() {
            map.insert(
                "functionPath".into(),
                json!(self.binding.path().display().to_string()),
            );
            map.insert(
                "functionModifiedAt".into(),
                json!(self.binding.modified_at_ms()),
            );
        }
        context
    }

    async fn run(&self, input: JsonValue, context: JsonValue) -> Outcome {
        // Dropped with this future, so a timeout frees the slot.
        let _slot = match self.slots.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Outcome::error("Unavailable", "executor is shut down"),
        };
        let thread = match self.threads.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Outcome::error("Unavailable", "executor is shut down"),
        };

        let source = self.binding.source();
        let limits = self.limits.clone();

        let handle = tokio::task::spawn_blocking(move || {
            // Held until the handler returns, even if the caller timed out.
            let _thread = thread;
            call_handler(&source, &limits, &input, &context)
        });

        match handle.await {
            Ok(Ok(output)) => Outcome::Ok { output },
            Ok(Err(e)) => Outcome::error(e.kind, e.message),
            Err(join_err) if join_err.is_panic() => {
                Outcome::error("Panic", panic_message(join_err.into_panic()))
            }
            Err(join_err) => Outcome::error("Cancelled", join_err.to_string()),
        }
    }
}

fn call_handler(
    source: &str,
    limits: &ResourceLimits,
    input: &JsonValue,
    context: &JsonValue,
) -> Result<JsonValue, HandlerError> {
    let mut ctx = HandlerContext::new(source, limits).map_err(|e| match e {
        PrepareError::Evaluation(m) => HandlerError::new("LoadError", m),
        PrepareError::MissingHandler(m) => HandlerError::new("LoadError", m),
    })?;
    ctx.call(input, context)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler thread panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monofn_common::InvocationStatus;

    fn executor(src: &str, limits: ResourceLimits) -> Executor {
        let binding = HandlerBinding::from_source("test.js", src, &limits).unwrap();
        Executor::new(Arc::new(binding), limits)
    }

    #[tokio::test]
    async fn test_ok_result() {
        let exec = executor(
            "function handler(x, c) { return x.a + x.b; }",
            ResourceLimits::default(),
        );
        let result = exec
            .execute(InvocationRequest::new(json!({"a": 2, "b": 3})).with_request_id("r1"))
            .await;
        assert_eq!(result.request_id, "r1");
        assert_eq!(result.status(), InvocationStatus::Ok);
        assert_eq!(result.output(), Some(&json!(5)));
        assert!(result.error_message().is_none());
    }

    #[tokio::test]
    async fn test_assigns_request_id() {
        let exec = executor("function handler(x, c) { return c.requestId; }", ResourceLimits::default());
        let result = exec.execute(InvocationRequest::new(json!(null))).await;
        assert!(uuid::Uuid::parse_str(&result.request_id).is_ok());
        assert_eq!(result.output(), Some(&json!(result.request_id)));
    }

    #[tokio::test]
    async fn test_error_result() {
        let exec = executor(
            "function handler(x, c) { throw new Error('nope'); }",
            ResourceLimits::default(),
        );
        let result = exec.execute(InvocationRequest::new(json!({}))).await;
        assert_eq!(result.status(), InvocationStatus::Error);
        assert_eq!(result.error_kind(), Some("Error"));
        assert_eq!(result.error_message(), Some("nope"));
        assert!(result.output().is_none());
    }

    #[tokio::test]
    async fn test_undefined_return_is_null_output() {
        let exec = executor("function handler(x, c) {}", ResourceLimits::default());
        let result = exec.execute(InvocationRequest::new(json!(1))).await;
        assert_eq!(result.output(), Some(&JsonValue::Null));
    }

    #[tokio::test]
    async fn test_context_carries_runtime_fields() {
        let exec = executor(
            "function handler(x, c) { return [c.functionPath, c.deadlineMs, c.tenant]; }",
            ResourceLimits::default().with_execution_timeout(Duration::from_secs(10)),
        );
        let mut request = InvocationRequest::new(json!(null));
        request.context.extra.insert("tenant".into(), json!("t1"));
        let result = exec.execute(request).await;
        assert_eq!(result.output(), Some(&json!(["test.js", 10_000, "t1"])));
    }

    #[tokio::test]
    async fn test_deadline_hint_shortens_budget() {
        let exec = executor(
            "function handler(x, c) { return c.deadlineMs; }",
            ResourceLimits::default().with_execution_timeout(Duration::from_secs(10)),
        );
        let result = exec
            .execute(InvocationRequest::new(json!(null)).with_deadline_ms(1500))
            .await;
        assert_eq!(result.output(), Some(&json!(1500)));

        // A hint larger than the configured limit is capped.
        let result = exec
            .execute(InvocationRequest::new(json!(null)).with_deadline_ms(60_000))
            .await;
        assert_eq!(result.output(), Some(&json!(10_000)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_result() {
        let exec = executor(
            "function handler(x, c) { var s = Date.now(); while (Date.now() - s < 3000) {} return 1; }",
            ResourceLimits::default().with_execution_timeout(Duration::from_millis(200)),
        );
        let start = Instant::now();
        let result = exec.execute(InvocationRequest::new(json!(null))).await;
        assert!(start.elapsed() < Duration::from_millis(1500));
        assert_eq!(result.status(), InvocationStatus::Timeout);
        assert_eq!(result.error_kind(), Some("Timeout"));
        assert!(result.error_message().unwrap().contains("200ms"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_handler_releases_its_slot() {
        let exec = executor(
            "function handler(x, c) { var s = Date.now(); while (Date.now() - s < 1000) {} return 1; }",
            ResourceLimits::default()
                .with_execution_timeout(Duration::from_millis(100))
                .with_max_concurrency(1),
        );
        let result = exec.execute(InvocationRequest::new(json!(null))).await;
        assert_eq!(result.status(), InvocationStatus::Timeout);
        assert_eq!(exec.available_slots(), 1);
        assert_eq!(exec.running_threads(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(exec.running_threads(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_hanging_handler_does_not_block_next_call() {
        let exec = executor(
            "function handler(x, c) { if (x.hang) { var s = Date.now(); while (Date.now() - s < 2000) {} } return 'done'; }",
            ResourceLimits::default()
                .with_execution_timeout(Duration::from_millis(300))
                .with_max_concurrency(1),
        );
        let hung = exec.execute(InvocationRequest::new(json!({"hang": true}))).await;
        assert_eq!(hung.status(), InvocationStatus::Timeout);

        let start = Instant::now();
        for _ in 0..3 {
            let result = exec.execute(InvocationRequest::new(json!({}))).await;
            assert_eq!(result.status(), InvocationStatus::Ok);
            assert_eq!(result.output(), Some(&json!("done")));
        }
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runaway_loop_is_stopped_by_engine_limit() {
        let exec = executor(
            "function handler(x, c) { if (x.hang) { while (true) {} } return 'done'; }",
            ResourceLimits::default()
                .with_execution_timeout(Duration::from_millis(200))
                .with_max_concurrency(1)
                .with_loop_iteration_limit(2_000_000),
        );
        let hung = exec.execute(InvocationRequest::new(json!({"hang": true}))).await;
        assert!(!hung.is_ok());

        let result = exec.execute(InvocationRequest::new(json!({}))).await;
        assert_eq!(result.output(), Some(&json!("done")));

        let deadline = Instant::now() + Duration::from_secs(20);
        while exec.running_threads() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(exec.running_threads(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_thread_cap_makes_calls_wait() {
        let exec = executor(
            "function handler(x, c) { if (x.hang) { var s = Date.now(); while (Date.now() - s < 1000) {} } return 'done'; }",
            ResourceLimits::default()
                .with_execution_timeout(Duration::from_millis(200))
                .with_max_concurrency(1)
                .with_max_abandoned_threads(0),
        );
        let hung = exec.execute(InvocationRequest::new(json!({"hang": true}))).await;
        assert_eq!(hung.status(), InvocationStatus::Timeout);

        // The only thread permit is still held by the abandoned call.
        let blocked = exec.execute(InvocationRequest::new(json!({}))).await;
        assert_eq!(blocked.status(), InvocationStatus::Timeout);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        let result = exec.execute(InvocationRequest::new(json!({}))).await;
        assert_eq!(result.output(), Some(&json!("done")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_invocations_are_isolated() {
        let exec = executor(
            "var calls = 0; function handler(x, c) { calls += 1; return { n: x, calls: calls }; }",
            ResourceLimits::default().with_max_concurrency(4),
        );
        let futures = (0..16).map(|i| {
            let exec = exec.clone();
            async move { exec.execute(InvocationRequest::new(json!(i))).await }
        });
        let results = futures::future::join_all(futures).await;
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.output(), Some(&json!({"n": i, "calls": 1})));
        }
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42)), "handler thread panicked");
    }
}
