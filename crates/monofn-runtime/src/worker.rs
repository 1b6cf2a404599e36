//! Runtime worker: executes invocations and publishes their results.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use monofn_common::store::{OutputTarget, ResultStore};
use monofn_common::{InvocationAck, InvocationRequest, InvocationResult};
use serde_json::json;
use tokio::task::JoinError;
use tracing::{debug, error};

use crate::metrics::{MetricsSnapshot, RuntimeInfo, RuntimeMetrics, ServerInfo, ServerType};
use crate::runtime::Executor;

/// The runtime worker.
///
/// Owns the executor, the store handle and the metrics. One worker is shared by
/// the HTTP router and the input watcher; every invocation, whatever its source,
/// goes through [`Worker::invoke`].
pub struct Worker {
    executor: Executor,
    store: Arc<dyn ResultStore>,
    target: OutputTarget,
    metrics: Arc<RuntimeMetrics>,
    /// Epoch ms of the last completed invocation, 0 if none
    last_execution_ms: AtomicU64,
}

impl Worker {
    pub fn new(executor: Executor, store: Arc<dyn ResultStore>, target: OutputTarget) -> Self {
        Self {
            executor,
            store,
            target,
            metrics: Arc::new(RuntimeMetrics::new()),
            last_execution_ms: AtomicU64::new(0),
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    pub fn store(&self) -> Arc<dyn ResultStore> {
        self.store.clone()
    }

    /// Epoch ms of the last completed invocation.
    pub fn last_execution_ms(&self) -> Option<u64> {
        match self.last_execution_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Executes `request`, writes the result to the store and acknowledges.
    ///
    /// Handler failures are reported in `result`; store failures in `stored` and
    /// `store_error`. Neither is retried.
    pub async fn invoke(&self, mut request: InvocationRequest) -> InvocationAck {
        let request_id = request.ensure_request_id().to_string();
        request
            .context
            .extra
            .insert("outputKey".into(), json!(self.target.key));
        request
            .context
            .extra
            .insert("lastExecution".into(), json!(self.last_execution_ms()));

        self.metrics.begin();
        let result = self.executor.execute(request).await;
        self.last_execution_ms
            .store(Utc::now().timestamp_millis().max(1) as u64, Ordering::Relaxed);

        if !result.is_ok() {
            error!(
                %request_id,
                status = %result.status(),
                kind = result.error_kind().unwrap_or_default(),
                message = result.error_message().unwrap_or_default(),
                "Handler invocation failed"
            );
        }

        let store_error = self.publish(&result).await.err();
        let stored = store_error.is_none();
        self.metrics.finish(result.status(), result.duration_ms, stored);

        debug!(%request_id, status = %result.status(), stored, duration_ms = result.duration_ms, "Invocation complete");

        InvocationAck {
            request_id,
            stored,
            store_error,
            result,
        }
    }

    /// Runs [`Worker::invoke`] on its own task. The invocation finishes, and its
    /// result is published, even if the caller stops awaiting this future.
    pub async fn invoke_detached(
        self: &Arc<Self>,
        request: InvocationRequest,
    ) -> Result<InvocationAck, JoinError> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.invoke(request).await }).await
    }

    async fn publish(&self, result: &InvocationResult) -> Result<(), String> {
        let payload = serde_json::to_string(result).map_err(|e| {
            error!(request_id = %result.request_id, "Failed to serialize result: {}", e);
            e.to_string()
        })?;

        self.target
            .store(self.store.as_ref(), &payload)
            .await
            .map_err(|e| {
                error!(
                    request_id = %result.request_id,
                    key = %self.target.key,
                    "Failed to write result to store: {}", e
                );
                e.to_string()
            })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn info(&self) -> RuntimeInfo {
        let binding = self.executor.binding();
        RuntimeInfo {
            server: ServerInfo::new(ServerType::Runtime, self.metrics.uptime_ms()),
            function_path: binding.path().display().to_string(),
            arity: binding.arity(),
            output_key: self.target.key.clone(),
            output_mode: self.target.mode.to_string(),
        }
    }
}
