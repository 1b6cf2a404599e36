//! JSON-RPC router for the runtime.
//!
//! - `invoke`: executes the handler; params are `{"input": ..., "context": {...}}`
//! - `_metrics`: runtime metrics snapshot
//! - `_info`: server and handler information
//!
//! Anything else is `-32601`. Invocations run detached from the request, so a
//! client that hangs up early does not lose the stored result. The invoke acknowledgment is the result unless the
//! store write failed, in which case it travels in `error.data` of a `-32000`
//! error so callers cannot mistake an unrecorded invocation for a recorded one.

use std::sync::Arc;

use monofn_common::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use monofn_common::InvocationRequest;
use serde_json::Value;
use tracing::error;

use crate::worker::Worker;

pub struct RuntimeRouter {
    worker: Arc<Worker>,
}

impl RuntimeRouter {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker }
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    /// Handles a JSON-RPC request. Always produces a response.
    pub async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let id = req.id.clone();

        if req.jsonrpc != "2.0" {
            return JsonRpcResponse::error(id, JsonRpcError::invalid_request());
        }

        match req.method.as_str() {
            "invoke" => self.invoke(id, req.params).await,
            "_metrics" => to_response(id, &self.worker.metrics()),
            "_info" => to_response(id, &self.worker.info()),
            _ => JsonRpcResponse::error(id, JsonRpcError::method_not_found()),
        }
    }

    async fn invoke(&self, id: Value, params: Value) -> JsonRpcResponse {
        if !params.is_object() {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_params("params must be an object with an 'input' field"),
            );
        }

        let request: InvocationRequest = match serde_json::from_value(params) {
            Ok(request) => request,
            Err(e) => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e.to_string()))
            }
        };

        let ack = match self.worker.invoke_detached(request).await {
            Ok(ack) => ack,
            Err(e) => {
                error!("Invocation task failed: {}", e);
                return JsonRpcResponse::error(id, JsonRpcError::internal_error(&e.to_string()));
            }
        };
        let ack_json = match serde_json::to_value(&ack) {
            Ok(v) => v,
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::internal_error(&e.to_string())),
        };

        match &ack.store_error {
            None => JsonRpcResponse::success(id, ack_json),
            Some(reason) => JsonRpcResponse::error(
                id,
                JsonRpcError::store_write_failed(&format!("result not stored: {}", reason))
                    .with_data(ack_json),
            ),
        }
    }
}

fn to_response<T: serde::Serialize>(id: Value, value: &T) -> JsonRpcResponse {
    match serde_json::to_value(value) {
        Ok(v) => JsonRpcResponse::success(id, v),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(&e.to_string())),
    }
}
