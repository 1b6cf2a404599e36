//! Minimal JSON-RPC client for the runtime's `invoke` method.

use anyhow::{anyhow, Context, Result};
use monofn_common::protocol::{JsonRpcRequest, JsonRpcResponse};
use monofn_common::InvocationAck;
use serde_json::{json, Value};

pub struct RuntimeClient {
    url: String,
    http: reqwest::Client,
}

impl RuntimeClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Calls `method` and returns the raw JSON-RPC response.
    pub async fn call(&self, method: &str, params: Value) -> Result<JsonRpcResponse> {
        let request = JsonRpcRequest::new(method, params, json!(uuid::Uuid::new_v4().to_string()));
        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach runtime at {}", self.url))?;

        response
            .json::<JsonRpcResponse>()
            .await
            .context("Runtime returned a non JSON-RPC response")
    }

    /// Invokes the handler once and returns its acknowledgment.
    ///
    /// A store failure still produced a result; its acknowledgment travels in the
    /// error's `data` and is returned here with `stored = false`.
    pub async fn invoke(&self, input: Value, context: Value) -> Result<InvocationAck> {
        let response = self
            .call("invoke", json!({ "input": input, "context": context }))
            .await?;

        if let Some(result) = response.result {
            return serde_json::from_value(result).context("Malformed invocation acknowledgment");
        }

        match response.error {
            Some(error) => match error.data.map(serde_json::from_value::<InvocationAck>) {
                Some(Ok(ack)) => Ok(ack),
                _ => Err(anyhow!("RPC error {}: {}", error.code, error.message)),
            },
            None => Err(anyhow!("Response carried neither a result nor an error")),
        }
    }
}
