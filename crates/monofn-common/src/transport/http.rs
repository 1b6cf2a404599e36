//! HTTP Transport Utilities
//!
//! Conversions between HTTP bodies and JSON-RPC messages. Handlers built on axum
//! return [`HyperResponse`] values directly since `Response<Full<Bytes>>` is a
//! valid axum response.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};

use serde_json::Value;

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Type alias for responses with a fully buffered body
pub type HyperResponse = Response<Full<Bytes>>;

/// HTTP transport utility functions
pub struct HttpTransport;

impl HttpTransport {
    /// Parse a JSON-RPC request from an HTTP body
    ///
    /// On failure the ready-to-send error response is returned: `-32700` when
    /// the body is not JSON, `-32600` when it is JSON but not a request.
    ///
    /// ```
    /// use monofn_common::transport::HttpTransport;
    /// use hyper::body::Bytes;
    ///
    /// let body = Bytes::from(r#"{"jsonrpc":"2.0","method":"invoke","params":{},"id":1}"#);
    /// let request = HttpTransport::parse_jsonrpc(body).unwrap();
    /// assert_eq!(request.method, "invoke");
    /// ```
    pub fn parse_jsonrpc(body: Bytes) -> Result<JsonRpcRequest, JsonRpcResponse> {
        let value: Value = serde_json::from_slice(&body)
            .map_err(|_| JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error()))?;
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|_| JsonRpcResponse::error(id, JsonRpcError::invalid_request()))
    }

    /// Create a `200 OK` JSON response from a JSON-RPC response
    pub fn to_http_response(jsonrpc: JsonRpcResponse) -> HyperResponse {
        Self::to_http_response_with_status(jsonrpc, StatusCode::OK)
    }

    /// Create a JSON-RPC error response
    pub fn to_http_error(id: serde_json::Value, error: JsonRpcError) -> HyperResponse {
        Self::to_http_response(JsonRpcResponse::error(id, error))
    }

    /// Create a JSON response with a custom status code
    pub fn to_http_response_with_status(jsonrpc: JsonRpcResponse, status: StatusCode) -> HyperResponse {
        Self::json(&jsonrpc, status)
    }

    /// Serialize any value as a JSON response body
    pub fn json<T: serde::Serialize>(value: &T, status: StatusCode) -> HyperResponse {
        let body = serde_json::to_vec(value).unwrap_or_default();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
