//! monofn Common Types and Store Client
//!
//! This crate holds everything the runtime worker and the dashboard share:
//!
//! - **Invocation model**: [`InvocationRequest`], [`InvocationResult`] and the
//!   acknowledgment returned to callers
//! - **Protocol Layer**: JSON-RPC 2.0 request/response types used on the HTTP boundary
//! - **Transport Layer**: helpers converting JSON-RPC messages to HTTP responses
//! - **Result Store**: the [`store::ResultStore`] capability trait with a Redis (RESP2)
//!   implementation and an in-memory implementation
//! - **Configuration**: environment variable readers shared by both processes
//!
//! # Example
//!
//! ```
//! use monofn_common::{InvocationRequest, InvocationResult, Outcome};
//! use serde_json::json;
//!
//! let request = InvocationRequest::new(json!({"a": 2, "b": 3}));
//! let result = InvocationResult::new(
//!     "req-1",
//!     Outcome::Ok { output: json!(5) },
//!     chrono::Utc::now(),
//!     3,
//! );
//! assert!(result.is_ok());
//! assert!(request.context.request_id.is_none());
//! ```

pub mod config;
pub mod error;
pub mod invocation;
pub mod protocol;
pub mod store;
pub mod transport;

pub use error::{ConfigError, MonofnError, Result};
pub use invocation::{
    InvocationAck, InvocationRequest, InvocationResult, InvocationStatus, Outcome, RequestContext,
};
