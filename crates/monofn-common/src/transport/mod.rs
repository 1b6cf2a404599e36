//! HTTP transport helpers shared by the runtime and the dashboard.

pub mod http;

pub use http::{HttpTransport, HyperResponse};
