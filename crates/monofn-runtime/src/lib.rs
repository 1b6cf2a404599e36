//! monofn Runtime
//!
//! The runtime worker loads one user-supplied JavaScript module exposing
//! `handler(input, context)`, executes it for every incoming invocation and
//! publishes each result to the result store.
//!
//! - [`runtime::HandlerBinding`] loads and validates the module once at startup
//! - [`runtime::Executor`] runs one invocation in a fresh engine context with a
//!   timeout and a concurrency bound
//! - [`Worker`] writes results to the store and keeps metrics
//! - [`RuntimeServer`] exposes the worker over JSON-RPC/HTTP
//! - [`InputWatcher`] optionally drives the worker from a store key

pub mod config;
pub mod http_router;
pub mod http_server;
pub mod input_watcher;
pub mod metrics;
pub mod resource_limits;
pub mod runtime;
pub mod worker;

pub use config::RuntimeConfig;
pub use http_server::RuntimeServer;
pub use input_watcher::InputWatcher;
pub use resource_limits::ResourceLimits;
pub use runtime::{Executor, HandlerBinding, LoadError};
pub use worker::Worker;
