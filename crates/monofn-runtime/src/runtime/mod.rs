pub mod context;
pub mod conversions;
pub mod executor;
pub mod loader;

#[cfg(test)]
mod tests;

pub use context::{HandlerContext, HandlerError};
pub use executor::Executor;
pub use loader::{HandlerBinding, LoadError, LoadErrorKind};
