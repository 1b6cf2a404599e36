use thiserror::Error;

use crate::store::StoreError;

/// Umbrella error for the monofn crates.
///
/// Per-invocation handler failures are never represented here: they are captured
/// into the [`InvocationResult`](crate::InvocationResult) itself. This type covers
/// the boundaries around the executor (transport, configuration, store).
#[derive(Error, Debug)]
pub enum MonofnError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Handler load error: {0}")]
    Load(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::net::AddrParseError> for MonofnError {
    fn from(err: std::net::AddrParseError) -> Self {
        MonofnError::InvalidRequest(err.to_string())
    }
}

/// Startup configuration problems. Each variant names the offending setting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(name: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MonofnError>;
