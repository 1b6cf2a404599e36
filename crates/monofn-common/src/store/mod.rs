//! Result Store client.
//!
//! The runtime writes one [`InvocationResult`](crate::InvocationResult) record per
//! invocation and the dashboard polls the same key. Both talk to the store through
//! the [`ResultStore`] capability trait so the poller and the worker can be tested
//! against [`MemoryStore`] while production uses [`RedisStore`].
//!
//! The client never retries. A failed operation is reported to the caller, who
//! decides whether to skip (poller) or surface it (invoke acknowledgment).

pub mod memory;
pub mod redis;
pub mod resp;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{self, Lookup};
use crate::error::ConfigError;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Default connect and I/O timeout for one store operation
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// A value read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValue {
    /// A plain string key (`SET` / `GET`)
    Single(String),
    /// A list key (`RPUSH` / `LRANGE`), oldest element first
    List(Vec<String>),
}

/// Errors raised by store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot connect to store at {addr}: {reason}")]
    Connection { addr: String, reason: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store protocol error: {0}")]
    Protocol(String),

    #[error("store replied with error: {0}")]
    Server(String),

    #[error("key '{key}' holds a {found}, expected a string or list")]
    UnexpectedType { key: String, found: String },

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Capability interface over the key-value store.
///
/// Implementations must be usable concurrently from many tasks; callers hold them
/// as `Arc<dyn ResultStore>`.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Replaces the value at `key`.
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Appends `value` to the list at `key`, keeping at most the newest `max_len` elements.
    async fn append(&self, key: &str, value: &str, max_len: usize) -> Result<(), StoreError>;

    /// Reads `key`. Returns `Ok(None)` when the key does not exist.
    async fn read(&self, key: &str) -> Result<Option<StoreValue>, StoreError>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// How the runtime writes results to its output key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Each result replaces the previous one (`SET`).
    #[default]
    Latest,
    /// Results are appended to a capped list (`RPUSH` + `LTRIM`).
    List,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latest" => Ok(OutputMode::Latest),
            "list" => Ok(OutputMode::List),
            other => Err(format!("unknown output mode '{}', expected 'latest' or 'list'", other)),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Latest => f.write_str("latest"),
            OutputMode::List => f.write_str("list"),
        }
    }
}

/// Where and how results are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub key: String,
    pub mode: OutputMode,
    pub max_len: usize,
}

impl OutputTarget {
    pub const DEFAULT_MAX_LEN: usize = 1000;

    pub fn latest(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            mode: OutputMode::Latest,
            max_len: Self::DEFAULT_MAX_LEN,
        }
    }

    pub fn list(key: impl Into<String>, max_len: usize) -> Self {
        Self {
            key: key.into(),
            mode: OutputMode::List,
            max_len,
        }
    }

    /// Writes `value` according to the target's mode.
    pub async fn store(&self, store: &dyn ResultStore, value: &str) -> Result<(), StoreError> {
        match self.mode {
            OutputMode::Latest => store.write(&self.key, value).await,
            OutputMode::List => store.append(&self.key, value, self.max_len).await,
        }
    }
}

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub db: u32,
    /// Bound on connecting plus one full request/response exchange
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6379,
            db: 0,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Reads `REDIS_HOST`, `REDIS_PORT` and `REDIS_DB`.
    pub fn from_env(env: &impl Lookup) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            host: config::string_or(env, "REDIS_HOST", &defaults.host),
            port: config::parse_or(env, "REDIS_PORT", defaults.port)?,
            db: config::parse_or(env, "REDIS_DB", defaults.db)?,
            timeout: defaults.timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::invalid("REDIS_PORT", "0", "port must be non-zero"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid(
                "store timeout",
                format!("{:?}", self.timeout),
                "timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// `host:port`, as passed to the TCP connector.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Lookup {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::from_env(&env(&[])).unwrap();
        assert_eq!(config.addr(), "localhost:6379");
        assert_eq!(config.db, 0);
    }

    #[test]
    fn test_store_config_from_env() {
        let config = StoreConfig::from_env(&env(&[
            ("REDIS_HOST", "redis.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_DB", "2"),
        ]))
        .unwrap();
        assert_eq!(config.addr(), "redis.internal:6380");
        assert_eq!(config.db, 2);
    }

    #[test]
    fn test_store_config_rejects_bad_port() {
        let err = StoreConfig::from_env(&env(&[("REDIS_PORT", "70000")])).unwrap_err();
        assert!(err.to_string().contains("REDIS_PORT"));
        let err = StoreConfig::from_env(&env(&[("REDIS_PORT", "0")])).unwrap_err();
        assert!(err.to_string().contains("REDIS_PORT"));
    }

    #[test]
    fn test_output_mode_parse() {
        assert_eq!("latest".parse::<OutputMode>(), Ok(OutputMode::Latest));
        assert_eq!("LIST".parse::<OutputMode>(), Ok(OutputMode::List));
        assert!("stream".parse::<OutputMode>().is_err());
    }

    #[tokio::test]
    async fn test_output_target_list_mode_appends() {
        let store = MemoryStore::new();
        let target = OutputTarget::list("out", 2);
        for v in ["1", "2", "3"] {
            target.store(&store, v).await.unwrap();
        }
        assert_eq!(
            store.read("out").await.unwrap(),
            Some(StoreValue::List(vec!["2".into(), "3".into()]))
        );
    }

    #[tokio::test]
    async fn test_output_target_latest_mode_replaces() {
        let store = MemoryStore::new();
        let target = OutputTarget::latest("out");
        target.store(&store, "a").await.unwrap();
        target.store(&store, "b").await.unwrap();
        assert_eq!(
            store.read("out").await.unwrap(),
            Some(StoreValue::Single("b".into()))
        );
    }
}
