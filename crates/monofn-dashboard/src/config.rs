//! Dashboard process configuration.

use std::net::SocketAddr;
use std::time::Duration;

use monofn_common::config::{self, Lookup};
use monofn_common::store::StoreConfig;
use monofn_common::ConfigError;

use crate::aggregator::{DEFAULT_HISTORY_LIMIT, DEFAULT_SEEN_CAPACITY};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8501";
pub const DEFAULT_KEY: &str = "monofn-output";
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
    /// Key the runtime writes results to
    pub key: String,
    /// Poll interval, also used as the page refresh period
    pub refresh: Duration,
    pub history_limit: usize,
    pub seen_capacity: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8501)),
            store: StoreConfig::default(),
            key: DEFAULT_KEY.to_string(),
            refresh: DEFAULT_REFRESH,
            history_limit: DEFAULT_HISTORY_LIMIT,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&config::process_env())
    }

    pub fn from_lookup(env: &impl Lookup) -> Result<Self, ConfigError> {
        let bind = config::string_or(env, "BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::invalid("BIND_ADDR", bind.clone(), e.to_string()))?;

        let config = Self {
            bind_addr,
            store: StoreConfig::from_env(env)?,
            key: config::string_or(env, "REDIS_KEY", DEFAULT_KEY),
            refresh: Duration::from_millis(config::parse_or(
                env,
                "REFRESH_MS",
                DEFAULT_REFRESH.as_millis() as u64,
            )?),
            history_limit: config::parse_or(env, "HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;

        if self.key.trim().is_empty() {
            return Err(ConfigError::invalid("REDIS_KEY", self.key.clone(), "must not be empty"));
        }
        if self.refresh.is_zero() {
            return Err(ConfigError::invalid("REFRESH_MS", "0", "must be greater than zero"));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::invalid("HISTORY_LIMIT", "0", "must be greater than zero"));
        }
        if self.seen_capacity < self.history_limit {
            return Err(ConfigError::invalid(
                "HISTORY_LIMIT",
                self.history_limit.to_string(),
                format!("must not exceed the dedup capacity of {}", self.seen_capacity),
            ));
        }
        Ok(())
    }
}
