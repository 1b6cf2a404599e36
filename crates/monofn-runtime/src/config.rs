//! Runtime process configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use monofn_common::config::{self, Lookup};
use monofn_common::store::{OutputMode, OutputTarget, StoreConfig};
use monofn_common::ConfigError;

use crate::resource_limits::{default_concurrency, ResourceLimits, DEFAULT_MAX_ABANDONED_THREADS};

pub const DEFAULT_SCRIPT_PATH: &str = "/opt/usermodule.js";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_INPUT_POLL: Duration = Duration::from_millis(5000);

/// Settings for the input watcher, present only when `REDIS_INPUT_KEY` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputWatchConfig {
    pub key: String,
    pub interval: Duration,
}

/// Everything the runtime process needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub script_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
    pub output: OutputTarget,
    pub input: Option<InputWatchConfig>,
    pub limits: ResourceLimits,
}

impl RuntimeConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&config::process_env())
    }

    pub fn from_lookup(env: &impl Lookup) -> Result<Self, ConfigError> {
        let bind = config::string_or(env, "BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::invalid("BIND_ADDR", bind.clone(), e.to_string()))?;

        let mode_raw = config::string_or(env, "REDIS_OUTPUT_MODE", "latest");
        let mode: OutputMode = mode_raw
            .parse()
            .map_err(|e: String| ConfigError::invalid("REDIS_OUTPUT_MODE", mode_raw.clone(), e))?;

        let output = OutputTarget {
            key: config::required(env, "REDIS_OUTPUT_KEY")?,
            mode,
            max_len: config::parse_or(env, "REDIS_OUTPUT_MAX_LEN", OutputTarget::DEFAULT_MAX_LEN)?,
        };

        let input = match config::optional(env, "REDIS_INPUT_KEY") {
            Some(key) => Some(InputWatchConfig {
                key,
                interval: Duration::from_millis(config::parse_or(
                    env,
                    "INPUT_POLL_MS",
                    DEFAULT_INPUT_POLL.as_millis() as u64,
                )?),
            }),
            None => None,
        };

        let limits = ResourceLimits::default()
            .with_execution_timeout(Duration::from_millis(config::parse_or(
                env,
                "EXECUTION_TIMEOUT_MS",
                30_000u64,
            )?))
            .with_max_concurrency(config::parse_or(env, "MAX_CONCURRENCY", default_concurrency())?)
            .with_max_abandoned_threads(config::parse_or(
                env,
                "MAX_ABANDONED_THREADS",
                DEFAULT_MAX_ABANDONED_THREADS,
            )?);

        let config = Self {
            script_path: PathBuf::from(config::string_or(env, "USER_MODULE_PATH", DEFAULT_SCRIPT_PATH)),
            bind_addr,
            store: StoreConfig::from_env(env)?,
            output,
            input,
            limits,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;

        if self.output.max_len == 0 {
            return Err(ConfigError::invalid("REDIS_OUTPUT_MAX_LEN", "0", "must be greater than zero"));
        }

        if let Some(input) = &self.input {
            if input.interval.is_zero() {
                return Err(ConfigError::invalid("INPUT_POLL_MS", "0", "must be greater than zero"));
            }
        }

        self.limits.validate().map_err(|reason| {
            let (name, value) = if self.limits.max_concurrency == 0 {
                ("MAX_CONCURRENCY", self.limits.max_concurrency.to_string())
            } else {
                (
                    "EXECUTION_TIMEOUT_MS",
                    self.limits.execution_timeout.as_millis().to_string(),
                )
            };
            ConfigError::invalid(name, value, reason)
        })
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
    fn test_output_key_is_required() {
        let err = RuntimeConfig::from_lookup(&env(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("REDIS_OUTPUT_KEY"));
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_lookup(&env(&[("REDIS_OUTPUT_KEY", "out")])).unwrap();
        assert_eq!(config.script_path, PathBuf::from("/opt/usermodule.js"));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.output, OutputTarget::latest("out"));
        assert_eq!(config.input, None);
        assert_eq!(config.limits.execution_timeout, Duration::from_secs(30));
        assert_eq!(config.store.addr(), "localhost:6379");
    }

    #[test]
    fn test_full_environment() {
        let config = RuntimeConfig::from_lookup(&env(&[
            ("REDIS_OUTPUT_KEY", "results"),
            ("REDIS_OUTPUT_MODE", "list"),
            ("REDIS_OUTPUT_MAX_LEN", "50"),
            ("REDIS_INPUT_KEY", "metrics"),
            ("INPUT_POLL_MS", "250"),
            ("EXECUTION_TIMEOUT_MS", "1500"),
            ("MAX_CONCURRENCY", "3"),
            ("MAX_ABANDONED_THREADS", "8"),
            ("USER_MODULE_PATH", "/tmp/fn.js"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();
        assert_eq!(config.output, OutputTarget::list("results", 50));
        assert_eq!(
            config.input,
            Some(InputWatchConfig {
                key: "metrics".into(),
                interval: Duration::from_millis(250),
            })
        );
        assert_eq!(config.limits.execution_timeout, Duration::from_millis(1500));
        assert_eq!(config.limits.max_concurrency, 3);
        assert_eq!(config.limits.max_abandoned_threads, 8);
        assert_eq!(config.script_path, PathBuf::from("/tmp/fn.js"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = RuntimeConfig::from_lookup(&env(&[
            ("REDIS_OUTPUT_KEY", "out"),
            ("EXECUTION_TIMEOUT_MS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("EXECUTION_TIMEOUT_MS"));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = RuntimeConfig::from_lookup(&env(&[
            ("REDIS_OUTPUT_KEY", "out"),
            ("REDIS_OUTPUT_MODE", "stream"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("REDIS_OUTPUT_MODE"));
    }

    #[test]
    fn test_bad_bind_addr_is_rejected() {
        let err = RuntimeConfig::from_lookup(&env(&[
            ("REDIS_OUTPUT_KEY", "out"),
            ("BIND_ADDR", "not an address"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BIND_ADDR"));
    }
}
