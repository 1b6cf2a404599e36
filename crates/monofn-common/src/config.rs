//! Environment-style configuration readers.
//!
//! Both processes are configured through environment variables. The readers here
//! take a lookup function instead of touching the process environment directly so
//! configuration parsing can be tested without mutating global state.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::ConfigError;

/// A source of configuration values, usually the process environment.
pub trait Lookup {
    fn get(&self, name: &str) -> Option<String>;
}

impl<F> Lookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Reads from the real process environment.
pub fn process_env() -> impl Lookup {
    |name: &str| std::env::var(name).ok()
}

/// Returns the value of `name`, treating empty strings as unset.
pub fn optional(env: &impl Lookup, name: &str) -> Option<String> {
    env.get(name).filter(|v| !v.trim().is_empty())
}

/// Returns the value of `name` or `default`.
pub fn string_or(env: &impl Lookup, name: &str, default: &str) -> String {
    optional(env, name).unwrap_or_else(|| default.to_string())
}

/// Returns the value of `name` or fails with [`ConfigError::Missing`].
pub fn required(env: &impl Lookup, name: &'static str) -> Result<String, ConfigError> {
    optional(env, name).ok_or(ConfigError::Missing(name))
}

/// Parses `name` into `T`, falling back to `default` when unset.
pub fn parse_or<T>(env: &impl Lookup, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(env, name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(name, raw.clone(), e.to_string())),
        None => Ok(default),
    }
}

/// Layers explicit values, usually command-line flags, over another source.
///
/// Flags are mapped onto the variable names they stand for, so validation errors
/// name the same setting whichever way it was supplied.
pub struct Overrides<L> {
    base: L,
    values: HashMap<&'static str, String>,
}

impl<L: Lookup> Overrides<L> {
    pub fn new(base: L) -> Self {
        Self {
            base,
            values: HashMap::new(),
        }
    }

    /// Overrides `name` when `value` is present.
    pub fn set<V: ToString>(mut self, name: &'static str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.values.insert(name, value.to_string());
        }
        self
    }
}

impl<L: Lookup> Lookup for Overrides<L> {
    fn get(&self, name: &str) -> Option<String> {
        self.values
            .get(name)
            .cloned()
            .or_else(|| self.base.get(name))
    }
}
