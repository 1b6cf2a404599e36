//! User module loading and validation.
//!
//! The handler script is read once at startup, evaluated in a throwaway context to
//! prove it defines a two-parameter `handler`, and then cached. Invocations build
//! their own contexts from the cached source; the file is never re-read.
//!
//! Boa's parsed code is tied to the context that produced it, so the source text
//! is what gets cached, not bytecode.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::info;

use crate::resource_limits::ResourceLimits;
use crate::runtime::context::{HandlerContext, PrepareError, HANDLER_NAME};

/// Number of parameters `handler(input, context)` must declare.
pub const REQUIRED_ARITY: usize = 2;

/// Why a user module was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("user module not found at {path}: {reason}")]
    NotFound { path: PathBuf, reason: String },

    #[error("user module {name} failed to evaluate: {message}")]
    SyntaxError { name: String, message: String },

    #[error("user module {name} does not define a callable '{handler}': {reason}")]
    MissingHandler {
        name: String,
        handler: &'static str,
        reason: String,
    },

    #[error("'{handler}' in {name} must take exactly 2 parameters (input, context), found {found}")]
    WrongArity {
        name: String,
        handler: &'static str,
        found: usize,
    },
}

/// Coarse classification of [`LoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    NotFound,
    SyntaxError,
    MissingHandler,
    WrongArity,
}

impl LoadError {
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            LoadError::NotFound { .. } => LoadErrorKind::NotFound,
            LoadError::SyntaxError { .. } => LoadErrorKind::SyntaxError,
            LoadError::MissingHandler { .. } => LoadErrorKind::MissingHandler,
            LoadError::WrongArity { .. } => LoadErrorKind::WrongArity,
        }
    }
}

/// The loaded, validated handler. Immutable once created.
#[derive(Debug, Clone)]
pub struct HandlerBinding {
    path: PathBuf,
    source: Arc<str>,
    modified_at: Option<SystemTime>,
    arity: usize,
}

impl HandlerBinding {
    /// Loads and validates the user module at `path`. Top-level code runs under
    /// `limits`, the same engine limits every invocation gets.
    pub fn load(path: impl AsRef<Path>, limits: &ResourceLimits) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let not_found = |e: std::io::Error| LoadError::NotFound {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let source = std::fs::read_to_string(path).map_err(not_found)?;
        let modified_at = std::fs::metadata(path).and_then(|m| m.modified()).ok();

        let mut binding = Self::from_source(path.display().to_string(), source, limits)?;
        binding.path = path.to_path_buf();
        binding.modified_at = modified_at;

        info!(
            path = %binding.path.display(),
            arity = binding.arity,
            "User module loaded"
        );
        Ok(binding)
    }

    /// Validates a handler given as source text. `name` is used in messages and
    /// as the binding's path.
    pub fn from_source(
        name: impl Into<String>,
        source: impl Into<String>,
        limits: &ResourceLimits,
    ) -> Result<Self, LoadError> {
        let name = name.into();
        let source: Arc<str> = Arc::from(source.into());

        let mut ctx = HandlerContext::new(&source, limits).map_err(|e| match e {
            PrepareError::Evaluation(message) => LoadError::SyntaxError {
                name: name.clone(),
                message,
            },
            PrepareError::MissingHandler(reason) => LoadError::MissingHandler {
                name: name.clone(),
                handler: HANDLER_NAME,
                reason,
            },
        })?;

        let arity = ctx.arity();
        if arity != REQUIRED_ARITY {
            return Err(LoadError::WrongArity {
                name,
                handler: HANDLER_NAME,
                found: arity,
            });
        }

        Ok(Self {
            path: PathBuf::from(name),
            source,
            modified_at: None,
            arity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached script source, shared with every invocation.
    pub fn source(&self) -> Arc<str> {
        self.source.clone()
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Modification time of the script file in epoch milliseconds.
    pub fn modified_at_ms(&self) -> Option<u64> {
        self.modified_at
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn limits() -> ResourceLimits {
        ResourceLimits::default()
    }

    fn create_test_script(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_module() {
        let script = create_test_script("function handler(input, context) { return input; }");
        let binding = HandlerBinding::load(script.path(), &limits()).unwrap();
        assert_eq!(binding.arity(), 2);
        assert_eq!(binding.path(), script.path());
        assert!(binding.modified_at_ms().is_some());
        assert!(binding.source().contains("function handler"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = HandlerBinding::load("/nonexistent/usermodule.js", &limits()).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::NotFound);
        assert!(err.to_string().contains("/nonexistent/usermodule.js"));
    }

    #[test]
    fn test_load_syntax_error() {
        let script = create_test_script("function handler(input, context) { return ; ) }");
        let err = HandlerBinding::load(script.path(), &limits()).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::SyntaxError);
    }

    #[test]
    fn test_load_top_level_throw_is_rejected() {
        let err = HandlerBinding::from_source("m.js", "throw new Error('boom');", &limits()).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::SyntaxError);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_load_missing_handler() {
        let err = HandlerBinding::from_source("m.js", "function other(a, b) {}", &limits()).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::MissingHandler);
    }

    #[test]
    fn test_load_wrong_arity() {
        let err = HandlerBinding::from_source("m.js", "function handler(input) {}", &limits()).unwrap_err();
        assert_eq!(err, LoadError::WrongArity {
            name: "m.js".into(),
            handler: HANDLER_NAME,
            found: 1,
        });

        let err = HandlerBinding::from_source("m.js", "function handler(a, b, c) {}", &limits()).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::WrongArity);
    }

    #[test]
    fn test_load_runs_top_level_code_under_configured_limits() {
        let src = "var n = 0; while (n < 100000) { n++; } function handler(x, c) { return n; }";
        assert!(HandlerBinding::from_source("m.js", src, &limits()).is_ok());

        let tight = limits().with_loop_iteration_limit(1_000);
        let err = HandlerBinding::from_source("m.js", src, &tight).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::SyntaxError);

        let script = create_test_script(
            "function f(n) { return n === 0 ? 0 : f(n - 1); } f(200); function handler(x, c) {}",
        );
        assert!(HandlerBinding::load(script.path(), &limits()).is_ok());
        let err = HandlerBinding::load(script.path(), &limits().with_recursion_limit(50)).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::SyntaxError);
    }

    #[test]
    fn test_from_source_has_no_mtime() {
        let binding = HandlerBinding::from_source("inline", "var handler = (x, c) => x;", &limits()).unwrap();
        assert_eq!(binding.modified_at_ms(), None);
        assert_eq!(binding.path(), Path::new("inline"));
    }
}
