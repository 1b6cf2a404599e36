//! Resource limits for handler execution.
//!
//! The executor enforces a wall-clock timeout and a concurrency bound. The engine
//! itself is configured with a loop-iteration limit and a recursion limit so a
//! runaway handler whose thread was abandoned by the timeout eventually stops.
//! Until it does, the abandoned thread counts against `max_abandoned_threads`.

use std::time::Duration;

/// Default loop-iteration limit applied to every engine context
pub const DEFAULT_LOOP_ITERATION_LIMIT: u64 = 1_000_000_000;

/// Default recursion limit applied to every engine context
pub const DEFAULT_RECURSION_LIMIT: usize = 512;

/// Lower bound on the default concurrency, so one slow call on a small host
/// does not hold up every other invocation
pub const MIN_DEFAULT_CONCURRENCY: usize = 4;

/// Default number of timed-out handler threads allowed to keep running
pub const DEFAULT_MAX_ABANDONED_THREADS: usize = 64;

/// Resource limits for handler execution.
///
/// # Fields
///
/// - `execution_timeout` - Maximum wall-clock time for one invocation (default: 30 seconds)
/// - `max_concurrency` - Maximum number of handler calls running at once (default: CPU count, at least 4)
/// - `loop_iteration_limit` - Engine loop-iteration limit per context
/// - `recursion_limit` - Engine recursion limit per context
/// - `max_abandoned_threads` - Timed-out handler threads allowed to run on (default: 64)
///
/// # Memory Limiting
///
/// Memory limiting is not supported by the Boa engine. Only time and
/// iteration/recursion limits are enforced.
///
/// # Example
///
/// ```
/// use monofn_runtime::ResourceLimits;
/// use std::time::Duration;
///
/// let limits = ResourceLimits::new()
///     .with_execution_timeout(Duration::from_secs(5))
///     .with_max_concurrency(2);
/// assert!(limits.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    /// Maximum time allowed for one invocation, including the wait for a slot
    pub execution_timeout: Duration,
    /// Maximum number of concurrently running handler calls
    pub max_concurrency: usize,
    /// Loop iterations allowed per context before the engine raises an error
    pub loop_iteration_limit: u64,
    /// Call depth allowed per context before the engine raises an error
    pub recursion_limit: usize,
    /// Handler threads that may still be running after their invocation timed
    /// out. Once reached, new invocations wait for one of them to finish.
    pub max_abandoned_threads: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30),
            max_concurrency: default_concurrency(),
            loop_iteration_limit: DEFAULT_LOOP_ITERATION_LIMIT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_abandoned_threads: DEFAULT_MAX_ABANDONED_THREADS,
        }
    }
}

/// Number of CPUs visible to the process, but never less than
/// [`MIN_DEFAULT_CONCURRENCY`].
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_DEFAULT_CONCURRENCY)
        .max(MIN_DEFAULT_CONCURRENCY)
}

impl ResourceLimits {
    /// Creates a new ResourceLimits with default values.
    ///
    /// ```
    /// use monofn_runtime::ResourceLimits;
    ///
    /// let limits = ResourceLimits::new();
    /// assert_eq!(limits.execution_timeout.as_secs(), 30);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum execution timeout.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Sets the maximum number of concurrent handler calls.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = limit;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_max_abandoned_threads(mut self, max: usize) -> Self {
        self.max_abandoned_threads = max;
        self
    }

    /// Validates the resource limits configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Execution timeout is zero
    /// - Execution timeout is excessively long (> 1 hour)
    /// - Concurrency, loop or recursion limit is zero
    pub fn validate(&self) -> Result<(), String> {
        if self.execution_timeout.is_zero() {
            return Err("execution timeout must be greater than zero".to_string());
        }

        if self.execution_timeout > Duration::from_secs(3600) {
            return Err(format!(
                "execution timeout must be <= 1 hour (got {} seconds)",
                self.execution_timeout.as_secs()
            ));
        }

        if self.max_concurrency == 0 {
            return Err("max concurrency must be greater than zero".to_string());
        }

        if self.loop_iteration_limit == 0 || self.recursion_limit == 0 {
            return Err("engine loop and recursion limits must be greater than zero".to_string());
        }

        Ok(())
    }
}
