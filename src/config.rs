//! Bridge configuration.

use crate::error::{Error, Result};
use std::time::Duration;

/// Environment variable overriding [`BridgeConfig::call_timeout`].
pub const CALL_TIMEOUT_ENV: &str = "PSKIT_CALL_TIMEOUT_MS";

/// Default per-call timeout (two minutes).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Default name of the execution context's thread.
pub const DEFAULT_WORKER_NAME: &str = "pskit-context";

/// Settings shared by the broker and its execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// How long a caller waits for one response.
    pub call_timeout: Duration,
    /// Thread name of the execution context.
    pub worker_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `PSKIT_CALL_TIMEOUT_MS` is set but is not
    /// a positive integer.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Same as [`BridgeConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::default();
        match lookup(CALL_TIMEOUT_ENV) {
            Some(value) => Ok(config.with_call_timeout(parse_timeout_ms(&value)?)),
            None => Ok(config),
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the worker thread name.
    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}

/// Parses a timeout given in milliseconds.
///
/// # Errors
///
/// Returns [`Error::Config`] for zero, negative or non-numeric values.
pub fn parse_timeout_ms(value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(Error::Config {
            message: format!("{CALL_TIMEOUT_ENV} must be a positive integer, got {value:?}"),
        }),
    }
}
