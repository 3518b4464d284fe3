//! Scope and session configuration.

use ambientdb_driver::{SessionOptions, TransactionOptions};
use std::time::Duration;

/// Configuration shared by every scope opened from a root [`Ambient`](crate::Ambient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Timeout for scopes that do not set one.
    pub default_scope_timeout: Duration,

    /// Upper bound for any scope timeout.
    pub max_scope_timeout: Duration,

    /// Options for sessions created by the registry.
    pub session_options: SessionOptions,

    /// Transaction options for scopes that do not set their own.
    pub transaction_options: TransactionOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_scope_timeout: Duration::from_secs(60),
            max_scope_timeout: Duration::from_secs(600),
            session_options: SessionOptions::default(),
            transaction_options: TransactionOptions::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default scope timeout.
    #[must_use]
    pub const fn default_scope_timeout(mut self, timeout: Duration) -> Self {
        self.default_scope_timeout = timeout;
        self
    }

    /// Sets the maximum scope timeout.
    #[must_use]
    pub const fn max_scope_timeout(mut self, timeout: Duration) -> Self {
        self.max_scope_timeout = timeout;
        self
    }

    /// Sets the session options.
    #[must_use]
    pub fn session_options(mut self, options: SessionOptions) -> Self {
        self.session_options = options;
        self
    }

    /// Sets the default transaction options.
    #[must_use]
    pub fn transaction_options(mut self, options: TransactionOptions) -> Self {
        self.transaction_options = options;
        self
    }

    /// Resolves a requested scope timeout against the defaults and the maximum.
    #[must_use]
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_scope_timeout)
            .min(self.max_scope_timeout)
    }
}
