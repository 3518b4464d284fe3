//! Reference driver configuration.

use std::time::Duration;

/// Configuration for a [`MemoryClient`](super::MemoryClient).
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Whether writes to a missing collection create it.
    pub auto_create_collections: bool,

    /// Artificial delay applied to every `start_session` call.
    ///
    /// Widens race windows in concurrency tests.
    pub session_start_latency: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            auto_create_collections: true,
            session_start_latency: Duration::ZERO,
        }
    }
}

impl MemoryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether writes create missing collections.
    #[must_use]
    pub const fn auto_create_collections(mut self, value: bool) -> Self {
        self.auto_create_collections = value;
        self
    }

    /// Sets the artificial session start delay.
    #[must_use]
    pub const fn session_start_latency(mut self, latency: Duration) -> Self {
        self.session_start_latency = latency;
        self
    }
}
