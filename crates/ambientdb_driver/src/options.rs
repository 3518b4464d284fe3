//! Session and transaction options.

use std::time::Duration;

/// Read concern for reads inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadConcern {
    /// Return the node's most recent data.
    Local,
    /// Return data acknowledged by a majority.
    Majority,
    /// Read from a point-in-time snapshot.
    Snapshot,
}

/// Write acknowledgment requested on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteConcern {
    /// Acknowledged by the primary only.
    Acknowledged,
    /// Acknowledged by a majority.
    Majority,
    /// Acknowledged by the given number of nodes.
    Nodes(u32),
}

/// Options applied when a transaction is started on a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Read concern for the transaction.
    pub read_concern: Option<ReadConcern>,
    /// Write concern for the commit.
    pub write_concern: Option<WriteConcern>,
    /// Upper bound on the time spent committing.
    pub max_commit_time: Option<Duration>,
}

impl TransactionOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the read concern.
    #[must_use]
    pub fn read_concern(mut self, concern: ReadConcern) -> Self {
        self.read_concern = Some(concern);
        self
    }

    /// Sets the write concern.
    #[must_use]
    pub fn write_concern(mut self, concern: WriteConcern) -> Self {
        self.write_concern = Some(concern);
        self
    }

    /// Sets the maximum commit time.
    #[must_use]
    pub fn max_commit_time(mut self, limit: Duration) -> Self {
        self.max_commit_time = Some(limit);
        self
    }

    /// Fills unset fields from `defaults`.
    #[must_use]
    pub fn or(self, defaults: &TransactionOptions) -> Self {
        Self {
            read_concern: self.read_concern.or(defaults.read_concern),
            write_concern: self.write_concern.or(defaults.write_concern),
            max_commit_time: self.max_commit_time.or(defaults.max_commit_time),
        }
    }
}

/// Options applied when a session is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Whether reads in the session are causally consistent with its writes.
    pub causal_consistency: bool,
    /// Defaults for transactions started on the session.
    pub default_transaction_options: TransactionOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            causal_consistency: true,
            default_transaction_options: TransactionOptions::default(),
        }
    }
}

impl SessionOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets causal consistency.
    #[must_use]
    pub fn causal_consistency(mut self, value: bool) -> Self {
        self.causal_consistency = value;
        self
    }

    /// Sets the default transaction options.
    #[must_use]
    pub fn default_transaction_options(mut self, options: TransactionOptions) -> Self {
        self.default_transaction_options = options;
        self
    }
}
