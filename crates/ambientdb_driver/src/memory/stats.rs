//! Driver call counters.
//!
//! Counters are atomic and can be read while operations are in progress.
//! Tests use them to observe how many sessions were started and ended and
//! which overload (plain or session-bound) served each call.

use std::sync::atomic::{AtomicU64, Ordering};

/// Call counters of a [`MemoryClient`](super::MemoryClient).
#[derive(Debug, Default)]
pub struct ClientStats {
    sessions_started: AtomicU64,
    sessions_ended: AtomicU64,
    end_session_calls: AtomicU64,
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    plain_operations: AtomicU64,
    session_operations: AtomicU64,
}

impl ClientStats {
    pub(crate) fn record_session_start(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_end_session_call(&self, first: bool) {
        self.end_session_calls.fetch_add(1, Ordering::Relaxed);
        if first {
            self.sessions_ended.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_operation(&self, session_bound: bool) {
        if session_bound {
            self.session_operations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.plain_operations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
            end_session_calls: self.end_session_calls.load(Ordering::Relaxed),
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            plain_operations: self.plain_operations.load(Ordering::Relaxed),
            session_operations: self.session_operations.load(Ordering::Relaxed),
        }
    }
}

/// A copy of [`ClientStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Sessions successfully started.
    pub sessions_started: u64,
    /// Sessions ended (each counted once).
    pub sessions_ended: u64,
    /// Calls to `end_session`, including repeats on an ended session.
    pub end_session_calls: u64,
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions aborted, explicitly or by ending the session.
    pub transactions_aborted: u64,
    /// Operations served by a plain overload.
    pub plain_operations: u64,
    /// Operations served by a session-bound overload.
    pub session_operations: u64,
}

impl StatsSnapshot {
    /// Sessions started but not yet ended.
    pub fn open_sessions(&self) -> u64 {
        self.sessions_started.saturating_sub(self.sessions_ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_session_counts_once_per_session() {
        let stats = ClientStats::default();
        stats.record_session_start();
        stats.record_end_session_call(true);
        stats.record_end_session_call(false);

        let snap = stats.snapshot();
        assert_eq!(snap.sessions_ended, 1);
        assert_eq!(snap.end_session_calls, 2);
        assert_eq!(snap.open_sessions(), 0);
    }

    #[test]
    fn operations_split_by_overload() {
        let stats = ClientStats::default();
        stats.record_operation(false);
        stats.record_operation(true);
        stats.record_operation(true);

        let snap = stats.snapshot();
        assert_eq!(snap.plain_operations, 1);
        assert_eq!(snap.session_operations, 2);
    }
}
