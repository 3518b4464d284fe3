//! Fault injection for the reference driver.

use std::sync::atomic::{AtomicU32, Ordering};

/// Makes upcoming driver calls fail with
/// [`DriverError::Injected`](crate::DriverError::Injected).
///
/// Each counter fails that many of the next calls of its kind, then the
/// calls succeed again. A failed call has no effect: a failed commit or
/// abort leaves the transaction open.
#[derive(Debug, Default)]
pub struct FaultPlan {
    session_starts: AtomicU32,
    transaction_starts: AtomicU32,
    commits: AtomicU32,
    aborts: AtomicU32,
}

impl FaultPlan {
    /// Fails the next `n` `start_session` calls.
    pub fn fail_session_starts(&self, n: u32) {
        self.session_starts.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` `start_transaction` calls.
    pub fn fail_transaction_starts(&self, n: u32) {
        self.transaction_starts.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` `commit_transaction` calls.
    pub fn fail_commits(&self, n: u32) {
        self.commits.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` `abort_transaction` calls.
    pub fn fail_aborts(&self, n: u32) {
        self.aborts.store(n, Ordering::SeqCst);
    }

    pub(crate) fn take_session_start(&self) -> bool {
        take(&self.session_starts)
    }

    pub(crate) fn take_transaction_start(&self) -> bool {
        take(&self.transaction_starts)
    }

    pub(crate) fn take_commit(&self) -> bool {
        take(&self.commits)
    }

    pub(crate) fn take_abort(&self) -> bool {
        take(&self.aborts)
    }
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
