//! Ambient transactions and their participants.

use crate::error::{TxError, TxResult};
use crate::types::AmbientTxId;
use ambientdb_driver::TransactionOptions;
use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome state of an ambient transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Accepting work.
    Active,
    /// Every participant committed.
    Committed,
    /// Every participant was rolled back.
    Aborted,
    /// A commit failed after others had succeeded.
    InDoubt,
}

/// A participant's answer to `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// Ready to commit.
    Prepared,
    /// The whole transaction must roll back.
    ForceRollback,
}

/// A resource enlisted in an ambient transaction.
///
/// When the owning scope completes, the transaction calls `prepare` on every
/// participant and then either `commit` or `rollback` on each. `in_doubt` is
/// sent to participants whose commit was never attempted because an earlier
/// participant's commit failed.
pub trait ResourceParticipant: Send + Sync {
    /// First phase of completion.
    fn prepare(&self) -> Vote;

    /// Makes the participant's work durable.
    fn commit(&self) -> TxResult<()>;

    /// Discards the participant's work.
    fn rollback(&self) -> TxResult<()>;

    /// The transaction outcome could not be determined.
    fn in_doubt(&self) -> TxResult<()>;
}

struct TxState {
    status: TransactionStatus,
    completing: bool,
    doomed: Option<String>,
    participants: Vec<Box<dyn ResourceParticipant>>,
}

/// One logical ambient transaction, shared by every scope that joins it.
pub(crate) struct AmbientTransaction {
    id: AmbientTxId,
    options: TransactionOptions,
    deadline: Instant,
    state: Mutex<TxState>,
}

impl AmbientTransaction {
    pub(crate) fn new(options: TransactionOptions, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            id: AmbientTxId::new(),
            options,
            deadline: now.checked_add(timeout).unwrap_or(now),
            state: Mutex::new(TxState {
                status: TransactionStatus::Active,
                completing: false,
                doomed: None,
                participants: Vec::new(),
            }),
        }
    }

    pub(crate) fn id(&self) -> AmbientTxId {
        self.id
    }

    pub(crate) fn options(&self) -> &TransactionOptions {
        &self.options
    }

    pub(crate) fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }

    pub(crate) fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub(crate) fn participant_count(&self) -> usize {
        self.state.lock().participants.len()
    }

    /// Fails unless the transaction can still take new work.
    pub(crate) fn ensure_active(&self) -> TxResult<()> {
        let state = self.state.lock();
        self.check_accepting(&state)
    }

    fn check_accepting(&self, state: &TxState) -> TxResult<()> {
        if state.status != TransactionStatus::Active || state.completing {
            return Err(TxError::TransactionNotActive {
                id: self.id,
                status: state.status,
            });
        }
        if self.is_expired() {
            return Err(TxError::Timeout { id: self.id });
        }
        Ok(())
    }

    pub(crate) fn enlist(&self, participant: Box<dyn ResourceParticipant>) -> TxResult<()> {
        let mut state = self.state.lock();
        self.check_accepting(&state)?;
        state.participants.push(participant);
        Ok(())
    }

    /// Marks the transaction rollback-only. The first reason wins.
    pub(crate) fn doom(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.doomed.is_none() {
            let reason = reason.into();
            debug!(tx = %self.id, reason = %reason, "transaction doomed");
            state.doomed = Some(reason);
        }
    }

    /// Takes the participants for completion.
    ///
    /// Completion runs outside the state lock, so participants may call back
    /// into the registry freely.
    fn begin_completion(&self) -> TxResult<(Vec<Box<dyn ResourceParticipant>>, Option<String>)> {
        let mut state = self.state.lock();
        if state.status != TransactionStatus::Active || state.completing {
            return Err(TxError::TransactionNotActive {
                id: self.id,
                status: state.status,
            });
        }
        state.completing = true;
        Ok((std::mem::take(&mut state.participants), state.doomed.clone()))
    }

    fn finish(&self, status: TransactionStatus) {
        let mut state = self.state.lock();
        state.status = status;
        state.completing = false;
        debug!(tx = %self.id, status = ?status, "transaction completed");
    }

    /// Drives prepare and commit on every participant.
    pub(crate) fn commit(&self) -> TxResult<()> {
        let (participants, doomed) = self.begin_completion()?;

        let abort_error = if self.is_expired() {
            Some(TxError::Timeout { id: self.id })
        } else if let Some(reason) = doomed {
            Some(TxError::aborted(self.id, reason))
        } else if participants
            .iter()
            .filter(|p| p.prepare() == Vote::ForceRollback)
            .count()
            > 0
        {
            Some(TxError::aborted(self.id, "a participant voted to roll back"))
        } else {
            None
        };
        if let Some(err) = abort_error {
            self.rollback_all(&participants);
            self.finish(TransactionStatus::Aborted);
            return Err(err);
        }

        let mut committed = 0usize;
        let mut failure = None;
        for participant in &participants {
            if failure.is_some() {
                if let Err(e) = participant.in_doubt() {
                    warn!(tx = %self.id, error = %e, "in-doubt notification failed");
                }
                continue;
            }
            match participant.commit() {
                Ok(()) => committed += 1,
                Err(e) => {
                    warn!(tx = %self.id, error = %e, "participant commit failed");
                    failure = Some(e);
                }
            }
        }

        match failure {
            None => {
                self.finish(TransactionStatus::Committed);
                Ok(())
            }
            Some(e) if committed == 0 => {
                self.finish(TransactionStatus::Aborted);
                Err(e)
            }
            Some(_) => {
                self.finish(TransactionStatus::InDoubt);
                Err(TxError::InDoubt { id: self.id })
            }
        }
    }

    /// Rolls back every participant. Returns the first rollback failure.
    pub(crate) fn rollback(&self, reason: &str) -> TxResult<()> {
        let (participants, _) = self.begin_completion()?;
        debug!(tx = %self.id, reason, "rolling back transaction");
        let result = self.rollback_all(&participants);
        self.finish(TransactionStatus::Aborted);
        result
    }

    fn rollback_all(&self, participants: &[Box<dyn ResourceParticipant>]) -> TxResult<()> {
        let mut first = None;
        for participant in participants {
            if let Err(e) = participant.rollback() {
                warn!(tx = %self.id, error = %e, "participant rollback failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for AmbientTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AmbientTransaction")
            .field("id", &self.id)
            .field("status", &state.status)
            .field("doomed", &state.doomed)
            .field("participants", &state.participants.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambientdb_driver::DriverError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Log {
        fn push(&self, entry: String) {
            self.0.lock().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    struct Probe {
        name: &'static str,
        log: Arc<Log>,
        vote: Vote,
        fail_commit: AtomicBool,
    }

    impl Probe {
        fn boxed(name: &'static str, log: &Arc<Log>) -> Box<Self> {
            Box::new(Self {
                name,
                log: Arc::clone(log),
                vote: Vote::Prepared,
                fail_commit: AtomicBool::new(false),
            })
        }
    }

    impl ResourceParticipant for Probe {
        fn prepare(&self) -> Vote {
            self.log.push(format!("{}:prepare", self.name));
            self.vote
        }

        fn commit(&self) -> TxResult<()> {
            self.log.push(format!("{}:commit", self.name));
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(DriverError::injected("commit").into());
            }
            Ok(())
        }

        fn rollback(&self) -> TxResult<()> {
            self.log.push(format!("{}:rollback", self.name));
            Ok(())
        }

        fn in_doubt(&self) -> TxResult<()> {
            self.log.push(format!("{}:in_doubt", self.name));
            Ok(())
        }
    }

    fn tx() -> AmbientTransaction {
        AmbientTransaction::new(TransactionOptions::default(), Duration::from_secs(60))
    }

    #[test]
    fn commit_prepares_then_commits_in_order() {
        let log = Arc::new(Log::default());
        let tx = tx();
        tx.enlist(Probe::boxed("a", &log)).unwrap();
        tx.enlist(Probe::boxed("b", &log)).unwrap();
        tx.commit().unwrap();
        assert_eq!(
            log.entries(),
            vec!["a:prepare", "b:prepare", "a:commit", "b:commit"]
        );
        assert_eq!(tx.status(), TransactionStatus::Committed);
    }

    #[test]
    fn force_rollback_vote_aborts_everyone() {
        let log = Arc::new(Log::default());
        let tx = tx();
        tx.enlist(Probe::boxed("a", &log)).unwrap();
        let mut veto = Probe::boxed("b", &log);
        veto.vote = Vote::ForceRollback;
        tx.enlist(veto).unwrap();
        assert!(matches!(tx.commit(), Err(TxError::TransactionAborted { .. })));
        assert!(log.entries().ends_with(&["a:rollback".into(), "b:rollback".into()]));
        assert_eq!(tx.status(), TransactionStatus::Aborted);
    }

    #[test]
    fn failed_commit_leaves_rest_in_doubt() {
        let log = Arc::new(Log::default());
        let tx = tx();
        tx.enlist(Probe::boxed("a", &log)).unwrap();
        let failing = Probe::boxed("b", &log);
        failing.fail_commit.store(true, Ordering::SeqCst);
        tx.enlist(failing).unwrap();
        tx.enlist(Probe::boxed("c", &log)).unwrap();

        assert!(matches!(tx.commit(), Err(TxError::InDoubt { .. })));
        assert!(log.entries().ends_with(&[
            "a:commit".into(),
            "b:commit".into(),
            "c:in_doubt".into()
        ]));
        assert_eq!(tx.status(), TransactionStatus::InDoubt);
    }

    #[test]
    fn first_commit_failure_is_returned_as_is() {
        let log = Arc::new(Log::default());
        let tx = tx();
        let failing = Probe::boxed("a", &log);
        failing.fail_commit.store(true, Ordering::SeqCst);
        tx.enlist(failing).unwrap();
        tx.enlist(Probe::boxed("b", &log)).unwrap();

        assert!(matches!(tx.commit(), Err(TxError::Driver(_))));
        assert!(log.entries().ends_with(&["a:commit".into(), "b:in_doubt".into()]));
        assert_eq!(tx.status(), TransactionStatus::Aborted);
    }

    #[test]
    fn doomed_transaction_rolls_back_on_commit() {
        let log = Arc::new(Log::default());
        let tx = tx();
        tx.enlist(Probe::boxed("a", &log)).unwrap();
        tx.doom("inner scope abandoned");
        tx.doom("ignored");
        match tx.commit() {
            Err(TxError::TransactionAborted { reason, .. }) => {
                assert_eq!(reason, "inner scope abandoned");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(log.entries(), vec!["a:rollback"]);
    }

    #[test]
    fn completed_transaction_refuses_enlistment() {
        let log = Arc::new(Log::default());
        let tx = tx();
        tx.rollback("test").unwrap();
        assert!(matches!(
            tx.enlist(Probe::boxed("a", &log)),
            Err(TxError::TransactionNotActive {
                status: TransactionStatus::Aborted,
                ..
            })
        ));
        assert!(tx.commit().is_err());
    }

    #[test]
    fn expired_transaction_times_out() {
        let log = Arc::new(Log::default());
        let tx = AmbientTransaction::new(TransactionOptions::default(), Duration::ZERO);
        assert!(matches!(
            tx.enlist(Probe::boxed("a", &log)),
            Err(TxError::Timeout { .. })
        ));
        assert!(matches!(tx.commit(), Err(TxError::Timeout { .. })));
        assert_eq!(tx.status(), TransactionStatus::Aborted);
    }
}
