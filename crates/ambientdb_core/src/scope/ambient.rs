//! The explicit ambient context.

use super::transaction::{AmbientTransaction, ResourceParticipant, TransactionStatus};
use crate::config::Config;
use crate::error::{TxError, TxResult};
use crate::types::AmbientTxId;
use ambientdb_driver::TransactionOptions;
use std::fmt;
use std::sync::Arc;

/// The transaction context code runs in.
///
/// An `Ambient` is passed explicitly to every facade call. A root context
/// carries no transaction; [`TransactionScope`](super::TransactionScope)
/// derives child contexts that carry one (or explicitly carry none).
/// Cloning is cheap and clones observe the same transaction.
#[derive(Clone)]
pub struct Ambient {
    config: Arc<Config>,
    transaction: Option<Arc<AmbientTransaction>>,
}

impl Ambient {
    /// Creates a root context with no transaction.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            transaction: None,
        }
    }

    /// Returns the configuration shared by this context tree.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Identifier of the current ambient transaction, if any.
    pub fn current_transaction_id(&self) -> Option<AmbientTxId> {
        self.transaction.as_ref().map(|tx| tx.id())
    }

    /// Returns true if a transaction is attached.
    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Status of the current transaction, if any.
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction.as_ref().map(|tx| tx.status())
    }

    /// Options the current transaction's sessions are started with.
    pub fn transaction_options(&self) -> Option<&TransactionOptions> {
        self.transaction.as_ref().map(|tx| tx.options())
    }

    /// Number of participants enlisted in the current transaction.
    pub fn participant_count(&self) -> usize {
        self.transaction
            .as_ref()
            .map_or(0, |tx| tx.participant_count())
    }

    /// Enlists a participant in the current transaction.
    ///
    /// # Errors
    ///
    /// `NoAmbientTransaction` without a transaction; `TransactionNotActive`
    /// or `Timeout` if the transaction can no longer accept work.
    pub fn enlist(&self, participant: Box<dyn ResourceParticipant>) -> TxResult<()> {
        self.transaction
            .as_ref()
            .ok_or(TxError::NoAmbientTransaction)?
            .enlist(participant)
    }

    /// Returns a context with the same configuration and no transaction.
    #[must_use]
    pub fn suppressed(&self) -> Self {
        self.with_transaction(None)
    }

    pub(crate) fn transaction(&self) -> Option<&Arc<AmbientTransaction>> {
        self.transaction.as_ref()
    }

    pub(crate) fn with_transaction(&self, transaction: Option<Arc<AmbientTransaction>>) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transaction,
        }
    }
}

impl Default for Ambient {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for Ambient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ambient")
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Vote;
    use std::time::Duration;

    #[test]
    fn root_has_no_transaction() {
        let root = Ambient::default();
        assert_eq!(root.current_transaction_id(), None);
        assert_eq!(root.transaction_status(), None);
        assert_eq!(root.participant_count(), 0);
    }

    #[test]
    fn suppressed_drops_transaction_keeps_config() {
        let root = Ambient::new(Config::new().default_scope_timeout(Duration::from_secs(7)));
        let tx = Arc::new(AmbientTransaction::new(
            TransactionOptions::default(),
            Duration::from_secs(7),
        ));
        let inside = root.with_transaction(Some(tx));
        assert!(inside.has_transaction());
        let suppressed = inside.suppressed();
        assert!(!suppressed.has_transaction());
        assert_eq!(
            suppressed.config().default_scope_timeout,
            Duration::from_secs(7)
        );
    }

    struct Noop;

    impl ResourceParticipant for Noop {
        fn prepare(&self) -> Vote {
            Vote::Prepared
        }
        fn commit(&self) -> TxResult<()> {
            Ok(())
        }
        fn rollback(&self) -> TxResult<()> {
            Ok(())
        }
        fn in_doubt(&self) -> TxResult<()> {
            Ok(())
        }
    }

    #[test]
    fn enlist_requires_transaction() {
        assert_eq!(
            Ambient::default().enlist(Box::new(Noop)),
            Err(TxError::NoAmbientTransaction)
        );
    }
}
