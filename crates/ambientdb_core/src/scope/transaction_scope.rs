//! Scopes that open, join or suppress ambient transactions.

use super::ambient::Ambient;
use super::transaction::AmbientTransaction;
use crate::error::{TxError, TxResult};
use crate::types::AmbientTxId;
use ambientdb_driver::TransactionOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How a new scope relates to the transaction of its parent context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScopeOption {
    /// Join the parent's transaction, or start one if there is none.
    #[default]
    Required,
    /// Always start a new, independent transaction.
    RequiresNew,
    /// Run without any transaction.
    Suppress,
}

/// Per-scope settings for scopes that start a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeOptions {
    /// Scope timeout; the configured default when `None`.
    pub timeout: Option<Duration>,
    /// Transaction options; the configured defaults when `None`.
    pub transaction_options: Option<TransactionOptions>,
}

impl ScopeOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the transaction options.
    #[must_use]
    pub fn transaction_options(mut self, options: TransactionOptions) -> Self {
        self.transaction_options = Some(options);
        self
    }
}

/// A delimited span of code with an ambient transaction (or none).
///
/// Only the scope that started a transaction completes it. Closing that
/// scope after [`complete`](Self::complete) commits every enlisted
/// participant; closing it without `complete` rolls them back. A joined
/// scope closed without `complete` marks the shared transaction
/// rollback-only.
///
/// Dropping a scope without calling [`close`](Self::close) behaves like
/// `close`, logging any failure.
///
/// ```rust
/// use ambientdb_core::{Ambient, ScopeOption, TransactionScope, TransactionStatus};
///
/// let root = Ambient::default();
/// let mut scope = TransactionScope::begin(&root, ScopeOption::Required);
/// let inside = scope.ambient().clone();
/// assert!(inside.current_transaction_id().is_some());
///
/// scope.complete().unwrap();
/// scope.close().unwrap();
/// assert_eq!(inside.transaction_status(), Some(TransactionStatus::Committed));
/// ```
#[derive(Debug)]
pub struct TransactionScope {
    ambient: Ambient,
    option: ScopeOption,
    owns_transaction: bool,
    completed: bool,
    closed: bool,
}

impl TransactionScope {
    /// Opens a scope with default options.
    #[must_use]
    pub fn begin(parent: &Ambient, option: ScopeOption) -> Self {
        Self::begin_with(parent, option, ScopeOptions::default())
    }

    /// Opens a scope.
    #[must_use]
    pub fn begin_with(parent: &Ambient, option: ScopeOption, options: ScopeOptions) -> Self {
        let joined = match option {
            ScopeOption::Required => parent.transaction().cloned(),
            ScopeOption::RequiresNew => None,
            ScopeOption::Suppress => {
                debug!("scope began without a transaction");
                return Self::new(parent.suppressed(), option, false);
            }
        };

        if let Some(tx) = joined {
            debug!(tx = %tx.id(), "scope joined transaction");
            return Self::new(parent.with_transaction(Some(tx)), option, false);
        }

        let config = parent.config();
        let timeout = config.effective_timeout(options.timeout);
        let tx_options = options
            .transaction_options
            .unwrap_or_else(|| config.transaction_options.clone());
        let tx = Arc::new(AmbientTransaction::new(tx_options, timeout));
        debug!(tx = %tx.id(), option = ?option, timeout = ?timeout, "scope began transaction");
        Self::new(parent.with_transaction(Some(tx)), option, true)
    }

    fn new(ambient: Ambient, option: ScopeOption, owns_transaction: bool) -> Self {
        Self {
            ambient,
            option,
            owns_transaction,
            completed: false,
            closed: false,
        }
    }

    /// Opens a scope, runs `body` in it and closes it.
    ///
    /// The scope is completed only if `body` succeeds. An error from `body`
    /// takes precedence over a failure to close.
    pub fn run<T>(
        parent: &Ambient,
        option: ScopeOption,
        body: impl FnOnce(&Ambient) -> TxResult<T>,
    ) -> TxResult<T> {
        let mut scope = Self::begin(parent, option);
        match body(scope.ambient()) {
            Ok(value) => {
                scope.complete()?;
                scope.close()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(close_err) = scope.close() {
                    warn!(error = %close_err, "scope close failed after body error");
                }
                Err(e)
            }
        }
    }

    /// The context for code running inside this scope.
    pub fn ambient(&self) -> &Ambient {
        &self.ambient
    }

    /// The option the scope was opened with.
    pub fn option(&self) -> ScopeOption {
        self.option
    }

    /// The scope's transaction, if any.
    pub fn transaction_id(&self) -> Option<AmbientTxId> {
        self.ambient.current_transaction_id()
    }

    /// Returns true if this scope started its transaction.
    pub fn owns_transaction(&self) -> bool {
        self.owns_transaction
    }

    /// Returns true once [`complete`](Self::complete) has been called.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Votes for the scope's work to be committed.
    ///
    /// # Errors
    ///
    /// `ScopeAlreadyCompleted` if called twice.
    pub fn complete(&mut self) -> TxResult<()> {
        if self.completed {
            return Err(TxError::ScopeAlreadyCompleted);
        }
        self.completed = true;
        Ok(())
    }

    /// Closes the scope and reports the transaction outcome.
    ///
    /// # Errors
    ///
    /// For an owning scope, any commit failure, `TransactionAborted` if a
    /// joined scope doomed the transaction, `Timeout` if the scope timed out,
    /// and any rollback failure.
    pub fn close(mut self) -> TxResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> TxResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let Some(tx) = self.ambient.transaction().cloned() else {
            return Ok(());
        };
        match (self.owns_transaction, self.completed) {
            (true, true) => tx.commit(),
            (true, false) => tx.rollback("scope closed without completion"),
            (false, true) => Ok(()),
            (false, false) => {
                tx.doom("joined scope closed without completion");
                Ok(())
            }
        }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(tx = ?self.transaction_id(), error = %e, "transaction scope failed on drop");
        }
    }
}
