//! Ambient scope glue.
//!
//! An [`Ambient`] is the explicit context carried through every call path.
//! [`TransactionScope`] derives child contexts following one of three
//! nesting disciplines:
//!
//! - [`ScopeOption::Required`]: join the enclosing transaction, or start one
//! - [`ScopeOption::RequiresNew`]: start an independent transaction
//! - [`ScopeOption::Suppress`]: run with no transaction at all
//!
//! The scope that started a transaction drives its participants through
//! prepare and commit (or rollback) when it closes.

mod ambient;
mod transaction;
mod transaction_scope;

pub use ambient::Ambient;
pub(crate) use transaction::AmbientTransaction;
pub use transaction::{ResourceParticipant, TransactionStatus, Vote};
pub use transaction_scope::{ScopeOption, ScopeOptions, TransactionScope};
