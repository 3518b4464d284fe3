//! # ambientdb core
//!
//! Ambient transactions over a document driver.
//!
//! This crate provides:
//! - Transaction scopes ([`TransactionScope`]) that create, join or suppress
//!   an ambient transaction carried by an explicit [`Ambient`] context
//! - A session registry mapping each ambient transaction to one driver session
//! - Enlistment of that session so the transaction's outcome commits or
//!   aborts it
//! - A transactional facade ([`TxClient`], [`TxDatabase`], [`TxCollection`])
//!   that picks the session per call
//!
//! ## Key Invariants
//!
//! - At most one session per ambient transaction per registry
//! - A session is created only by the first operation inside a transaction
//! - Every registered session is removed and ended exactly once when its
//!   transaction completes
//! - Outside a transaction the facade never touches the registry
//!
//! ## Example
//!
//! ```rust
//! use ambientdb_core::{Ambient, ScopeOption, TransactionScope, TxClient};
//! use ambientdb_driver::memory::MemoryClient;
//! use ambientdb_driver::{doc, Filter, Update, UpdateOptions};
//!
//! let client = TxClient::new(MemoryClient::new());
//! let accounts = client.database("bank").collection("accounts");
//! let root = Ambient::default();
//! accounts.insert_one(&root, doc! { "_id": "a", "balance": 100 }).unwrap();
//! accounts.insert_one(&root, doc! { "_id": "b", "balance": 0 }).unwrap();
//!
//! TransactionScope::run(&root, ScopeOption::Required, |cx| {
//!     accounts.update_one(cx, Filter::id("a"), Update::new().inc("balance", -40), UpdateOptions::default())?;
//!     accounts.update_one(cx, Filter::id("b"), Update::new().inc("balance", 40), UpdateOptions::default())?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! assert_eq!(client.registry().unwrap().len(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod enlistment;
mod error;
mod facade;
mod registry;
mod scope;
mod types;

pub use ambientdb_driver as driver;
pub use config::Config;
pub use enlistment::Enlistment;
pub use error::{TxError, TxResult};
pub use facade::{SessionBinding, TxClient, TxCollection, TxDatabase};
pub use registry::{SessionHandle, SessionRegistry};
pub use scope::{
    Ambient, ResourceParticipant, ScopeOption, ScopeOptions, TransactionScope, TransactionStatus,
    Vote,
};
pub use types::AmbientTxId;
