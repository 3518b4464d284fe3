//! Transactional facade.
//!
//! Wrappers over the driver's client, database and collection handles that
//! route each call to the right overload. Without an ambient transaction a
//! call goes straight to the driver. Inside one it runs on the transaction's
//! registered session. Handles derived from a facade (a database from a
//! client, a collection from a database, a narrowed view of a collection)
//! share its binding.

mod binding;
mod client;
mod collection;
mod database;

pub use binding::SessionBinding;
pub use client::TxClient;
pub use collection::TxCollection;
pub use database::TxDatabase;
