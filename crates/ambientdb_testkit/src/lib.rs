//! # ambientdb testkit
//!
//! Test utilities for ambientdb.
//!
//! This crate provides:
//! - A [`TestClient`] fixture bundling a reference driver, a transactional
//!   facade and a root context
//! - Property-based test generators using proptest
//! - Concurrency stress helpers for transaction scopes
//! - JSON snapshots of committed collection state
//! - Tracing setup for test runs
//!
//! ## Usage
//!
//! ```rust
//! use ambientdb_testkit::prelude::*;
//!
//! with_test_client(|t| {
//!     let items = t.collection("app", "items");
//!     items.insert_one(&t.root, doc! { "_id": 1 }).unwrap();
//!     assert_eq!(t.committed_count("app", "items"), 1);
//!     t.assert_no_leaks();
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod snapshot;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::snapshot::*;
    pub use crate::stress::*;
    pub use ambientdb_core::{Ambient, ScopeOption, ScopeOptions, TransactionScope, TxError};
    pub use ambientdb_driver::{doc, Document, Filter, FindOptions, Update, UpdateOptions, Value};
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use snapshot::*;
pub use stress::*;
