//! # ambientdb driver
//!
//! The document driver capability surface consumed by `ambientdb_core`.
//!
//! This crate provides:
//! - The [`Client`], [`Database`], [`Collection`] and [`Session`] traits. Every
//!   data and administrative operation comes as a pair: a plain overload and a
//!   `*_with_session` overload taking an explicit session.
//! - The document model ([`Document`], [`Value`]) and query model
//!   ([`Filter`], [`Update`], [`Stage`], option and result types)
//! - [`memory`], an in-memory reference driver with session-scoped transactions
//!
//! ## Example
//!
//! ```rust
//! use ambientdb_driver::memory::MemoryClient;
//! use ambientdb_driver::{doc, Client, Collection, Database, Filter, FindOptions};
//!
//! let client = MemoryClient::new();
//! let users = client.database("app").collection("users");
//! users.insert_one(doc! { "_id": 1, "name": "Alice" }).unwrap();
//!
//! let found = users.find_one(Filter::eq("name", "Alice"), FindOptions::default()).unwrap();
//! assert!(found.is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod memory;
mod options;
mod query;
mod results;
mod traits;
mod value;

pub use error::{DriverError, DriverResult};
pub use options::{ReadConcern, SessionOptions, TransactionOptions, WriteConcern};
pub use query::{
    apply_find_options, run_pipeline, Filter, FindOneAndModifyOptions, FindOptions, ReturnDocument,
    SortOrder, Stage, Update, UpdateOp, UpdateOptions,
};
pub use results::{
    BulkWriteResult, DeleteResult, IndexModel, InsertManyResult, InsertOneResult, Namespace,
    UpdateResult, WriteModel,
};
pub use traits::{Client, Collection, Database, Session, SessionId};
pub use value::{Document, Value};
