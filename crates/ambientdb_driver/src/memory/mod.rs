//! In-memory reference driver.
//!
//! [`MemoryClient`] implements the full [`Client`](crate::Client) capability
//! surface over process memory. Documents are stored as CBOR bytes keyed by
//! `_id`. A [`MemorySession`] with an open transaction buffers its writes and
//! publishes them atomically on commit; reads through the session see its own
//! buffered writes on top of committed state.
//!
//! The driver is intended for tests and embedded use. It does not detect
//! write conflicts beyond duplicate `_id` inserts at commit time.

mod client;
mod collection;
mod config;
mod fault;
mod session;
mod stats;
mod store;

pub use client::{MemoryClient, MemoryDatabase};
pub use collection::MemoryCollection;
pub use config::MemoryConfig;
pub use fault::FaultPlan;
pub use session::MemorySession;
pub use stats::{ClientStats, StatsSnapshot};

use parking_lot::RwLock;
use std::sync::atomic::AtomicU64;
use store::StoreState;

/// State shared by a client and every handle and session derived from it.
#[derive(Debug, Default)]
pub(crate) struct ClientShared {
    pub(crate) store: RwLock<StoreState>,
    pub(crate) config: MemoryConfig,
    pub(crate) stats: ClientStats,
    pub(crate) faults: FaultPlan,
    pub(crate) next_session: AtomicU64,
}
