//! Storage layer for chargeq.
//!
//! Requests, piles, users and bills persist in SQLite, with an append-only
//! JSONL journal of committed writes.
//!
//! # Example
//!
//! ```ignore
//! use chargeq::store::{RequestQuery, StationStore};
//! use chargeq::domain::RequestStatus;
//!
//! let store = StationStore::open_at(Path::new("/var/lib/chargeq"))?;
//! let holding = store.transaction(|tx| {
//!     tx.query_requests(&RequestQuery::status(RequestStatus::Waiting).unassigned())
//! })?;
//! ```

mod journal;
mod query;
mod station_store;

use std::sync::{Arc, Mutex, MutexGuard};

pub use journal::{Journal, JournalEntry, JournalOp};
pub use query::{Order, PileFilter, RequestQuery};
pub use station_store::{StationStore, StoreTx};

use crate::error::{Result, StationError};

/// Store handle shared by the lifecycle operations and the background loops.
///
/// Holding the lock serializes every transaction against every other one.
pub type SharedStore = Arc<Mutex<StationStore>>;

/// Wrap a store for sharing
pub fn shared(store: StationStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Lock a shared store
pub fn lock(store: &SharedStore) -> Result<MutexGuard<'_, StationStore>> {
    store.lock().map_err(|e| StationError::Storage(format!("store lock poisoned: {}", e)))
}
