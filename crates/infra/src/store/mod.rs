//! Local snapshot persistence boundary.
//!
//! The ledger keeps no storage of its own: after every accepted mutation the
//! coordinator hands the full entry sequence to a `SnapshotStore`. A failed save
//! never undoes the mutation; it is reported as degraded durability instead.
//! The ledger version travels with the entries so numbering resumes after a
//! restart instead of starting over at 0.

pub mod in_memory;
pub mod json_file;
pub mod timed;

use std::time::Duration;

use thiserror::Error;

use cavastock_inventory::{InventoryEntry, LedgerSnapshot};

pub use in_memory::InMemorySnapshotStore;
pub use json_file::JsonFileStore;
pub use timed::TimedStore;

/// Snapshot store operation error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),

    #[error("snapshot save did not finish within {0:?}")]
    Timeout(Duration),
}

/// What a store hands back on startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedLedger {
    /// Ledger version at the time of the save; 0 when the store never recorded one.
    pub version: u64,
    pub entries: Vec<InventoryEntry>,
}

impl SavedLedger {
    pub fn new(version: u64, entries: Vec<InventoryEntry>) -> Self {
        Self { version, entries }
    }
}

/// Durable home of the latest ledger snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Last saved ledger, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<SavedLedger>, StoreError>;

    /// Replace the stored sequence and version with `snapshot`'s.
    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

impl<S> SnapshotStore for std::sync::Arc<S>
where
    S: SnapshotStore + ?Sized,
{
    fn load(&self) -> Result<Option<SavedLedger>, StoreError> {
        (**self).load()
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        (**self).save(snapshot)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
