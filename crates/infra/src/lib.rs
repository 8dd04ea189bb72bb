//! Infrastructure layer: coordination, persistence, sync, config.

pub mod config;
pub mod coordinator;
pub mod projections;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::LedgerConfig;
pub use coordinator::{
    CoordinatorError, Durability, LedgerCoordinator, LedgerView, MutationOutcome, PersistenceWarning,
};
pub use store::{InMemorySnapshotStore, JsonFileStore, SavedLedger, SnapshotStore, StoreError, TimedStore};
pub use sync::{FolderRemote, RemoteStore, SyncError, SyncHandle, SyncPolicy, SyncStatus, SyncWorker};
