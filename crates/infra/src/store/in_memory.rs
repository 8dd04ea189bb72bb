use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use cavastock_inventory::{InventoryEntry, LedgerSnapshot};

use super::{SavedLedger, SnapshotStore, StoreError};

/// In-memory snapshot store.
///
/// Intended for tests/dev. Saves can be made to fail on demand.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    saved: Mutex<Option<SavedLedger>>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already holds `entries`, as if saved by an earlier run.
    pub fn with_entries(entries: Vec<InventoryEntry>) -> Self {
        Self::with_saved(SavedLedger::new(0, entries))
    }

    pub fn with_saved(saved: SavedLedger) -> Self {
        Self {
            saved: Mutex::new(Some(saved)),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn last_saved(&self) -> Option<Vec<InventoryEntry>> {
        self.saved.lock().ok().and_then(|s| s.as_ref().map(|s| s.entries.clone()))
    }

    pub fn last_version(&self) -> Option<u64> {
        self.saved.lock().ok().and_then(|s| s.as_ref().map(|s| s.version))
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self) -> Result<Option<SavedLedger>, StoreError> {
        let saved = self
            .saved
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(saved.clone())
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }

        let mut saved = self
            .saved
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        *saved = Some(SavedLedger::new(snapshot.version(), snapshot.entries().to_vec()));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_ledger;

    #[test]
    fn failing_store_rejects_saves_and_keeps_last_good() {
        let store = InMemorySnapshotStore::new();
        let snapshot = sample_ledger().snapshot();
        store.save(&snapshot).unwrap();

        store.set_failing(true);
        assert!(matches!(store.save(&snapshot), Err(StoreError::Unavailable(_))));
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.last_saved().unwrap().len(), snapshot.len());
        assert_eq!(store.last_version(), Some(snapshot.version()));

        store.set_failing(false);
        store.save(&snapshot).unwrap();
        assert_eq!(store.save_count(), 2);
    }
}
