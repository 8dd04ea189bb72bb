//! Single-writer ledger coordinator.
//!
//! Every mutation goes through [`LedgerCoordinator::execute`], which holds the
//! ledger lock for the whole pipeline:
//!
//! ```text
//! Command
//!   ↓
//! 1. Optimistic version check
//!   ↓
//! 2. Ledger handle + apply (pure, all-or-nothing)
//!   ↓
//! 3. Publish a new LedgerView (snapshot + location map)
//!   ↓
//! 4. Publish events to the bus
//!   ↓
//! 5. Save snapshot to the local store (failure = degraded durability)
//!   ↓
//! 6. Hand snapshot to the remote sync worker (fire-and-forget)
//! ```
//!
//! Readers never touch the ledger lock. They clone the current `Arc<LedgerView>`
//! and query it for as long as they like; it never changes underneath them.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use cavastock_core::{AggregateRoot, DomainError, ExpectedVersion};
use cavastock_events::{Event, EventBus, InMemoryEventBus};
use cavastock_inventory::{
    InventoryEntry, Ledger, LedgerCommand, LedgerEvent, LedgerSnapshot, LocationMap, NewIncident,
    OperationalIncident, SlotPolicy, Tag,
};
use cavastock_products::ProductCatalog;

use crate::store::{SnapshotStore, StoreError};
use crate::sync::{SyncHandle, SyncStatus};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("ledger lock poisoned")]
    Poisoned,

    #[error("cannot restore ledger: {0}")]
    Restore(String),
}

/// Non-fatal report that the accepted state was not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistenceWarning {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Durability {
    Durable,
    Degraded(PersistenceWarning),
}

impl Durability {
    pub fn is_durable(&self) -> bool {
        matches!(self, Durability::Durable)
    }
}

/// Result of an accepted mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub version: u64,
    pub events: Vec<LedgerEvent>,
    pub durability: Durability,
    pub view: Arc<LedgerView>,
}

/// Consistent read model: one snapshot and the location map derived from it.
#[derive(Debug, Clone)]
pub struct LedgerView {
    snapshot: LedgerSnapshot,
    map: LocationMap,
    catalog: ProductCatalog,
}

impl LedgerView {
    fn of(ledger: &Ledger) -> Self {
        let snapshot = ledger.snapshot();
        let map = LocationMap::build(&snapshot, ledger.policy());
        Self {
            snapshot,
            map,
            catalog: ledger.catalog().clone(),
        }
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    pub fn snapshot(&self) -> &LedgerSnapshot {
        &self.snapshot
    }

    pub fn entries(&self) -> &[InventoryEntry] {
        self.snapshot.entries()
    }

    pub fn get(&self, tag: &Tag) -> Option<&InventoryEntry> {
        self.snapshot.get(tag)
    }

    pub fn map(&self) -> &LocationMap {
        &self.map
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }
}

/// Owner of the ledger and its side effects.
pub struct LedgerCoordinator<B = InMemoryEventBus<LedgerEvent>> {
    ledger: Mutex<Ledger>,
    view: RwLock<Arc<LedgerView>>,
    incidents: RwLock<Vec<OperationalIncident>>,
    store: Arc<dyn SnapshotStore>,
    bus: B,
    sync: Option<SyncHandle>,
}

impl<B> std::fmt::Debug for LedgerCoordinator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerCoordinator")
            .field("store", &self.store.describe())
            .field("version", &self.view().version())
            .field("sync", &self.sync.is_some())
            .finish()
    }
}

impl<B> LedgerCoordinator<B> {
    /// Current read model.
    pub fn view(&self) -> Arc<LedgerView> {
        match self.view.read() {
            Ok(view) => Arc::clone(&view),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync.as_ref().map_or(SyncStatus::Idle, SyncHandle::status)
    }

    /// Incidents, most recent first.
    pub fn incidents(&self) -> Vec<OperationalIncident> {
        match self.incidents.read() {
            Ok(list) => list.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl<B> LedgerCoordinator<B>
where
    B: EventBus<LedgerEvent>,
{
    pub fn new(ledger: Ledger, store: Arc<dyn SnapshotStore>, bus: B) -> Self {
        let view = Arc::new(LedgerView::of(&ledger));
        Self {
            ledger: Mutex::new(ledger),
            view: RwLock::new(view),
            incidents: RwLock::new(Vec::new()),
            store,
            bus,
            sync: None,
        }
    }

    /// Restore the last saved snapshot from `store`, or start empty.
    pub fn open(
        id: impl Into<String>,
        catalog: ProductCatalog,
        policy: SlotPolicy,
        store: Arc<dyn SnapshotStore>,
        bus: B,
    ) -> Result<Self, CoordinatorError> {
        let id = id.into();
        let saved = store
            .load()
            .map_err(|e: StoreError| CoordinatorError::Restore(e.to_string()))?;

        let ledger = match saved {
            Some(saved) => {
                let count = saved.entries.len();
                let ledger = Ledger::restore(id, catalog, policy, saved.entries)
                    .map_err(|e| CoordinatorError::Restore(e.to_string()))?
                    .resumed_at(saved.version);
                info!(
                    store = %store.describe(),
                    entries = count,
                    version = saved.version,
                    "ledger restored"
                );
                ledger
            }
            None => {
                info!(store = %store.describe(), "no saved snapshot; starting empty ledger");
                Ledger::new(id, catalog, policy)
            }
        };

        Ok(Self::new(ledger, store, bus))
    }

    /// Attach a remote sync worker. Subsequent mutations are forwarded to it.
    pub fn with_sync(mut self, sync: SyncHandle) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Validate and apply one command, then run side effects.
    ///
    /// On error nothing was applied and no side effect ran.
    pub fn execute(
        &self,
        command: LedgerCommand,
        expected: ExpectedVersion,
    ) -> Result<MutationOutcome, CoordinatorError> {
        let mut ledger = self.ledger.lock().map_err(|_| CoordinatorError::Poisoned)?;
        let kind = command.kind();

        expected.check(ledger.version())?;
        let events = ledger.execute(&command).inspect_err(|err| {
            debug!(command = kind, code = err.code(), error = %err, "command rejected");
        })?;

        let view = Arc::new(LedgerView::of(&ledger));
        match self.view.write() {
            Ok(mut current) => *current = Arc::clone(&view),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&view),
        }

        let version = ledger.version();
        for event in &events {
            let tags: Vec<&str> = event.tags().into_iter().map(Tag::as_str).collect();
            info!(event = event.event_type(), ?tags, version, "ledger mutation accepted");
            if let Err(err) = self.bus.publish(event.clone()) {
                warn!(event = event.event_type(), error = ?err, "event publish failed");
            }
        }

        // Saved while still holding the ledger lock so snapshots land in order.
        // Wrap slow stores in `TimedStore` to bound the wait.
        let durability = self.persist(view.snapshot());
        drop(ledger);

        if let Some(sync) = &self.sync {
            sync.submit(view.snapshot().clone());
        }

        Ok(MutationOutcome {
            version,
            events,
            durability,
            view,
        })
    }

    /// Save the current snapshot again, e.g. after a degraded mutation.
    pub fn retry_persistence(&self) -> Result<Durability, CoordinatorError> {
        let _ledger = self.ledger.lock().map_err(|_| CoordinatorError::Poisoned)?;
        let view = self.view();
        Ok(self.persist(view.snapshot()))
    }

    fn persist(&self, snapshot: &LedgerSnapshot) -> Durability {
        match self.store.save(snapshot) {
            Ok(()) => Durability::Durable,
            Err(err) => {
                warn!(
                    store = %self.store.describe(),
                    version = snapshot.version(),
                    error = %err,
                    "snapshot not persisted; ledger state kept in memory"
                );
                Durability::Degraded(PersistenceWarning {
                    message: err.to_string(),
                })
            }
        }
    }

    /// Append an operational incident.
    pub fn record_incident(
        &self,
        incident: NewIncident,
        occurred_at: DateTime<Utc>,
    ) -> Result<OperationalIncident, CoordinatorError> {
        let incident = OperationalIncident::record(incident, occurred_at)?;
        let mut incidents = self.incidents.write().map_err(|_| CoordinatorError::Poisoned)?;
        incidents.insert(0, incident.clone());
        info!(incident = %incident.id, kind = %incident.kind, duration = incident.duration, "incident recorded");
        Ok(incident)
    }
}
