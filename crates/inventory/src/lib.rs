//! Inventory ledger and location model for cold-storage cavas.
//!
//! This crate contains the business rules for stock entries, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod entry;
pub mod incident;
pub mod ledger;
pub mod location;
pub mod snapshot;

pub use entry::{
    Category, EntryPatch, InventoryEntry, LifecycleState, LocationKey, MovementType, NewEntry, Tag,
    Weights,
};
pub use incident::{NewIncident, OperationalIncident};
pub use ledger::{
    BatchLoaded, BulkLoad, CreateEntry, DispatchEntry, EntryCreated, EntryDispatched,
    EntryRelocated, EntryUpdated, Ledger, LedgerCommand, LedgerEvent, ProductRegistered,
    RegisterProduct, RelocateEntry, UpdateEntry,
};
pub use location::{CavaGroup, LocationMap, SlotOccupancy, SlotPolicy};
pub use snapshot::{LedgerSnapshot, SnapshotFormat};
