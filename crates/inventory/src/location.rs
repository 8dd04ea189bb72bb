//! Location map: storage occupancy derived from a ledger snapshot.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::entry::{InventoryEntry, LocationKey, Tag};
use crate::snapshot::LedgerSnapshot;

/// How many active entries a coordinate may hold.
///
/// Only slotted coordinates (pasillo, torre and piso all set) are bounded: one
/// entry without a page, `paged_capacity` entries per page otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPolicy {
    pub paged_capacity: usize,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self { paged_capacity: 1 }
    }
}

impl SlotPolicy {
    pub fn new(paged_capacity: usize) -> Self {
        Self {
            paged_capacity: paged_capacity.max(1),
        }
    }

    /// `None` means unbounded (bulk zone).
    pub fn capacity_of(&self, key: &LocationKey) -> Option<usize> {
        if !key.is_slotted() {
            return None;
        }
        if key.pagina.trim().is_empty() {
            Some(1)
        } else {
            Some(self.paged_capacity.max(1))
        }
    }
}

/// Active entries sharing one aisle/tower inside a cava.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CavaGroup {
    pub pasillo: String,
    pub torre: String,
    pub entries: Vec<InventoryEntry>,
}

/// One occupied coordinate with its current occupants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotOccupancy {
    pub location: LocationKey,
    pub tags: BTreeSet<Tag>,
    /// `None` for bulk zones.
    pub capacity: Option<usize>,
}

/// Index of a snapshot by location key. Never mutates the entries it reads.
#[derive(Debug, Clone, Default)]
pub struct LocationMap {
    snapshot: LedgerSnapshot,
    policy: SlotPolicy,
    active: BTreeMap<LocationKey, Vec<usize>>,
    history: BTreeMap<LocationKey, Vec<usize>>,
}

impl LocationMap {
    pub fn build(snapshot: &LedgerSnapshot, policy: SlotPolicy) -> Self {
        let mut active: BTreeMap<LocationKey, Vec<usize>> = BTreeMap::new();
        let mut history: BTreeMap<LocationKey, Vec<usize>> = BTreeMap::new();

        for (idx, entry) in snapshot.entries().iter().enumerate() {
            let index = if entry.is_active() {
                &mut active
            } else {
                &mut history
            };
            index.entry(entry.location().normalized()).or_default().push(idx);
        }

        Self {
            snapshot: snapshot.clone(),
            policy,
            active,
            history,
        }
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    pub fn policy(&self) -> SlotPolicy {
        self.policy
    }

    fn resolve<'a>(&'a self, index: &'a BTreeMap<LocationKey, Vec<usize>>, key: &LocationKey) -> Vec<&'a InventoryEntry> {
        let entries = self.snapshot.entries();
        index
            .get(&key.normalized())
            .map(|idxs| idxs.iter().map(|&i| &entries[i]).collect())
            .unwrap_or_default()
    }

    /// Tags of STORED entries resting exactly at `key`.
    pub fn occupancy_of(&self, key: &LocationKey) -> BTreeSet<Tag> {
        self.entries_at(key).into_iter().map(|e| e.tag().clone()).collect()
    }

    /// STORED entries resting exactly at `key`, in ledger order.
    pub fn entries_at(&self, key: &LocationKey) -> Vec<&InventoryEntry> {
        self.resolve(&self.active, key)
    }

    /// DISPATCHED entries whose last coordinate was `key`.
    pub fn history_at(&self, key: &LocationKey) -> Vec<&InventoryEntry> {
        self.resolve(&self.history, key)
    }

    /// Free places left at `key`; `None` when the coordinate is unbounded.
    pub fn remaining_capacity(&self, key: &LocationKey) -> Option<usize> {
        let key = key.normalized();
        let capacity = self.policy.capacity_of(&key)?;
        let used = self.active.get(&key).map_or(0, Vec::len);
        Some(capacity.saturating_sub(used))
    }

    pub fn is_slot_available(&self, key: &LocationKey) -> bool {
        self.remaining_capacity(key).is_none_or(|left| left > 0)
    }

    /// Active stock of one cava grouped by (pasillo, torre) for the mapping grid.
    ///
    /// Groups and rows sort numerically where the labels are numbers, falling
    /// back to text order; ties keep ledger order.
    pub fn entries_by_cava(&self, cava: &str) -> Vec<CavaGroup> {
        let cava = cava.trim();
        let entries = self.snapshot.entries();
        let mut groups: BTreeMap<(LabelKey, LabelKey), CavaGroup> = BTreeMap::new();

        for (key, idxs) in self.active.range(LocationKey::in_cava(cava)..) {
            if key.cava != cava {
                break;
            }
            let group = groups
                .entry((LabelKey::of(&key.pasillo), LabelKey::of(&key.torre)))
                .or_insert_with(|| CavaGroup {
                    pasillo: key.pasillo.clone(),
                    torre: key.torre.clone(),
                    entries: Vec::new(),
                });
            group.entries.extend(idxs.iter().map(|&i| entries[i].clone()));
        }

        let mut out: Vec<CavaGroup> = groups.into_values().collect();
        for group in &mut out {
            group.entries.sort_by(|a, b| {
                let ka = (LabelKey::of(&a.location().piso), LabelKey::of(&a.location().pagina));
                let kb = (LabelKey::of(&b.location().piso), LabelKey::of(&b.location().pagina));
                ka.cmp(&kb)
            });
        }
        out
    }

    /// Distinct cavas holding active stock.
    pub fn cavas(&self) -> Vec<String> {
        let set: BTreeSet<(LabelKey, String)> = self
            .active
            .keys()
            .map(|k| (LabelKey::of(&k.cava), k.cava.clone()))
            .collect();
        set.into_iter().map(|(_, cava)| cava).collect()
    }

    /// Every coordinate with at least one STORED entry.
    pub fn occupied_coordinates(&self) -> Vec<SlotOccupancy> {
        let entries = self.snapshot.entries();
        self.active
            .iter()
            .map(|(key, idxs)| SlotOccupancy {
                location: key.clone(),
                tags: idxs.iter().map(|&i| entries[i].tag().clone()).collect(),
                capacity: self.policy.capacity_of(key),
            })
            .collect()
    }
}

/// Sort key for location labels: numbers first in numeric order, then text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum LabelKey {
    Number(u64, String),
    Text(String),
}

impl LabelKey {
    fn of(label: &str) -> Self {
        match label.trim().parse::<u64>() {
            Ok(n) => LabelKey::Number(n, label.to_string()),
            Err(_) => LabelKey::Text(label.to_string()),
        }
    }
}
