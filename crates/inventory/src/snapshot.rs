//! Immutable ledger snapshots and their persisted document format.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entry::{InventoryEntry, Tag};

/// Copy-on-write view of the full entry sequence (most recent first).
///
/// Cloning is cheap; a snapshot never changes after it has been handed out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    version: u64,
    entries: Arc<Vec<InventoryEntry>>,
}

impl LedgerSnapshot {
    pub(crate) fn new(version: u64, entries: Arc<Vec<InventoryEntry>>) -> Self {
        Self { version, entries }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, tag: &Tag) -> Option<&InventoryEntry> {
        self.entries.iter().find(|e| e.tag() == tag)
    }

    /// STORED entries, in ledger order.
    pub fn active(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.iter().filter(|e| e.is_active())
    }

    /// DISPATCHED entries, in ledger order.
    pub fn dispatched(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.iter().filter(|e| !e.is_active())
    }

    /// True if both snapshots share the same underlying allocation.
    pub fn shares_storage_with(&self, other: &LedgerSnapshot) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

/// On-disk / on-wire layout of a snapshot document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    /// One JSON array of records.
    #[default]
    JsonArray,
    /// One JSON record per line.
    JsonLines,
}

/// Serialize an entry sequence; order is preserved.
pub fn encode(entries: &[InventoryEntry], format: SnapshotFormat) -> serde_json::Result<String> {
    match format {
        SnapshotFormat::JsonArray => serde_json::to_string_pretty(entries),
        SnapshotFormat::JsonLines => {
            let mut out = String::new();
            for entry in entries {
                out.push_str(&serde_json::to_string(entry)?);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

/// Parse an entry sequence. Blank JSON-lines rows are skipped.
pub fn decode(raw: &str, format: SnapshotFormat) -> serde_json::Result<Vec<InventoryEntry>> {
    match format {
        SnapshotFormat::JsonArray => {
            if raw.trim().is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str(raw)
        }
        SnapshotFormat::JsonLines => raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Category, LocationKey, NewEntry, Weights};
    use crate::ledger::{BulkLoad, DispatchEntry, Ledger, LedgerCommand};
    use crate::location::SlotPolicy;
    use cavastock_core::BatchId;
    use cavastock_products::ProductCatalog;
    use chrono::{NaiveDate, Utc};

    fn populated() -> Ledger {
        let mut ledger = Ledger::new("main", ProductCatalog::seeded(), SlotPolicy::default());
        let entries = vec![
            NewEntry {
                tag: Tag::new("R1"),
                codigo: "1001".into(),
                lote: "L-77".into(),
                fecha_fabricacion: NaiveDate::from_ymd_opt(2024, 3, 1),
                fecha_vencimiento: NaiveDate::from_ymd_opt(2024, 9, 1),
                weights: Weights::new(120.375, 12.5, 3.125),
                location: LocationKey::new("1", "2", "A", "3", "1"),
                categoria: Category::Mp,
                observaciones: "con \"comillas\"".into(),
                ..NewEntry::default()
            },
            NewEntry {
                tag: Tag::new("R2"),
                codigo: "3001".into(),
                weights: Weights::new(0.3, 0.1, 0.1),
                location: LocationKey::in_cava("4"),
                ..NewEntry::default()
            },
        ];
        ledger
            .execute(&LedgerCommand::BulkLoad(BulkLoad {
                batch_id: BatchId::new(),
                entries,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        ledger
            .execute(&LedgerCommand::DispatchEntry(DispatchEntry {
                tag: Tag::new("R2"),
                destino: Some("CLIENTE".into()),
                merma: Some(0.05),
                operador: None,
                observaciones: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        ledger
    }

    #[test]
    fn json_array_round_trips() {
        let snapshot = populated().snapshot();
        let raw = encode(snapshot.entries(), SnapshotFormat::JsonArray).unwrap();
        let back = decode(&raw, SnapshotFormat::JsonArray).unwrap();
        assert_eq!(back.as_slice(), snapshot.entries());
    }

    #[test]
    fn json_lines_round_trips() {
        let snapshot = populated().snapshot();
        let raw = encode(snapshot.entries(), SnapshotFormat::JsonLines).unwrap();
        assert_eq!(raw.lines().count(), 2);
        let back = decode(&raw, SnapshotFormat::JsonLines).unwrap();
        assert_eq!(back.as_slice(), snapshot.entries());
    }

    #[test]
    fn dates_are_iso_and_numbers_stay_numbers() {
        let snapshot = populated().snapshot();
        let raw = encode(snapshot.entries(), SnapshotFormat::JsonArray).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

        let r1 = &json[0];
        assert_eq!(r1["tag"], "R1");
        assert_eq!(r1["fechaFabricacion"], "2024-03-01");
        assert_eq!(r1["neto"], 104.75);
        assert_eq!(r1["piso"], "3");
        assert!(r1.get("merma").is_none());
        assert_eq!(json[1]["merma"], 0.05);
        assert_eq!(json[1]["tipo"], "SALIDA");
    }

    #[test]
    fn blank_documents_decode_empty() {
        assert!(decode("", SnapshotFormat::JsonArray).unwrap().is_empty());
        assert!(decode("\n\n", SnapshotFormat::JsonLines).unwrap().is_empty());
    }

    #[test]
    fn active_and_dispatched_partition_entries() {
        let snapshot = populated().snapshot();
        assert_eq!(snapshot.active().count(), 1);
        assert_eq!(snapshot.dispatched().count(), 1);
        assert_eq!(snapshot.get(&Tag::new("R1")).unwrap().neto(), 104.75);
    }
}
