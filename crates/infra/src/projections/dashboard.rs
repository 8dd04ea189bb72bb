use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use cavastock_inventory::entry::round_kg;
use cavastock_inventory::{Category, OperationalIncident, Tag};

use crate::coordinator::LedgerView;

/// Entry count and net weight of a slice of active stock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StockTotals {
    pub entries: usize,
    pub neto: f64,
}

impl StockTotals {
    fn add(&mut self, neto: f64) {
        self.entries += 1;
        self.neto = round_kg(self.neto + neto);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CavaStock {
    pub cava: String,
    #[serde(flatten)]
    pub totals: StockTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiringEntry {
    pub tag: Tag,
    pub producto: String,
    pub cava: String,
    pub fecha_vencimiento: NaiveDate,
    /// Negative once expired.
    pub days_left: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: usize,
    pub total_duration: u64,
}

/// Read-only dashboard figures derived from one ledger view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub version: u64,
    pub active_entries: usize,
    pub dispatched_entries: usize,
    pub active_neto: f64,
    pub total_merma: f64,
    pub by_category: BTreeMap<Category, StockTotals>,
    pub by_cava: Vec<CavaStock>,
    pub near_expiry: Vec<ExpiringEntry>,
    pub incidents: Vec<IncidentSummary>,
}

impl DashboardReport {
    /// Entries expiring on or before `today + window_days` are listed as near expiry,
    /// soonest first; already expired stock is included.
    pub fn build(
        view: &LedgerView,
        incidents: &[OperationalIncident],
        today: NaiveDate,
        window_days: i64,
    ) -> Self {
        let snapshot = view.snapshot();

        let mut active = StockTotals::default();
        let mut by_category: BTreeMap<Category, StockTotals> = BTreeMap::new();
        let mut cava_totals: BTreeMap<String, StockTotals> = BTreeMap::new();
        let mut near_expiry = Vec::new();

        for entry in snapshot.active() {
            active.add(entry.neto());
            by_category.entry(entry.categoria()).or_default().add(entry.neto());
            cava_totals.entry(entry.cava().to_string()).or_default().add(entry.neto());

            if let Some(venc) = entry.fecha_vencimiento() {
                let days_left = (venc - today).num_days();
                if days_left <= window_days {
                    near_expiry.push(ExpiringEntry {
                        tag: entry.tag().clone(),
                        producto: entry.producto().to_string(),
                        cava: entry.cava().to_string(),
                        fecha_vencimiento: venc,
                        days_left,
                    });
                }
            }
        }
        near_expiry.sort_by(|a, b| a.fecha_vencimiento.cmp(&b.fecha_vencimiento).then_with(|| a.tag.cmp(&b.tag)));

        let total_merma = snapshot
            .entries()
            .iter()
            .filter_map(|e| e.merma())
            .fold(0.0, |acc, m| round_kg(acc + m));

        // Reuse the map's cava ordering (numeric labels first).
        let by_cava = view
            .map()
            .cavas()
            .into_iter()
            .filter_map(|cava| {
                cava_totals
                    .get(&cava)
                    .map(|totals| CavaStock { cava: cava.clone(), totals: *totals })
            })
            .collect();

        let mut grouped: BTreeMap<&str, IncidentSummary> = BTreeMap::new();
        for incident in incidents {
            let summary = grouped.entry(incident.kind.as_str()).or_insert_with(|| IncidentSummary {
                kind: incident.kind.clone(),
                count: 0,
                total_duration: 0,
            });
            summary.count += 1;
            summary.total_duration += u64::from(incident.duration);
        }

        Self {
            version: view.version(),
            active_entries: active.entries,
            dispatched_entries: snapshot.dispatched().count(),
            active_neto: active.neto,
            total_merma,
            by_category,
            by_cava,
            near_expiry,
            incidents: grouped.into_values().collect(),
        }
    }
}
