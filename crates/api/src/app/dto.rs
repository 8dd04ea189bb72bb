use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cavastock_infra::{Durability, MutationOutcome};
use cavastock_inventory::{
    CavaGroup, InventoryEntry, LedgerEvent, LifecycleState, LocationKey, OperationalIncident, SlotOccupancy,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RelocateRequest {
    #[serde(flatten)]
    pub location: LocationKey,
    pub merma: Option<f64>,
    pub operador: Option<String>,
    pub observaciones: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DispatchRequest {
    pub destino: Option<String>,
    pub merma: Option<f64>,
    pub operador: Option<String>,
    pub observaciones: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    Active,
    Dispatched,
    All,
}

#[derive(Debug, Default, Deserialize)]
pub struct EntriesQuery {
    pub state: Option<StateFilter>,
    pub cava: Option<String>,
}

impl EntriesQuery {
    pub fn matches(&self, entry: &InventoryEntry) -> bool {
        let state_ok = match self.state.unwrap_or(StateFilter::All) {
            StateFilter::Active => entry.lifecycle() == LifecycleState::Stored,
            StateFilter::Dispatched => entry.lifecycle() == LifecycleState::Dispatched,
            StateFilter::All => true,
        };
        let cava_ok = self
            .cava
            .as_deref()
            .map(str::trim)
            .is_none_or(|cava| cava.is_empty() || entry.cava() == cava);
        state_ok && cava_ok
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub today: Option<NaiveDate>,
    pub window_days: Option<i64>,
}

// -------------------------
// Response DTOs
// -------------------------

/// Common envelope for accepted mutations.
#[derive(Debug, Serialize)]
pub struct MutationResponse<T: Serialize> {
    pub version: u64,
    pub durability: Durability,
    pub events: Vec<&'static str>,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> MutationResponse<T> {
    pub fn new(outcome: &MutationOutcome, body: T) -> Self {
        Self {
            version: outcome.version,
            durability: outcome.durability.clone(),
            events: outcome.events.iter().map(event_name).collect(),
            body,
        }
    }
}

fn event_name(event: &LedgerEvent) -> &'static str {
    use cavastock_events::Event;
    event.event_type()
}

#[derive(Debug, Serialize)]
pub struct EntryBody {
    pub entry: InventoryEntry,
}

#[derive(Debug, Serialize)]
pub struct EntryListResponse {
    pub version: u64,
    pub count: usize,
    pub entries: Vec<InventoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct OccupancyResponse {
    pub version: u64,
    pub occupied: Vec<SlotOccupancy>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub location: LocationKey,
    pub available: bool,
    /// `None` for bulk zones (unbounded).
    pub remaining: Option<usize>,
    pub occupants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CavaResponse {
    pub cava: String,
    pub groups: Vec<CavaGroup>,
}

#[derive(Debug, Serialize)]
pub struct IncidentListResponse {
    pub count: usize,
    pub incidents: Vec<OperationalIncident>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocate_request_accepts_nivel_alias() {
        let req: RelocateRequest = serde_json::from_value(serde_json::json!({
            "cava": "2",
            "pasillo": "1",
            "torre": "B",
            "nivel": "3",
            "merma": 0.5
        }))
        .unwrap();
        assert_eq!(req.location.piso, "3");
        assert_eq!(req.merma, Some(0.5));
        assert!(req.operador.is_none());
    }

    #[test]
    fn relocate_request_accepts_piso_and_nivel_together() {
        let req: RelocateRequest = serde_json::from_value(serde_json::json!({
            "cava": "2",
            "pasillo": "1",
            "torre": "B",
            "nivel": "1",
            "piso": ""
        }))
        .unwrap();
        assert_eq!(req.location.piso, "1");
        assert!(req.merma.is_none());
    }

    #[test]
    fn state_filter_parses_lowercase() {
        let q: EntriesQuery = serde_json::from_value(serde_json::json!({"state": "dispatched"})).unwrap();
        assert_eq!(q.state, Some(StateFilter::Dispatched));
    }
}
