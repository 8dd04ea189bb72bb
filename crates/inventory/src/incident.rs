//! Operational incidents: standalone disruption records kept for reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cavastock_core::{DomainError, DomainResult, Entity, IncidentId};

/// A recorded disruption (power cut, equipment failure, ...). Not linked to entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalIncident {
    pub id: IncidentId,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    /// Minutes.
    pub duration: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Entity for OperationalIncident {
    type Id = IncidentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Incident report as submitted by an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewIncident {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub duration: u32,
}

impl OperationalIncident {
    pub fn record(new: NewIncident, occurred_at: DateTime<Utc>) -> DomainResult<Self> {
        let kind = new.kind.trim().to_string();
        if kind.is_empty() {
            return Err(DomainError::validation("incident type cannot be empty"));
        }

        Ok(Self {
            id: IncidentId::new(),
            kind,
            description: new.description.trim().to_string(),
            duration: new.duration,
            timestamp: occurred_at.timestamp_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_trims_and_stamps() {
        let at = Utc::now();
        let incident = OperationalIncident::record(
            NewIncident {
                kind: " CORTE ELECTRICO ".into(),
                description: "planta sin energia".into(),
                duration: 45,
            },
            at,
        )
        .unwrap();

        assert_eq!(incident.kind, "CORTE ELECTRICO");
        assert_eq!(incident.duration, 45);
        assert_eq!(incident.timestamp, at.timestamp_millis());
    }

    #[test]
    fn blank_type_is_rejected() {
        let err = OperationalIncident::record(NewIncident::default(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn type_field_uses_wire_name() {
        let raw = serde_json::json!({"type": "FALLA", "description": "compresor", "duration": 10});
        let new: NewIncident = serde_json::from_value(raw).unwrap();
        assert_eq!(new.kind, "FALLA");

        let incident = OperationalIncident::record(new, Utc::now()).unwrap();
        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["type"], "FALLA");
    }
}
