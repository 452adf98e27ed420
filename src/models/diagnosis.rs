use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: Uuid,
    pub doctor_id: String,
    pub patient_id: String,
    pub description: String,
    pub date: NaiveDate,
    pub next_checkup: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

/// Partial edit of a diagnosis. `None` leaves the field untouched;
/// `next_checkup: Some(None)` clears the follow-up date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosisUpdate {
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub description: Option<String>,
    pub next_checkup: Option<Option<NaiveDate>>,
}

impl DiagnosisRecord {
    /// Apply an update, producing the row as it would be written.
    pub fn with_update(&self, update: &DiagnosisUpdate) -> DiagnosisRecord {
        DiagnosisRecord {
            id: self.id,
            doctor_id: update.doctor_id.clone().unwrap_or_else(|| self.doctor_id.clone()),
            patient_id: update.patient_id.clone().unwrap_or_else(|| self.patient_id.clone()),
            description: update
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            date: self.date,
            next_checkup: update.next_checkup.unwrap_or(self.next_checkup),
            created_at: self.created_at,
        }
    }
}
