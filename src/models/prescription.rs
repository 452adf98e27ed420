use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A committed issuance. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionItem {
    pub id: Uuid,
    pub diagnosis_id: Uuid,
    pub medication_id: Uuid,
    pub quantity: i64,
    pub usage_guide: Option<String>,
    pub duration: Option<String>,
    pub issued_at: NaiveDateTime,
}

/// One requested line of a prescription, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub medication_id: Uuid,
    pub quantity: i64,
    pub usage_guide: Option<String>,
    pub duration: Option<String>,
}

impl ItemRequest {
    pub fn new(medication_id: Uuid, quantity: i64) -> Self {
        Self {
            medication_id,
            quantity,
            usage_guide: None,
            duration: None,
        }
    }

    pub fn with_guide(mut self, usage_guide: impl Into<String>) -> Self {
        self.usage_guide = Some(usage_guide.into());
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }
}
