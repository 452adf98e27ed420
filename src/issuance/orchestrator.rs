//! One diagnosis plus its prescription items, committed as a unit.

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{coordinator, IssuanceError};
use crate::db::repository::insert_diagnosis;
use crate::db::with_immediate_transaction;
use crate::models::enums::ActorRole;
use crate::models::{Actor, DiagnosisRecord, ItemRequest, PrescriptionItem};

/// A doctor's submission: the diagnosis and every item to issue against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisSubmission {
    pub doctor_id: String,
    pub patient_id: String,
    pub description: String,
    /// Defaults to today (UTC) when absent.
    pub date: Option<NaiveDate>,
    pub next_checkup: Option<NaiveDate>,
    pub items: Vec<ItemRequest>,
}

impl DiagnosisSubmission {
    pub fn new(
        doctor_id: impl Into<String>,
        patient_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            doctor_id: doctor_id.into(),
            patient_id: patient_id.into(),
            description: description.into(),
            date: None,
            next_checkup: None,
            items: Vec::new(),
        }
    }

    /// Build a submission from actors the identity provider already
    /// authenticated. Only an actor carrying the doctor role may diagnose.
    pub fn from_actors(
        doctor: &Actor,
        patient: &Actor,
        description: impl Into<String>,
    ) -> Result<Self, IssuanceError> {
        match doctor.role {
            Some(ActorRole::Doctor) => {}
            Some(ActorRole::Patient) | None => {
                return Err(IssuanceError::InvariantViolation(format!(
                    "actor {} is not a doctor",
                    doctor.id
                )));
            }
        }
        Ok(Self::new(doctor.id.clone(), patient.id.clone(), description))
    }

    pub fn with_next_checkup(mut self, date: NaiveDate) -> Self {
        self.next_checkup = Some(date);
        self
    }

    pub fn with_item(mut self, item: ItemRequest) -> Self {
        self.items.push(item);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisReceipt {
    pub diagnosis_id: Uuid,
    pub items: Vec<PrescriptionItem>,
}

/// Lifecycle of one submission. Only `Committed` and `RolledBack` are ever
/// visible outside the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Pending,
    DiagnosisInserted,
    ItemsIssuing,
    Committed,
    RolledBack,
}

struct SubmissionTracker {
    diagnosis_id: Uuid,
    state: SubmissionState,
}

impl SubmissionTracker {
    fn advance(&mut self, next: SubmissionState) {
        tracing::debug!(
            diagnosis_id = %self.diagnosis_id,
            from = ?self.state,
            to = ?next,
            "Submission state"
        );
        self.state = next;
    }
}

/// Insert a diagnosis and issue every requested item in one transaction.
///
/// Items are issued in submission order and the first failure aborts the
/// lot: no diagnosis row, no item rows, no stock change survive.
pub fn create_diagnosis_with_items(
    conn: &Connection,
    submission: &DiagnosisSubmission,
) -> Result<DiagnosisReceipt, IssuanceError> {
    let diagnosis = DiagnosisRecord {
        id: Uuid::new_v4(),
        doctor_id: submission.doctor_id.clone(),
        patient_id: submission.patient_id.clone(),
        description: submission.description.clone(),
        date: submission.date.unwrap_or_else(|| Utc::now().date_naive()),
        next_checkup: submission.next_checkup,
        created_at: Utc::now().naive_utc(),
    };
    let mut tracker = SubmissionTracker {
        diagnosis_id: diagnosis.id,
        state: SubmissionState::Pending,
    };

    let outcome = with_immediate_transaction(conn, |tx| {
        insert_diagnosis(tx, &diagnosis)?;
        tracker.advance(SubmissionState::DiagnosisInserted);

        tracker.advance(SubmissionState::ItemsIssuing);
        let mut items = Vec::with_capacity(submission.items.len());
        for request in &submission.items {
            items.push(coordinator::issue_item(tx, &diagnosis.id, request)?);
        }
        Ok::<_, IssuanceError>(items)
    });

    match outcome {
        Ok(items) => {
            tracker.advance(SubmissionState::Committed);
            tracing::info!(
                diagnosis_id = %diagnosis.id,
                items = items.len(),
                "Diagnosis committed"
            );
            Ok(DiagnosisReceipt {
                diagnosis_id: diagnosis.id,
                items,
            })
        }
        Err(e) => {
            tracker.advance(SubmissionState::RolledBack);
            tracing::warn!(
                diagnosis_id = %diagnosis.id,
                kind = e.kind(),
                error = %e,
                "Diagnosis submission rolled back"
            );
            Err(e)
        }
    }
}
