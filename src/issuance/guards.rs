//! Write interceptors for clinical records.
//!
//! The clinical repository calls these synchronously around every insert,
//! update and delete of diagnoses and prescription items, inside the same
//! transaction as the triggering write. A guard error therefore aborts the
//! whole enclosing transaction. The raw row writers are private to the
//! repository, so there is no write path that skips them.

use rusqlite::Transaction;
use uuid::Uuid;

use super::IssuanceError;
use crate::db::repository::apply_stock_decrement;
use crate::db::DatabaseError;
use crate::models::enums::AuditedEntity;
use crate::models::{DiagnosisRecord, PrescriptionItem};

/// Doctor and patient must be two different, non-blank actors.
pub fn before_diagnosis_write(diag: &DiagnosisRecord) -> Result<(), IssuanceError> {
    if diag.doctor_id.trim().is_empty() || diag.patient_id.trim().is_empty() {
        return Err(IssuanceError::InvariantViolation(
            "diagnosis requires both a doctor and a patient".into(),
        ));
    }
    if diag.doctor_id == diag.patient_id {
        tracing::warn!(
            diagnosis_id = %diag.id,
            actor_id = %diag.doctor_id,
            "Rejected diagnosis with identical doctor and patient"
        );
        return Err(IssuanceError::InvariantViolation(format!(
            "doctor and patient must differ (both are {})",
            diag.doctor_id
        )));
    }
    Ok(())
}

/// Audit permanence. Unconditional, including administrative callers.
pub fn before_delete(entity: AuditedEntity, id: &Uuid) -> Result<(), IssuanceError> {
    tracing::warn!(entity = entity.as_str(), id = %id, "Rejected delete of audit record");
    Err(IssuanceError::deletion_forbidden(entity, id))
}

pub fn before_prescription_insert(item: &PrescriptionItem) -> Result<(), IssuanceError> {
    if item.quantity <= 0 {
        return Err(IssuanceError::InvalidQuantity {
            requested: item.quantity,
        });
    }
    Ok(())
}

/// Dependent stock write: every committed item takes its quantity out of the
/// referenced medication, atomically with the item row.
pub fn after_prescription_insert(
    tx: &Transaction<'_>,
    item: &PrescriptionItem,
) -> Result<(), IssuanceError> {
    match apply_stock_decrement(tx, &item.medication_id, item.quantity) {
        Ok(remaining) => {
            tracing::debug!(
                medication_id = %item.medication_id,
                quantity = item.quantity,
                remaining,
                "Stock decremented"
            );
            Ok(())
        }
        Err(DatabaseError::ConstraintViolation(reason)) => {
            Err(IssuanceError::TransactionAborted { reason, transient: false })
        }
        Err(e) => Err(e.into()),
    }
}
