//! Lock → validate → write → propagate, for one prescription item.

use chrono::Utc;
use rusqlite::{Connection, Transaction};
use uuid::Uuid;

use super::{validator, IssuanceError};
use crate::db::repository::{get_diagnosis, insert_prescription_item, lock_medication};
use crate::db::with_immediate_transaction;
use crate::models::{ItemRequest, PrescriptionItem};

const ITEM_SAVEPOINT: &str = "issue_item";

/// Issue one item inside the caller's transaction.
///
/// Takes the medication row lock, validates the locked snapshot, inserts the
/// item and lets the insert guard decrement stock. On failure every write
/// made here is undone back to a savepoint, but the transaction itself stays
/// open: committing or rolling back is the caller's job.
pub fn issue_item(
    tx: &Transaction<'_>,
    diagnosis_id: &Uuid,
    request: &ItemRequest,
) -> Result<PrescriptionItem, IssuanceError> {
    tx.execute_batch(&format!("SAVEPOINT {ITEM_SAVEPOINT}"))?;

    match issue_locked(tx, diagnosis_id, request) {
        Ok(item) => {
            tx.execute_batch(&format!("RELEASE {ITEM_SAVEPOINT}"))?;
            Ok(item)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.execute_batch(&format!(
                "ROLLBACK TO {ITEM_SAVEPOINT}; RELEASE {ITEM_SAVEPOINT}"
            )) {
                tracing::warn!(error = %rollback_err, "Failed to unwind item savepoint");
            }
            tracing::warn!(
                diagnosis_id = %diagnosis_id,
                medication_id = %request.medication_id,
                quantity = request.quantity,
                kind = e.kind(),
                error = %e,
                "Item issuance rejected"
            );
            Err(e)
        }
    }
}

fn issue_locked(
    tx: &Transaction<'_>,
    diagnosis_id: &Uuid,
    request: &ItemRequest,
) -> Result<PrescriptionItem, IssuanceError> {
    if get_diagnosis(tx, diagnosis_id)?.is_none() {
        return Err(IssuanceError::diagnosis_not_found(diagnosis_id));
    }

    // Blocks here while another transaction holds the lock.
    let locked = lock_medication(tx, &request.medication_id)?;
    validator::validate(&request.medication_id, locked.as_ref(), request.quantity)?;

    let item = PrescriptionItem {
        id: Uuid::new_v4(),
        diagnosis_id: *diagnosis_id,
        medication_id: request.medication_id,
        quantity: request.quantity,
        usage_guide: request.usage_guide.clone(),
        duration: request.duration.clone(),
        issued_at: Utc::now().naive_utc(),
    };
    insert_prescription_item(tx, &item)?;

    tracing::info!(
        item_id = %item.id,
        diagnosis_id = %diagnosis_id,
        medication_id = %item.medication_id,
        quantity = item.quantity,
        "Prescription item issued"
    );
    Ok(item)
}

/// Issue a single item against an existing diagnosis in its own transaction.
pub fn issue_single_item(
    conn: &Connection,
    diagnosis_id: &Uuid,
    request: &ItemRequest,
) -> Result<Uuid, IssuanceError> {
    with_immediate_transaction(conn, |tx| {
        issue_item(tx, diagnosis_id, request).map(|item| item.id)
    })
}
