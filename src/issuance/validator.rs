//! Pure precondition checks for one issuance.

use uuid::Uuid;

use super::IssuanceError;
use crate::models::MedicationRecord;

/// Check a requested quantity against a medication snapshot.
///
/// `medication` must come from `lock_medication` inside the issuing
/// transaction; an unlocked snapshot can be stale. Checks run in order and
/// stop at the first failure: existence, positive quantity, any stock at
/// all, enough stock.
pub fn validate(
    medication_id: &Uuid,
    medication: Option<&MedicationRecord>,
    requested: i64,
) -> Result<(), IssuanceError> {
    let med = medication.ok_or_else(|| IssuanceError::medication_not_found(medication_id))?;

    if requested <= 0 {
        return Err(IssuanceError::InvalidQuantity { requested });
    }
    if med.stock_quantity <= 0 {
        return Err(IssuanceError::OutOfStock {
            medication_id: med.id,
            name: med.name.clone(),
        });
    }
    if med.stock_quantity < requested {
        return Err(IssuanceError::InsufficientStock {
            medication_id: med.id,
            name: med.name.clone(),
            requested,
            available: med.stock_quantity,
        });
    }
    Ok(())
}
