//! Engine-level error taxonomy.
//!
//! Business-rule failures are surfaced as-is and never retried. Storage
//! failures collapse into `TransactionAborted`; only the transient ones
//! (lock timeout, busy database) are safe to retry from scratch.

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::AuditedEntity;

#[derive(Error, Debug)]
pub enum IssuanceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid quantity {requested}: must be greater than zero")]
    InvalidQuantity { requested: i64 },

    #[error("{name} is out of stock")]
    OutOfStock { medication_id: Uuid, name: String },

    #[error("Insufficient stock for {name}: requested {requested}, available {available}")]
    InsufficientStock {
        medication_id: Uuid,
        name: String,
        requested: i64,
        available: i64,
    },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Cannot delete audit record: {entity} {id}")]
    DeletionForbidden { entity: &'static str, id: String },

    #[error("Transaction aborted: {reason}")]
    TransactionAborted { reason: String, transient: bool },
}

impl IssuanceError {
    pub fn medication_not_found(id: &Uuid) -> Self {
        IssuanceError::NotFound {
            entity: "Medication",
            id: id.to_string(),
        }
    }

    pub fn diagnosis_not_found(id: &Uuid) -> Self {
        IssuanceError::NotFound {
            entity: "Diagnosis",
            id: id.to_string(),
        }
    }

    pub fn deletion_forbidden(entity: AuditedEntity, id: &Uuid) -> Self {
        IssuanceError::DeletionForbidden {
            entity: entity.as_str(),
            id: id.to_string(),
        }
    }

    /// True only for infrastructure aborts a caller may resubmit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IssuanceError::TransactionAborted { transient: true, .. })
    }

    /// Stable machine-readable kind, for logs and presentation layers.
    pub fn kind(&self) -> &'static str {
        match self {
            IssuanceError::NotFound { .. } => "not_found",
            IssuanceError::InvalidQuantity { .. } => "invalid_quantity",
            IssuanceError::OutOfStock { .. } => "out_of_stock",
            IssuanceError::InsufficientStock { .. } => "insufficient_stock",
            IssuanceError::InvariantViolation(_) => "invariant_violation",
            IssuanceError::DeletionForbidden { .. } => "deletion_forbidden",
            IssuanceError::TransactionAborted { .. } => "transaction_aborted",
        }
    }
}

impl From<DatabaseError> for IssuanceError {
    fn from(err: DatabaseError) -> Self {
        let transient = err.is_transient();
        IssuanceError::TransactionAborted {
            reason: err.to_string(),
            transient,
        }
    }
}

impl From<rusqlite::Error> for IssuanceError {
    fn from(err: rusqlite::Error) -> Self {
        IssuanceError::from(DatabaseError::Sqlite(err))
    }
}
