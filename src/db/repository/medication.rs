use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::db::{with_immediate_transaction, DatabaseError};
use crate::issuance::IssuanceError;
use crate::models::*;

pub(super) const MEDICATION_COLUMNS: &str =
    "id, name, description, stock_quantity, unit_price_cents, total_stocked";

/// Register a medication with its opening stock.
pub fn insert_medication(
    conn: &Connection,
    med: &NewMedication,
) -> Result<MedicationRecord, DatabaseError> {
    if med.initial_stock < 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "initial stock for {} must not be negative",
            med.name
        )));
    }
    if med.unit_price_cents < 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "unit price for {} must not be negative",
            med.name
        )));
    }

    let record = MedicationRecord {
        id: Uuid::new_v4(),
        name: med.name.trim().to_string(),
        description: med.description.clone(),
        stock_quantity: med.initial_stock,
        unit_price_cents: med.unit_price_cents,
        total_stocked: med.initial_stock,
    };

    conn.execute(
        "INSERT INTO medications (id, name, description, stock_quantity, unit_price_cents, total_stocked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id.to_string(),
            record.name,
            record.description,
            record.stock_quantity,
            record.unit_price_cents,
            record.total_stocked,
        ],
    )?;

    tracing::info!(
        medication_id = %record.id,
        name = %record.name,
        stock = record.stock_quantity,
        "Medication registered"
    );
    Ok(record)
}

/// Unlocked read. The snapshot may be stale by the time the caller acts on
/// it; never use it to decide a decrement.
pub fn get_medication(conn: &Connection, id: &Uuid) -> Result<Option<MedicationRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1"),
            params![id.to_string()],
            medication_row_from_rusqlite,
        )
        .optional()?;
    row.map(medication_from_row).transpose()
}

pub fn get_medication_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<MedicationRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE name = ?1"),
            params![name.trim()],
            medication_row_from_rusqlite,
        )
        .optional()?;
    row.map(medication_from_row).transpose()
}

pub fn list_medications(conn: &Connection) -> Result<Vec<MedicationRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications ORDER BY name"
    ))?;

    let rows = stmt.query_map([], medication_row_from_rusqlite)?;

    let mut meds = Vec::new();
    for row in rows {
        meds.push(medication_from_row(row?)?);
    }
    Ok(meds)
}

/// Take the exclusive lock on a medication row and return its current state.
///
/// The no-op UPDATE acquires the write lock for the rest of `tx`, so every
/// other issuer blocks here until `tx` commits or rolls back, and the
/// returned snapshot reflects all previously committed decrements.
/// SQLite takes this lock on the whole database file, so issuances against
/// different medications serialize as well.
/// Returns `None` when the medication does not exist.
pub fn lock_medication(
    tx: &Transaction<'_>,
    id: &Uuid,
) -> Result<Option<MedicationRecord>, DatabaseError> {
    let row = tx
        .query_row(
            &format!(
                "UPDATE medications SET stock_quantity = stock_quantity WHERE id = ?1
                 RETURNING {MEDICATION_COLUMNS}"
            ),
            params![id.to_string()],
            medication_row_from_rusqlite,
        )
        .optional()?;
    row.map(medication_from_row).transpose()
}

/// Decrement stock as the dependent write of an item insert.
///
/// Only the prescription guard calls this, and only after the row lock is
/// held. The `stock_quantity >= ?2` predicate keeps the row non-negative even
/// if a caller skipped validation.
pub(crate) fn apply_stock_decrement(
    tx: &Transaction<'_>,
    id: &Uuid,
    quantity: i64,
) -> Result<i64, DatabaseError> {
    let remaining: Option<i64> = tx
        .query_row(
            "UPDATE medications SET stock_quantity = stock_quantity - ?2
             WHERE id = ?1 AND stock_quantity >= ?2
             RETURNING stock_quantity",
            params![id.to_string(), quantity],
            |row| row.get(0),
        )
        .optional()?;

    remaining.ok_or_else(|| {
        DatabaseError::ConstraintViolation(format!(
            "stock decrement of {quantity} on medication {id} would go negative"
        ))
    })
}

/// Administrative restock. Locks the row like an issuance does, so a restock
/// never interleaves with a concurrent decrement.
pub fn restock_medication(
    conn: &Connection,
    id: &Uuid,
    amount: i64,
) -> Result<MedicationRecord, IssuanceError> {
    if amount <= 0 {
        return Err(IssuanceError::InvalidQuantity { requested: amount });
    }

    let record = with_immediate_transaction(conn, |tx| -> Result<MedicationRecord, IssuanceError> {
        let current = lock_medication(tx, id)?
            .ok_or_else(|| IssuanceError::medication_not_found(id))?;

        let (Some(stock_quantity), Some(total_stocked)) = (
            current.stock_quantity.checked_add(amount),
            current.total_stocked.checked_add(amount),
        ) else {
            return Err(IssuanceError::InvalidQuantity { requested: amount });
        };

        tx.execute(
            "UPDATE medications SET stock_quantity = ?2, total_stocked = ?3 WHERE id = ?1",
            params![id.to_string(), stock_quantity, total_stocked],
        )?;

        Ok(MedicationRecord {
            stock_quantity,
            total_stocked,
            ..current
        })
    })?;

    tracing::info!(
        medication_id = %id,
        amount,
        stock = record.stock_quantity,
        "Medication restocked"
    );
    Ok(record)
}

// Internal row type for MedicationRecord mapping
pub(super) struct MedicationRow {
    id: String,
    name: String,
    description: Option<String>,
    stock_quantity: i64,
    unit_price_cents: i64,
    total_stocked: i64,
}

pub(super) fn medication_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<MedicationRow, rusqlite::Error> {
    Ok(MedicationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        stock_quantity: row.get(3)?,
        unit_price_cents: row.get(4)?,
        total_stocked: row.get(5)?,
    })
}

pub(super) fn medication_from_row(row: MedicationRow) -> Result<MedicationRecord, DatabaseError> {
    Ok(MedicationRecord {
        id: Uuid::parse_str(&row.id).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        name: row.name,
        description: row.description,
        stock_quantity: row.stock_quantity,
        unit_price_cents: row.unit_price_cents,
        total_stocked: row.total_stocked,
    })
}
