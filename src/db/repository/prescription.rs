use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use super::diagnosis::DATETIME_FORMAT;
use crate::db::DatabaseError;
use crate::issuance::guards;
use crate::issuance::IssuanceError;
use crate::models::enums::AuditedEntity;
use crate::models::*;

const ITEM_COLUMNS: &str =
    "id, diagnosis_id, medication_id, quantity, usage_guide, duration, issued_at";

/// Guarded insert of a prescription item.
///
/// Requires a transaction: the dependent stock decrement runs in the same
/// transaction as the row insert, so both land or neither does.
pub fn insert_prescription_item(
    tx: &Transaction<'_>,
    item: &PrescriptionItem,
) -> Result<(), IssuanceError> {
    guards::before_prescription_insert(item)?;
    write_item_row(tx, item)?;
    guards::after_prescription_insert(tx, item)?;
    Ok(())
}

pub fn get_prescription_item(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<PrescriptionItem>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM prescription_items WHERE id = ?1"),
            params![id.to_string()],
            item_row_from_rusqlite,
        )
        .optional()?;
    row.map(item_from_row).transpose()
}

pub fn get_items_for_diagnosis(
    conn: &Connection,
    diagnosis_id: &Uuid,
) -> Result<Vec<PrescriptionItem>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM prescription_items WHERE diagnosis_id = ?1
         ORDER BY issued_at, rowid"
    ))?;

    let rows = stmt.query_map(params![diagnosis_id.to_string()], item_row_from_rusqlite)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(item_from_row(row?)?);
    }
    Ok(items)
}

/// Prescription items are audit records and can never be deleted.
pub fn delete_prescription_item(_conn: &Connection, id: &Uuid) -> Result<(), IssuanceError> {
    guards::before_delete(AuditedEntity::PrescriptionItem, id)
}

fn write_item_row(tx: &Transaction<'_>, item: &PrescriptionItem) -> Result<(), DatabaseError> {
    tx.execute(
        "INSERT INTO prescription_items (id, diagnosis_id, medication_id, quantity, usage_guide, duration, issued_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.id.to_string(),
            item.diagnosis_id.to_string(),
            item.medication_id.to_string(),
            item.quantity,
            item.usage_guide,
            item.duration,
            item.issued_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

struct ItemRow {
    id: String,
    diagnosis_id: String,
    medication_id: String,
    quantity: i64,
    usage_guide: Option<String>,
    duration: Option<String>,
    issued_at: String,
}

fn item_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ItemRow, rusqlite::Error> {
    Ok(ItemRow {
        id: row.get(0)?,
        diagnosis_id: row.get(1)?,
        medication_id: row.get(2)?,
        quantity: row.get(3)?,
        usage_guide: row.get(4)?,
        duration: row.get(5)?,
        issued_at: row.get(6)?,
    })
}

fn item_from_row(row: ItemRow) -> Result<PrescriptionItem, DatabaseError> {
    let parse_id = |s: &str| {
        Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
    };
    Ok(PrescriptionItem {
        id: parse_id(&row.id)?,
        diagnosis_id: parse_id(&row.diagnosis_id)?,
        medication_id: parse_id(&row.medication_id)?,
        quantity: row.quantity,
        usage_guide: row.usage_guide,
        duration: row.duration,
        issued_at: NaiveDateTime::parse_from_str(&row.issued_at, DATETIME_FORMAT)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
    })
}
