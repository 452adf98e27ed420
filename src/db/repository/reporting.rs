//! Read-only aggregate views over inventory and issuance history.
//!
//! None of these take locks; figures may trail in-flight issuances.

use rusqlite::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use super::medication::{medication_from_row, medication_row_from_rusqlite, MEDICATION_COLUMNS};
use crate::db::DatabaseError;
use crate::models::MedicationRecord;

#[derive(Debug, Clone, Serialize)]
pub struct MedicationUsage {
    pub medication_id: Uuid,
    pub name: String,
    pub items_issued: i64,
    pub quantity_issued: i64,
    pub stock_quantity: i64,
}

/// A medication whose stock does not reconcile with its issuance history.
#[derive(Debug, Clone, Serialize)]
pub struct StockLedgerIssue {
    pub medication_id: Uuid,
    pub name: String,
    pub stock_quantity: i64,
    pub quantity_issued: i64,
    pub total_stocked: i64,
}

/// Issued item counts and quantities per medication, most-used first.
pub fn medication_usage_counts(conn: &Connection) -> Result<Vec<MedicationUsage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.name, COUNT(p.id), COALESCE(SUM(p.quantity), 0), m.stock_quantity
         FROM medications m
         LEFT JOIN prescription_items p ON p.medication_id = m.id
         GROUP BY m.id
         ORDER BY COALESCE(SUM(p.quantity), 0) DESC, m.name",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    let mut usage = Vec::new();
    for row in rows {
        let (id, name, items_issued, quantity_issued, stock_quantity) = row?;
        usage.push(MedicationUsage {
            medication_id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            name,
            items_issued,
            quantity_issued,
            stock_quantity,
        });
    }
    Ok(usage)
}

/// Medications at or below `threshold` units, emptiest first.
pub fn low_stock_medications(
    conn: &Connection,
    threshold: i64,
) -> Result<Vec<MedicationRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications
         WHERE stock_quantity <= ?1
         ORDER BY stock_quantity, name"
    ))?;

    let rows = stmt.query_map(params![threshold], medication_row_from_rusqlite)?;

    let mut meds = Vec::new();
    for row in rows {
        meds.push(medication_from_row(row?)?);
    }
    Ok(meds)
}

/// Check `stock_quantity + issued == total_stocked` for every medication.
///
/// An empty result means stock has only moved through issuance and restock.
pub fn check_stock_ledger(conn: &Connection) -> Result<Vec<StockLedgerIssue>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.name, m.stock_quantity, COALESCE(SUM(p.quantity), 0), m.total_stocked
         FROM medications m
         LEFT JOIN prescription_items p ON p.medication_id = m.id
         GROUP BY m.id
         HAVING m.stock_quantity + COALESCE(SUM(p.quantity), 0) <> m.total_stocked",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    let mut issues = Vec::new();
    for row in rows {
        let (id, name, stock_quantity, quantity_issued, total_stocked) = row?;
        tracing::warn!(
            medication_id = %id,
            stock_quantity,
            quantity_issued,
            total_stocked,
            "Stock ledger mismatch"
        );
        issues.push(StockLedgerIssue {
            medication_id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            name,
            stock_quantity,
            quantity_issued,
            total_stocked,
        });
    }
    Ok(issues)
}
