use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{with_immediate_transaction, DatabaseError};
use crate::issuance::guards;
use crate::issuance::IssuanceError;
use crate::models::enums::AuditedEntity;
use crate::models::*;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const DIAGNOSIS_COLUMNS: &str =
    "id, doctor_id, patient_id, description, diagnosis_date, next_checkup, created_at";

/// Guarded insert. Works on a plain connection or inside a transaction.
pub fn insert_diagnosis(conn: &Connection, diag: &DiagnosisRecord) -> Result<(), IssuanceError> {
    guards::before_diagnosis_write(diag)?;
    write_diagnosis_row(conn, diag)?;
    tracing::debug!(diagnosis_id = %diag.id, "Diagnosis row written");
    Ok(())
}

pub fn get_diagnosis(conn: &Connection, id: &Uuid) -> Result<Option<DiagnosisRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {DIAGNOSIS_COLUMNS} FROM diagnoses WHERE id = ?1"),
            params![id.to_string()],
            diagnosis_row_from_rusqlite,
        )
        .optional()?;
    row.map(diagnosis_from_row).transpose()
}

pub fn get_diagnoses_for_patient(
    conn: &Connection,
    patient_id: &str,
) -> Result<Vec<DiagnosisRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DIAGNOSIS_COLUMNS} FROM diagnoses WHERE patient_id = ?1
         ORDER BY diagnosis_date DESC, created_at DESC"
    ))?;

    let rows = stmt.query_map(params![patient_id], diagnosis_row_from_rusqlite)?;

    let mut diagnoses = Vec::new();
    for row in rows {
        diagnoses.push(diagnosis_from_row(row?)?);
    }
    Ok(diagnoses)
}

/// Edit a diagnosis. The distinctness guard runs against the row as it
/// would look after the edit.
pub fn update_diagnosis(
    conn: &Connection,
    id: &Uuid,
    update: &DiagnosisUpdate,
) -> Result<DiagnosisRecord, IssuanceError> {
    with_immediate_transaction(conn, |tx| {
        let current = get_diagnosis(tx, id)?.ok_or_else(|| IssuanceError::diagnosis_not_found(id))?;
        let updated = current.with_update(update);
        guards::before_diagnosis_write(&updated)?;

        tx.execute(
            "UPDATE diagnoses
             SET doctor_id = ?2, patient_id = ?3, description = ?4, next_checkup = ?5
             WHERE id = ?1",
            params![
                updated.id.to_string(),
                updated.doctor_id,
                updated.patient_id,
                updated.description,
                updated.next_checkup.map(|d| d.format(DATE_FORMAT).to_string()),
            ],
        )?;

        tracing::info!(diagnosis_id = %id, "Diagnosis updated");
        Ok::<_, IssuanceError>(updated)
    })
}

/// Diagnoses are audit records and can never be deleted.
pub fn delete_diagnosis(_conn: &Connection, id: &Uuid) -> Result<(), IssuanceError> {
    guards::before_delete(AuditedEntity::Diagnosis, id)
}

fn write_diagnosis_row(conn: &Connection, diag: &DiagnosisRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO diagnoses (id, doctor_id, patient_id, description, diagnosis_date, next_checkup, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            diag.id.to_string(),
            diag.doctor_id,
            diag.patient_id,
            diag.description,
            diag.date.format(DATE_FORMAT).to_string(),
            diag.next_checkup.map(|d| d.format(DATE_FORMAT).to_string()),
            diag.created_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

type DiagnosisRow = (String, String, String, String, String, Option<String>, String);

fn diagnosis_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<DiagnosisRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn diagnosis_from_row(row: DiagnosisRow) -> Result<DiagnosisRecord, DatabaseError> {
    let (id, doctor_id, patient_id, description, date, next_checkup, created_at) = row;
    Ok(DiagnosisRecord {
        id: Uuid::parse_str(&id).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        doctor_id,
        patient_id,
        description,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        next_checkup: next_checkup
            .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
            .transpose()
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        created_at: NaiveDateTime::parse_from_str(&created_at, DATETIME_FORMAT)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
    })
}
