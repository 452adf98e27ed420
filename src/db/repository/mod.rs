//! Repository layer — entity-scoped database operations.
//!
//! Inventory rows live in `medication`; clinical rows in `diagnosis` and
//! `prescription`, whose write paths run the issuance guards. `reporting`
//! holds unlocked aggregate reads.

mod diagnosis;
mod medication;
mod prescription;
mod reporting;

pub use diagnosis::*;
pub use medication::*;
pub use prescription::*;
pub use reporting::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use crate::db::sqlite::{begin_immediate, open_memory_database};
    use crate::db::DatabaseError;
    use crate::issuance::{issue_single_item, IssuanceError};
    use crate::models::*;
    use rusqlite::{params, Connection};
    use uuid::Uuid;

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn make_diagnosis(conn: &Connection, doctor: &str, patient: &str) -> DiagnosisRecord {
        let diag = DiagnosisRecord {
            id: Uuid::new_v4(),
            doctor_id: doctor.into(),
            patient_id: patient.into(),
            description: "Type 2 diabetes mellitus".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            next_checkup: NaiveDate::from_ymd_opt(2024, 4, 15),
            created_at: Utc::now().naive_utc(),
        };
        insert_diagnosis(conn, &diag).unwrap();
        diag
    }

    #[test]
    fn medication_insert_and_retrieve() {
        let conn = test_db();
        let mut new = NewMedication::new("Metformin 500mg", 120, 35);
        new.description = Some("Biguanide".into());
        let med = insert_medication(&conn, &new).unwrap();

        let fetched = get_medication(&conn, &med.id).unwrap().unwrap();
        assert_eq!(fetched, med);
        assert_eq!(fetched.total_stocked, 120);

        let by_name = get_medication_by_name(&conn, "Metformin 500mg").unwrap().unwrap();
        assert_eq!(by_name.id, med.id);
        assert!(get_medication(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn medication_names_are_unique() {
        let conn = test_db();
        insert_medication(&conn, &NewMedication::new("Metformin", 1, 1)).unwrap();
        let err = insert_medication(&conn, &NewMedication::new("Metformin", 5, 1)).unwrap_err();
        assert!(matches!(err, DatabaseError::Sqlite(_)));
    }

    #[test]
    fn negative_opening_stock_or_price_rejected() {
        let conn = test_db();
        assert!(matches!(
            insert_medication(&conn, &NewMedication::new("A", -1, 1)),
            Err(DatabaseError::ConstraintViolation(_))
        ));
        assert!(matches!(
            insert_medication(&conn, &NewMedication::new("B", 1, -1)),
            Err(DatabaseError::ConstraintViolation(_))
        ));
        assert!(list_medications(&conn).unwrap().is_empty());
    }

    #[test]
    fn list_medications_sorted_by_name() {
        let conn = test_db();
        insert_medication(&conn, &NewMedication::new("Zinc", 1, 1)).unwrap();
        insert_medication(&conn, &NewMedication::new("Aspirin", 1, 1)).unwrap();
        let names: Vec<_> = list_medications(&conn).unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Aspirin", "Zinc"]);
    }

    #[test]
    fn lock_medication_returns_none_for_unknown_id() {
        let conn = test_db();
        let tx = begin_immediate(&conn).unwrap();
        assert!(lock_medication(&tx, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn restock_raises_stock_and_total() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Insulin glargine", 2, 2500)).unwrap();
        let restocked = restock_medication(&conn, &med.id, 8).unwrap();
        assert_eq!(restocked.stock_quantity, 10);
        assert_eq!(restocked.total_stocked, 10);
        assert_eq!(get_medication(&conn, &med.id).unwrap().unwrap(), restocked);
    }

    #[test]
    fn restock_rejects_non_positive_and_unknown() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Insulin", 2, 2500)).unwrap();
        assert!(matches!(
            restock_medication(&conn, &med.id, 0),
            Err(IssuanceError::InvalidQuantity { requested: 0 })
        ));
        assert!(matches!(
            restock_medication(&conn, &Uuid::new_v4(), 5),
            Err(IssuanceError::NotFound { entity: "Medication", .. })
        ));
    }

    #[test]
    fn restock_overflow_is_rejected_without_change() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Insulin", 2, 2500)).unwrap();
        assert!(matches!(
            restock_medication(&conn, &med.id, i64::MAX),
            Err(IssuanceError::InvalidQuantity { requested: i64::MAX })
        ));
        let after = get_medication(&conn, &med.id).unwrap().unwrap();
        assert_eq!(after.stock_quantity, 2);
        assert_eq!(after.total_stocked, 2);
    }

    #[test]
    fn diagnosis_insert_and_retrieve() {
        let conn = test_db();
        let diag = make_diagnosis(&conn, "D1", "P1");
        let fetched = get_diagnosis(&conn, &diag.id).unwrap().unwrap();
        assert_eq!(fetched.doctor_id, "D1");
        assert_eq!(fetched.patient_id, "P1");
        assert_eq!(fetched.date, diag.date);
        assert_eq!(fetched.next_checkup, diag.next_checkup);

        let for_patient = get_diagnoses_for_patient(&conn, "P1").unwrap();
        assert_eq!(for_patient.len(), 1);
        assert!(get_diagnoses_for_patient(&conn, "P9").unwrap().is_empty());
    }

    #[test]
    fn corrupt_next_checkup_surfaces_as_error() {
        let conn = test_db();
        let diag = make_diagnosis(&conn, "D1", "P1");
        conn.execute(
            "UPDATE diagnoses SET next_checkup = 'next spring' WHERE id = ?1",
            params![diag.id.to_string()],
        )
        .unwrap();

        assert!(matches!(
            get_diagnosis(&conn, &diag.id),
            Err(DatabaseError::ConstraintViolation(_))
        ));
        assert!(get_diagnoses_for_patient(&conn, "P1").is_err());
    }

    #[test]
    fn diagnosis_insert_rejects_same_actor() {
        let conn = test_db();
        let diag = DiagnosisRecord {
            id: Uuid::new_v4(),
            doctor_id: "D1".into(),
            patient_id: "D1".into(),
            description: "n/a".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            next_checkup: None,
            created_at: Utc::now().naive_utc(),
        };
        let err = insert_diagnosis(&conn, &diag).unwrap_err();
        assert!(matches!(err, IssuanceError::InvariantViolation(_)));
        assert!(get_diagnosis(&conn, &diag.id).unwrap().is_none());
    }

    #[test]
    fn diagnosis_update_applies_fields() {
        let conn = test_db();
        let diag = make_diagnosis(&conn, "D1", "P1");
        let updated = update_diagnosis(
            &conn,
            &diag.id,
            &DiagnosisUpdate {
                description: Some("Type 2 diabetes, diet controlled".into()),
                next_checkup: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.description, "Type 2 diabetes, diet controlled");
        assert_eq!(updated.next_checkup, None);

        let fetched = get_diagnosis(&conn, &diag.id).unwrap().unwrap();
        assert_eq!(fetched.description, "Type 2 diabetes, diet controlled");
        assert_eq!(fetched.next_checkup, None);
        assert_eq!(fetched.doctor_id, "D1");
    }

    #[test]
    fn diagnosis_update_cannot_make_doctor_the_patient() {
        let conn = test_db();
        let diag = make_diagnosis(&conn, "D1", "P1");

        let err = update_diagnosis(
            &conn,
            &diag.id,
            &DiagnosisUpdate {
                patient_id: Some("D1".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, IssuanceError::InvariantViolation(_)));

        let fetched = get_diagnosis(&conn, &diag.id).unwrap().unwrap();
        assert_eq!(fetched.patient_id, "P1");
    }

    #[test]
    fn diagnosis_update_unknown_id_is_not_found() {
        let conn = test_db();
        let err = update_diagnosis(&conn, &Uuid::new_v4(), &DiagnosisUpdate::default()).unwrap_err();
        assert!(matches!(err, IssuanceError::NotFound { entity: "Diagnosis", .. }));
    }

    #[test]
    fn schema_rejects_same_actor_on_raw_insert() {
        let conn = test_db();
        let result = conn.execute(
            "INSERT INTO diagnoses (id, doctor_id, patient_id, description, diagnosis_date, created_at)
             VALUES ('x', 'D1', 'D1', 'raw', '2024-01-01', '2024-01-01 00:00:00')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn deleting_diagnosis_is_forbidden_and_row_survives() {
        let conn = test_db();
        let diag = make_diagnosis(&conn, "D1", "P1");
        let err = delete_diagnosis(&conn, &diag.id).unwrap_err();
        assert!(matches!(err, IssuanceError::DeletionForbidden { entity: "diagnosis", .. }));
        assert!(get_diagnosis(&conn, &diag.id).unwrap().is_some());
    }

    #[test]
    fn deleting_prescription_item_is_forbidden_and_row_survives() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Atorvastatin", 30, 60)).unwrap();
        let diag = make_diagnosis(&conn, "D1", "P1");
        let item_id = issue_single_item(&conn, &diag.id, &ItemRequest::new(med.id, 30)).unwrap();

        let err = delete_prescription_item(&conn, &item_id).unwrap_err();
        assert!(matches!(err, IssuanceError::DeletionForbidden { entity: "prescription_item", .. }));
        assert!(get_prescription_item(&conn, &item_id).unwrap().is_some());
        assert_eq!(get_medication(&conn, &med.id).unwrap().unwrap().stock_quantity, 0);
    }

    #[test]
    fn raw_sql_cannot_delete_audit_rows() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Lisinopril", 10, 20)).unwrap();
        let diag = make_diagnosis(&conn, "D1", "P1");
        let item_id = issue_single_item(&conn, &diag.id, &ItemRequest::new(med.id, 2)).unwrap();

        let err = conn
            .execute("DELETE FROM prescription_items WHERE id = ?1", params![item_id.to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("cannot delete audit record"));
        let err = conn
            .execute("DELETE FROM diagnoses WHERE id = ?1", params![diag.id.to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("cannot delete audit record"));
    }

    #[test]
    fn issued_quantity_is_immutable() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Lisinopril", 10, 20)).unwrap();
        let diag = make_diagnosis(&conn, "D1", "P1");
        let item_id = issue_single_item(&conn, &diag.id, &ItemRequest::new(med.id, 2)).unwrap();

        let result = conn.execute(
            "UPDATE prescription_items SET quantity = 1 WHERE id = ?1",
            params![item_id.to_string()],
        );
        assert!(result.is_err());
        assert_eq!(get_prescription_item(&conn, &item_id).unwrap().unwrap().quantity, 2);
    }

    #[test]
    fn guarded_item_insert_decrements_without_coordinator() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Omeprazole", 14, 25)).unwrap();
        let diag = make_diagnosis(&conn, "D1", "P1");

        let tx = begin_immediate(&conn).unwrap();
        let item = PrescriptionItem {
            id: Uuid::new_v4(),
            diagnosis_id: diag.id,
            medication_id: med.id,
            quantity: 4,
            usage_guide: None,
            duration: None,
            issued_at: Utc::now().naive_utc(),
        };
        insert_prescription_item(&tx, &item).unwrap();
        tx.commit().unwrap();

        assert_eq!(get_medication(&conn, &med.id).unwrap().unwrap().stock_quantity, 10);
        assert!(check_stock_ledger(&conn).unwrap().is_empty());
    }

    #[test]
    fn guarded_item_insert_never_drives_stock_negative() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Omeprazole", 3, 25)).unwrap();
        let diag = make_diagnosis(&conn, "D1", "P1");

        let tx = begin_immediate(&conn).unwrap();
        let item = PrescriptionItem {
            id: Uuid::new_v4(),
            diagnosis_id: diag.id,
            medication_id: med.id,
            quantity: 5,
            usage_guide: None,
            duration: None,
            issued_at: Utc::now().naive_utc(),
        };
        let err = insert_prescription_item(&tx, &item).unwrap_err();
        assert!(matches!(err, IssuanceError::TransactionAborted { transient: false, .. }));
        drop(tx);

        assert_eq!(get_medication(&conn, &med.id).unwrap().unwrap().stock_quantity, 3);
        assert!(get_prescription_item(&conn, &item.id).unwrap().is_none());
    }

    #[test]
    fn usage_counts_and_low_stock() {
        let conn = test_db();
        let busy = insert_medication(&conn, &NewMedication::new("Amlodipine", 40, 30)).unwrap();
        let idle = insert_medication(&conn, &NewMedication::new("Warfarin", 5, 45)).unwrap();
        let diag = make_diagnosis(&conn, "D1", "P1");
        issue_single_item(&conn, &diag.id, &ItemRequest::new(busy.id, 10)).unwrap();
        issue_single_item(&conn, &diag.id, &ItemRequest::new(busy.id, 25)).unwrap();

        let usage = medication_usage_counts(&conn).unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].medication_id, busy.id);
        assert_eq!(usage[0].items_issued, 2);
        assert_eq!(usage[0].quantity_issued, 35);
        assert_eq!(usage[0].stock_quantity, 5);
        assert_eq!(usage[1].medication_id, idle.id);
        assert_eq!(usage[1].items_issued, 0);

        let low = low_stock_medications(&conn, 5).unwrap();
        let low_ids: Vec<_> = low.iter().map(|m| m.id).collect();
        assert_eq!(low_ids.len(), 2);
        assert!(low_ids.contains(&busy.id) && low_ids.contains(&idle.id));
        assert!(low_stock_medications(&conn, 4).unwrap().is_empty());
    }

    #[test]
    fn stock_ledger_balances_across_issues_and_restocks() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Levothyroxine", 10, 12)).unwrap();
        let diag = make_diagnosis(&conn, "D1", "P1");
        issue_single_item(&conn, &diag.id, &ItemRequest::new(med.id, 7)).unwrap();
        restock_medication(&conn, &med.id, 20).unwrap();
        issue_single_item(&conn, &diag.id, &ItemRequest::new(med.id, 15)).unwrap();

        assert!(check_stock_ledger(&conn).unwrap().is_empty());
        assert_eq!(get_medication(&conn, &med.id).unwrap().unwrap().stock_quantity, 8);
    }

    #[test]
    fn stock_ledger_flags_out_of_band_stock_change() {
        let conn = test_db();
        let med = insert_medication(&conn, &NewMedication::new("Levothyroxine", 10, 12)).unwrap();
        conn.execute(
            "UPDATE medications SET stock_quantity = 4 WHERE id = ?1",
            params![med.id.to_string()],
        )
        .unwrap();

        let issues = check_stock_ledger(&conn).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].medication_id, med.id);
        assert_eq!(issues[0].stock_quantity, 4);
        assert_eq!(issues[0].total_stocked, 10);
    }
}
