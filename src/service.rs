//! Async entry points for request handlers.
//!
//! Each call opens its own connection on a blocking thread, runs one engine
//! operation, and drops the connection. Transient aborts (lock timeouts,
//! busy database) are resubmitted from scratch up to the configured limit;
//! every other failure is returned on the first attempt.

use std::sync::Arc;

use rusqlite::Connection;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::db::repository::{low_stock_medications, restock_medication};
use crate::db::sqlite::open_database_with_timeout;
use crate::issuance::{
    create_diagnosis_with_items, issue_single_item, DiagnosisReceipt, DiagnosisSubmission,
    IssuanceError,
};
use crate::models::{ItemRequest, MedicationRecord};

#[derive(Clone)]
pub struct IssuanceService {
    config: Arc<EngineConfig>,
}

impl IssuanceService {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn create_diagnosis_with_items(
        &self,
        submission: DiagnosisSubmission,
    ) -> Result<DiagnosisReceipt, IssuanceError> {
        let submission = Arc::new(submission);
        self.run_blocking("create_diagnosis_with_items", move |conn| {
            create_diagnosis_with_items(conn, &submission)
        })
        .await
    }

    pub async fn issue_item(
        &self,
        diagnosis_id: Uuid,
        request: ItemRequest,
    ) -> Result<Uuid, IssuanceError> {
        let request = Arc::new(request);
        self.run_blocking("issue_item", move |conn| {
            issue_single_item(conn, &diagnosis_id, &request)
        })
        .await
    }

    pub async fn restock(
        &self,
        medication_id: Uuid,
        amount: i64,
    ) -> Result<MedicationRecord, IssuanceError> {
        self.run_blocking("restock", move |conn| {
            restock_medication(conn, &medication_id, amount)
        })
        .await
    }

    /// Medications at or below the configured threshold.
    pub async fn low_stock(&self) -> Result<Vec<MedicationRecord>, IssuanceError> {
        let threshold = self.config.low_stock_threshold;
        self.run_blocking("low_stock", move |conn| {
            Ok(low_stock_medications(conn, threshold)?)
        })
        .await
    }

    async fn run_blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T, IssuanceError>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T, IssuanceError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut attempt: u32 = 0;
        loop {
            let path = self.config.database_path.clone();
            let busy_timeout = self.config.busy_timeout();
            let f = Arc::clone(&f);

            let result = tokio::task::spawn_blocking(move || -> Result<T, IssuanceError> {
                let conn = open_database_with_timeout(&path, busy_timeout)?;
                f(&conn)
            })
            .await
            .map_err(|e| IssuanceError::TransactionAborted {
                reason: format!("{operation} worker failed: {e}"),
                transient: false,
            })?;

            match result {
                Err(e) if e.is_retryable() && attempt < self.config.max_transient_retries => {
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        attempt,
                        error = %e,
                        "Transient abort, resubmitting"
                    );
                }
                other => return other,
            }
        }
    }
}
