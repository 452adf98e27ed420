//! Medication issuance engine.
//!
//! Bottom-up: `validator` (pure checks) → `guards` (write interceptors on
//! clinical rows) → `coordinator` (row lock, validate, write one item) →
//! `orchestrator` (diagnosis plus items as one transaction).

pub mod coordinator;
pub mod error;
pub mod guards;
pub mod orchestrator;
pub mod validator;

pub use coordinator::{issue_item, issue_single_item};
pub use error::IssuanceError;
pub use orchestrator::{
    create_diagnosis_with_items, DiagnosisReceipt, DiagnosisSubmission, SubmissionState,
};
pub use validator::validate;
