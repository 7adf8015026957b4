use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::DatabaseError;

use super::patient::PatientRecord;

/// Snapshot written once per soft-delete; restorable until `can_restore` flips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedPatientBackup {
    pub id: Uuid,
    pub original_patient_id: Uuid,
    pub user_id: Uuid,
    /// The patient row exactly as stored at deletion time.
    pub patient_data: Value,
    pub deletion_reason: Option<String>,
    pub deleted_by: Uuid,
    pub deleted_at: DateTime<Utc>,
    pub can_restore: bool,
}

impl DeletedPatientBackup {
    /// Decode the snapshot back into a patient record.
    pub fn snapshot(&self) -> Result<PatientRecord, DatabaseError> {
        Ok(serde_json::from_value(self.patient_data.clone())?)
    }
}
