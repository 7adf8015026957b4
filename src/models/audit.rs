use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::enums::AuditOperation;

/// Append-only record of one mutation against a patient-scoped table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub patient_id: Uuid,
    pub table_name: String,
    pub operation: AuditOperation,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    #[serde(default)]
    pub changed_fields: Vec<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
